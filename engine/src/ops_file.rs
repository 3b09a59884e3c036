//! Descriptor-driven file I/O: open/close, the eight read/write variants,
//! seek, sendfile, truncate and range allocation.

use crate::engine::{FsState, MemFs, WANT_R, WANT_W};
use crate::error::{DataError, FsError};
use crate::inode::Inode;
use log::warn;
use memvfs_api::fs::FileSupport;
use memvfs_api::types::{
    FALLOC_FL_KEEP_SIZE, FALLOC_FL_PUNCH_HOLE, MAX_FILE_SIZE, O_ACCMODE, O_APPEND, O_CLOEXEC,
    O_CREAT, O_DIRECTORY, O_EXCL, O_NOATIME, O_NOFOLLOW, O_RDWR, O_TMPFILE, O_TRUNC, O_WRONLY,
    PERM_MASK, RW_LIMIT, SEEK_CUR, SEEK_DATA, SEEK_END, SEEK_HOLE, SEEK_SET,
};

/// Every open flag the engine understands; anything else is `EINVAL`.
const OPEN_FLAGS: i32 = O_ACCMODE
    | O_CREAT
    | O_EXCL
    | O_TRUNC
    | O_APPEND
    | O_DIRECTORY
    | O_NOFOLLOW
    | O_NOATIME
    | O_CLOEXEC
    | O_TMPFILE;

fn writable(flags: i32) -> bool {
    let acc = flags & O_ACCMODE;
    acc == O_WRONLY || acc == O_RDWR
}

fn readable(flags: i32) -> bool {
    flags & O_ACCMODE != O_WRONLY
}

/// `base + delta` in descriptor-offset arithmetic: overflow is
/// `EOVERFLOW`, a negative result `EINVAL`.
fn add_offset(base: u64, delta: i64) -> Result<u64, FsError> {
    let sum = (base as i64).checked_add(delta).ok_or(FsError::Overflow)?;
    if sum < 0 {
        return Err(FsError::Invalid("offset before the start of the file"));
    }
    Ok(sum as u64)
}

fn open_impl(st: &mut FsState, dirfd: i32, path: &str, flags: i32, mode: u32) -> Result<i32, FsError> {
    if flags & !OPEN_FLAGS != 0 {
        warn!("open: unknown flag bits {:#o}", flags & !OPEN_FLAGS);
        return Err(FsError::Invalid("unknown open flag"));
    }
    if flags & O_ACCMODE == O_ACCMODE {
        return Err(FsError::Invalid("bad access mode"));
    }

    if flags & O_TMPFILE == O_TMPFILE {
        if !writable(flags) {
            return Err(FsError::Invalid("O_TMPFILE requires write access"));
        }
        if flags & O_CREAT != 0 {
            return Err(FsError::Invalid("O_CREAT combined with O_TMPFILE"));
        }
        let r = st.resolve_at(dirfd, path, true)?;
        let dir = r.node()?;
        if !st.table.get(dir)?.is_dir() {
            return Err(FsError::NotDir);
        }
        st.require(dir, WANT_W)?;
        let now = st.now();
        let ino = st
            .table
            .push(Inode::new_tmpfile(mode & PERM_MASK & !st.umask, now))?;
        let fd = match st.fds.push(ino, flags) {
            Ok(fd) => fd,
            Err(e) => {
                st.table.remove(ino);
                return Err(e);
            }
        };
        return Ok(fd);
    }

    // O_EXCL carries an implicit no-follow on the terminal component.
    let follow = flags & O_NOFOLLOW == 0 && flags & O_EXCL == 0;
    let r = st.resolve_at(dirfd, path, follow)?;

    let (ino, created) = match r.ino {
        Some(ino) => {
            if flags & O_CREAT != 0 && flags & O_EXCL != 0 {
                return Err(FsError::Exists);
            }
            let node = st.table.get(ino)?;
            if node.is_symlink() {
                // only reachable when the follow was suppressed
                return Err(FsError::Loop);
            }
            if node.is_dir() {
                if writable(flags) {
                    return Err(FsError::IsDir);
                }
            } else if flags & O_DIRECTORY != 0 {
                return Err(FsError::NotDir);
            }
            if readable(flags) {
                st.require(ino, WANT_R)?;
            }
            if writable(flags) {
                st.require(ino, WANT_W)?;
            }
            (ino, false)
        }
        None => {
            if flags & O_CREAT == 0 {
                return Err(FsError::NotFound);
            }
            if r.dir_required {
                return Err(FsError::IsDir);
            }
            if flags & O_DIRECTORY != 0 {
                return Err(FsError::Invalid("O_CREAT cannot make a directory"));
            }
            st.require(r.dir, WANT_W)?;
            let now = st.now();
            let ino = st
                .table
                .push(Inode::new_regular(mode & PERM_MASK & !st.umask, now))?;
            if let Err(e) = st.add_entry(r.dir, &r.name, ino) {
                st.table.remove(ino);
                return Err(e);
            }
            (ino, true)
        }
    };

    if !created && flags & O_TRUNC != 0 && writable(flags) {
        let node = st.table.get_mut(ino)?;
        if node.is_regular() && node.size() > 0 {
            node.data_mut()?.truncate(0)?;
            st.touch_mtime(ino)?;
        }
    }

    match st.fds.push(ino, flags) {
        Ok(fd) => Ok(fd),
        Err(e) => {
            if created {
                if let Ok(parent) = st.table.get_mut(r.dir) {
                    if let Ok(entries) = parent.dir_mut() {
                        entries.remove(&r.name);
                    }
                }
                st.table.remove(ino);
            }
            Err(e)
        }
    }
}

fn read_common(
    st: &mut FsState,
    fd: i32,
    bufs: &mut [&mut [u8]],
    offset: Option<i64>,
) -> Result<usize, FsError> {
    if let Some(off) = offset {
        if off < 0 {
            return Err(FsError::Invalid("negative read offset"));
        }
    }
    let fdesc = st.fds.get(fd)?;
    if !readable(fdesc.flags) {
        return Err(FsError::BadFd(fd));
    }
    let (ino, fflags, seek) = (fdesc.ino, fdesc.flags, fdesc.seek);
    let start = offset.map(|o| o as u64).unwrap_or(seek);

    let done = {
        let node = st.table.get(ino)?;
        if node.is_dir() {
            return Err(FsError::IsDir);
        }
        let data = node.data()?;
        let mut done: u64 = 0;
        for buf in bufs.iter_mut() {
            if done >= RW_LIMIT {
                break;
            }
            let room = (RW_LIMIT - done).min(buf.len() as u64) as usize;
            let n = data.read(start + done, &mut buf[..room]);
            done += n as u64;
            if n < room {
                break; // end of file
            }
        }
        done
    };

    if done > 0 && fflags & O_NOATIME == 0 {
        st.touch_atime(ino)?;
    }
    if offset.is_none() {
        st.fds.get_mut(fd)?.seek = start + done;
    }
    Ok(done as usize)
}

fn write_common(
    st: &mut FsState,
    fd: i32,
    bufs: &[&[u8]],
    offset: Option<i64>,
) -> Result<usize, FsError> {
    if let Some(off) = offset {
        if off < 0 {
            return Err(FsError::Invalid("negative write offset"));
        }
    }
    let fdesc = st.fds.get(fd)?;
    if !writable(fdesc.flags) {
        return Err(FsError::BadFd(fd));
    }
    let (ino, fflags, seek) = (fdesc.ino, fdesc.flags, fdesc.seek);
    let size = st.table.get(ino)?.data()?.size();

    // Append mode pins every write-class call to end-of-file.
    let start = if fflags & O_APPEND != 0 {
        size
    } else {
        offset.map(|o| o as u64).unwrap_or(seek)
    };

    let total = bufs
        .iter()
        .fold(0u64, |acc, b| acc.saturating_add(b.len() as u64));
    let mut budget = total.min(RW_LIMIT);
    if budget > 0 {
        let cap = MAX_FILE_SIZE.saturating_sub(start);
        if cap == 0 {
            return Err(DataError::TooBig.into());
        }
        budget = budget.min(cap);
    }

    let mut done: u64 = 0;
    for buf in bufs {
        if done >= budget {
            break;
        }
        let take = ((budget - done) as usize).min(buf.len());
        let res = st
            .table
            .get_mut(ino)?
            .data_mut()?
            .write(start + done, &buf[..take]);
        match res {
            Ok(()) => done += take as u64,
            // Transferred bytes stay committed; only a barren call errors.
            Err(e) if done == 0 => return Err(e.into()),
            Err(_) => break,
        }
    }

    if done > 0 {
        st.touch_mtime(ino)?;
    }
    if offset.is_none() {
        st.fds.get_mut(fd)?.seek = start + done;
    }
    Ok(done as usize)
}

fn lseek_impl(st: &mut FsState, fd: i32, offset: i64, whence: i32) -> Result<i64, FsError> {
    let fdesc = st.fds.get(fd)?;
    let (ino, seek) = (fdesc.ino, fdesc.seek);
    let node = st.table.get(ino)?;
    let size = if node.is_dir() {
        node.dir()?.all().len() as u64
    } else {
        node.size()
    };

    let new = match whence {
        SEEK_SET => {
            if offset < 0 {
                return Err(FsError::Invalid("seek before the start"));
            }
            offset as u64
        }
        SEEK_CUR => add_offset(seek, offset)?,
        SEEK_END => add_offset(size, offset)?,
        SEEK_DATA | SEEK_HOLE => {
            if !node.is_regular() {
                return Err(FsError::Invalid("data/hole seek on a non-regular file"));
            }
            if offset < 0 {
                return Err(FsError::Invalid("seek before the start"));
            }
            let data = node.data()?;
            if whence == SEEK_DATA {
                data.seek_data(offset as u64)
            } else {
                data.seek_hole(offset as u64)
            }
        }
        _ => return Err(FsError::Invalid("unknown seek whence")),
    };

    if new > i64::MAX as u64 {
        return Err(FsError::Overflow);
    }
    st.fds.get_mut(fd)?.seek = new;
    Ok(new as i64)
}

fn sendfile_impl(
    st: &mut FsState,
    out_fd: i32,
    in_fd: i32,
    offset: Option<&mut i64>,
    count: usize,
) -> Result<usize, FsError> {
    let inf = st.fds.get(in_fd)?;
    if !readable(inf.flags) {
        return Err(FsError::BadFd(in_fd));
    }
    let (in_ino, in_flags, in_seek) = (inf.ino, inf.flags, inf.seek);
    if !st.table.get(in_ino)?.is_regular() {
        return Err(FsError::Invalid("sendfile input must be a regular file"));
    }

    let outf = st.fds.get(out_fd)?;
    if !writable(outf.flags) {
        return Err(FsError::BadFd(out_fd));
    }
    if outf.flags & O_APPEND != 0 {
        return Err(FsError::Invalid("sendfile output opened for append"));
    }
    let (out_ino, out_seek) = (outf.ino, outf.seek);

    let start = match &offset {
        Some(o) => {
            if **o < 0 {
                return Err(FsError::Invalid("negative sendfile offset"));
            }
            **o as u64
        }
        None => in_seek,
    };

    let in_size = st.table.get(in_ino)?.data()?.size();
    let want = (count as u64)
        .min(RW_LIMIT)
        .min(in_size.saturating_sub(start))
        .min(MAX_FILE_SIZE.saturating_sub(out_seek));
    if want == 0 {
        return Ok(0);
    }

    // Copy through a bounded scratch buffer; holes materialize as zeroes.
    const CHUNK: usize = 128 * 1024;
    let mut scratch = Vec::new();
    scratch
        .try_reserve_exact(CHUNK.min(want as usize))
        .map_err(|_| FsError::NoMemory)?;
    scratch.resize(CHUNK.min(want as usize), 0);

    let mut copied: u64 = 0;
    while copied < want {
        let take = ((want - copied) as usize).min(scratch.len());
        let n = {
            let data = st.table.get(in_ino)?.data()?;
            data.read(start + copied, &mut scratch[..take])
        };
        if n == 0 {
            break;
        }
        let res = st
            .table
            .get_mut(out_ino)?
            .data_mut()?
            .write(out_seek + copied, &scratch[..n]);
        match res {
            Ok(()) => copied += n as u64,
            Err(e) if copied == 0 => return Err(e.into()),
            Err(_) => break,
        }
    }

    if copied > 0 {
        if in_flags & O_NOATIME == 0 {
            st.touch_atime(in_ino)?;
        }
        st.touch_mtime(out_ino)?;
        st.fds.get_mut(out_fd)?.seek = out_seek + copied;
        match offset {
            Some(o) => *o = (start + copied) as i64,
            None => st.fds.get_mut(in_fd)?.seek = start + copied,
        }
    }
    Ok(copied as usize)
}

fn truncate_node(st: &mut FsState, ino: u64, length: i64) -> Result<(), FsError> {
    if length < 0 {
        return Err(FsError::Invalid("negative truncate length"));
    }
    let node = st.table.get_mut(ino)?;
    if node.is_dir() {
        return Err(FsError::IsDir);
    }
    node.data_mut()?.truncate(length as u64)?;
    st.touch_mtime(ino)?;
    Ok(())
}

fn fallocate_impl(
    st: &mut FsState,
    fd: i32,
    mode: i32,
    offset: i64,
    length: i64,
) -> Result<(), FsError> {
    let fdesc = st.fds.get(fd)?;
    if !writable(fdesc.flags) {
        return Err(FsError::BadFd(fd));
    }
    let ino = fdesc.ino;
    if !st.table.get(ino)?.is_regular() {
        return Err(FsError::NoDevice);
    }
    if offset < 0 || length <= 0 {
        return Err(FsError::Invalid("bad fallocate span"));
    }
    let (off, len) = (offset as u64, length as u64);
    let end = off.checked_add(len).ok_or(DataError::TooBig)?;

    match mode {
        0 => {
            st.table.get_mut(ino)?.data_mut()?.alloc(off, len)?;
        }
        FALLOC_FL_KEEP_SIZE => {
            // Allocate only the part below the current size; the size is
            // not allowed to move.
            let data = st.table.get_mut(ino)?.data_mut()?;
            let cap = end.min(data.size());
            if cap > off {
                data.alloc(off, cap - off)?;
            }
        }
        m if m == FALLOC_FL_PUNCH_HOLE | FALLOC_FL_KEEP_SIZE => {
            st.table.get_mut(ino)?.data_mut()?.punch(off, len)?;
        }
        FALLOC_FL_PUNCH_HOLE => {
            return Err(FsError::Invalid("punch requires keep-size"));
        }
        _ => return Err(FsError::NotSupported("fallocate mode")),
    }
    st.touch_mtime(ino)?;
    Ok(())
}

impl FileSupport for MemFs {
    fn open(&self, path: &str, flags: i32, mode: u32) -> Result<i32, FsError> {
        self.openat(memvfs_api::types::AT_FDCWD, path, flags, mode)
    }

    fn openat(&self, dirfd: i32, path: &str, flags: i32, mode: u32) -> Result<i32, FsError> {
        let st = &mut *self.lock();
        open_impl(st, dirfd, path, flags, mode)
    }

    fn creat(&self, path: &str, mode: u32) -> Result<i32, FsError> {
        self.open(path, O_CREAT | O_WRONLY | O_TRUNC, mode)
    }

    fn close(&self, fd: i32) -> Result<(), FsError> {
        let st = &mut *self.lock();
        let closed = st.fds.remove(fd)?;
        st.reclaim(closed.ino);
        Ok(())
    }

    fn close_range(&self, lo: u32, hi: u32, flags: u32) -> Result<(), FsError> {
        if flags != 0 {
            return Err(FsError::Invalid("close_range flags"));
        }
        if lo > hi {
            return Err(FsError::Invalid("inverted close_range window"));
        }
        let st = &mut *self.lock();
        for closed in st.fds.remove_range(lo, hi) {
            st.reclaim(closed.ino);
        }
        Ok(())
    }

    fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        read_common(st, fd, &mut [buf], None)
    }

    fn pread(&self, fd: i32, buf: &mut [u8], offset: i64) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        read_common(st, fd, &mut [buf], Some(offset))
    }

    fn readv(&self, fd: i32, bufs: &mut [&mut [u8]]) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        read_common(st, fd, bufs, None)
    }

    fn preadv(&self, fd: i32, bufs: &mut [&mut [u8]], offset: i64) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        read_common(st, fd, bufs, Some(offset))
    }

    fn write(&self, fd: i32, buf: &[u8]) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        write_common(st, fd, &[buf], None)
    }

    fn pwrite(&self, fd: i32, buf: &[u8], offset: i64) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        write_common(st, fd, &[buf], Some(offset))
    }

    fn writev(&self, fd: i32, bufs: &[&[u8]]) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        write_common(st, fd, bufs, None)
    }

    fn pwritev(&self, fd: i32, bufs: &[&[u8]], offset: i64) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        write_common(st, fd, bufs, Some(offset))
    }

    fn lseek(&self, fd: i32, offset: i64, whence: i32) -> Result<i64, FsError> {
        let st = &mut *self.lock();
        lseek_impl(st, fd, offset, whence)
    }

    fn sendfile(
        &self,
        out_fd: i32,
        in_fd: i32,
        offset: Option<&mut i64>,
        count: usize,
    ) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        sendfile_impl(st, out_fd, in_fd, offset, count)
    }

    fn truncate(&self, path: &str, length: i64) -> Result<(), FsError> {
        let st = &mut *self.lock();
        let r = st.resolve_at(memvfs_api::types::AT_FDCWD, path, true)?;
        let ino = r.node()?;
        if !st.table.get(ino)?.is_dir() {
            st.require(ino, WANT_W)?;
        }
        truncate_node(st, ino, length)
    }

    fn ftruncate(&self, fd: i32, length: i64) -> Result<(), FsError> {
        let st = &mut *self.lock();
        let fdesc = st.fds.get(fd)?;
        if !writable(fdesc.flags) {
            return Err(FsError::Invalid("descriptor not open for writing"));
        }
        let ino = fdesc.ino;
        truncate_node(st, ino, length)
    }

    fn fallocate(&self, fd: i32, mode: i32, offset: i64, length: i64) -> Result<(), FsError> {
        let st = &mut *self.lock();
        fallocate_impl(st, fd, mode, offset, length)
    }
}
