//! Directory tree operations: creation, removal, enumeration, and the
//! current working directory.

use crate::engine::{Cwd, FsState, MemFs, WANT_W, WANT_X};
use crate::error::FsError;
use crate::resolve::absolutize;
use memvfs_api::fs::DirSupport;
use memvfs_api::types::{AT_FDCWD, AT_REMOVEDIR, O_NOATIME, PERM_MASK};

/// Fixed header of one emitted directory record: inode id, next offset,
/// record length.
const DENT_HEADER: usize = 8 + 8 + 2;

fn align_word(n: usize) -> usize {
    (n + 7) & !7
}

/// Record length for a name: header, name bytes, NUL, trailing type byte,
/// padded to the word size.
fn reclen_for(name_len: usize) -> usize {
    align_word(DENT_HEADER + name_len + 2)
}

pub(crate) fn mkdir_impl(st: &mut FsState, dirfd: i32, path: &str, mode: u32) -> Result<(), FsError> {
    let r = st.resolve_at(dirfd, path, false)?;
    if r.ino.is_some() {
        return Err(FsError::Exists);
    }
    st.require(r.dir, WANT_W)?;
    let ino = st.push_directory(mode & PERM_MASK & !st.umask, r.dir)?;
    if let Err(e) = st.add_entry(r.dir, &r.name, ino) {
        st.table.remove(ino);
        return Err(e);
    }
    st.table.get_mut(r.dir)?.nlink += 1;
    Ok(())
}

fn getdents_impl(st: &mut FsState, fd: i32, buf: &mut [u8]) -> Result<usize, FsError> {
    let fdesc = st.fds.get(fd)?;
    let (ino, fflags, seek) = (fdesc.ino, fdesc.flags, fdesc.seek);

    let (written, count) = {
        let node = st.table.get(ino)?;
        if !node.is_dir() {
            return Err(FsError::NotDir);
        }
        let list = node.dir()?.all();
        let first = seek as usize;
        if first >= list.len() {
            return Ok(0);
        }

        let mut written = 0usize;
        let mut count = 0usize;
        for (i, d) in list.iter().enumerate().skip(first) {
            let reclen = reclen_for(d.name.len());
            if written + reclen > buf.len() {
                if count == 0 {
                    return Err(FsError::Invalid("buffer below one directory record"));
                }
                break;
            }
            let type_byte = st.table.get(d.ino)?.type_byte();
            let rec = &mut buf[written..written + reclen];
            rec[..8].copy_from_slice(&d.ino.to_ne_bytes());
            rec[8..16].copy_from_slice(&((i + 1) as u64).to_ne_bytes());
            rec[16..18].copy_from_slice(&(reclen as u16).to_ne_bytes());
            let name = d.name.as_bytes();
            rec[DENT_HEADER..DENT_HEADER + name.len()].copy_from_slice(name);
            for b in &mut rec[DENT_HEADER + name.len()..reclen - 1] {
                *b = 0;
            }
            rec[reclen - 1] = type_byte;
            written += reclen;
            count += 1;
        }
        (written, count)
    };

    st.fds.get_mut(fd)?.seek = seek + count as u64;
    if count > 0 && fflags & O_NOATIME == 0 {
        st.touch_atime(ino)?;
    }
    Ok(written)
}

fn set_cwd(st: &mut FsState, ino: u64, path: String) -> Result<(), FsError> {
    let node = st.table.get(ino)?;
    if !node.is_dir() {
        return Err(FsError::NotDir);
    }
    if !node.grants(WANT_X) {
        return Err(FsError::Access);
    }
    let parent = node.dir()?.parent();
    st.cwd = Cwd { path, ino, parent };
    Ok(())
}

impl DirSupport for MemFs {
    fn mkdir(&self, path: &str, mode: u32) -> Result<(), FsError> {
        self.mkdirat(AT_FDCWD, path, mode)
    }

    fn mkdirat(&self, dirfd: i32, path: &str, mode: u32) -> Result<(), FsError> {
        let st = &mut *self.lock();
        mkdir_impl(st, dirfd, path, mode)
    }

    fn rmdir(&self, path: &str) -> Result<(), FsError> {
        let st = &mut *self.lock();
        crate::ops_link::unlink_impl(st, AT_FDCWD, path, AT_REMOVEDIR)
    }

    fn getdents(&self, fd: i32, buf: &mut [u8]) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        getdents_impl(st, fd, buf)
    }

    fn chdir(&self, path: &str) -> Result<(), FsError> {
        let st = &mut *self.lock();
        let r = st.resolve_at(AT_FDCWD, path, true)?;
        let ino = r.node()?;
        let abs = absolutize(&st.cwd.path, path);
        set_cwd(st, ino, abs)
    }

    fn fchdir(&self, fd: i32) -> Result<(), FsError> {
        let st = &mut *self.lock();
        let ino = st.fd_ino(fd)?;
        if !st.table.get(ino)?.is_dir() {
            return Err(FsError::NotDir);
        }
        let abs = st.abs_path_of(ino)?;
        set_cwd(st, ino, abs)
    }

    fn getcwd(&self, size: usize) -> Result<String, FsError> {
        if size == 0 {
            return Err(FsError::Invalid("zero-sized cwd buffer"));
        }
        let st = &*self.lock();
        if st.cwd.path.len() + 1 > size {
            return Err(FsError::Range);
        }
        Ok(st.cwd.path.clone())
    }
}
