//! Attribute queries and updates: the stat family, permission bits,
//! timestamps, accessibility, and the creation mask.

use crate::engine::{FsState, MemFs, WANT_R, WANT_W, WANT_X};
use crate::error::FsError;
use memvfs_api::fs::MetaSupport;
use memvfs_api::types::{
    Stat, Statx, TimeSpec, AT_EACCESS, AT_EMPTY_PATH, AT_FDCWD, AT_SYMLINK_NOFOLLOW, F_OK,
    PERM_MASK, R_OK, UTIME_NOW, UTIME_OMIT, W_OK, X_OK,
};

/// Resolve the inode a stat-family call names, honoring
/// `AT_SYMLINK_NOFOLLOW` and `AT_EMPTY_PATH`.
fn node_for(st: &FsState, dirfd: i32, path: &str, flags: i32) -> Result<u64, FsError> {
    if flags & !(AT_SYMLINK_NOFOLLOW | AT_EMPTY_PATH) != 0 {
        return Err(FsError::Invalid("unknown at-flag"));
    }
    if path.is_empty() {
        if flags & AT_EMPTY_PATH != 0 {
            return st.fd_ino(dirfd);
        }
        return Err(FsError::NotFound);
    }
    let follow = flags & AT_SYMLINK_NOFOLLOW == 0;
    st.resolve_at(dirfd, path, follow)?.node()
}

fn chmod_node(st: &mut FsState, ino: u64, mode: u32) -> Result<(), FsError> {
    st.table.get_mut(ino)?.set_perm(mode);
    st.touch_ctime(ino)
}

fn utimens_node(
    st: &mut FsState,
    ino: u64,
    times: Option<&[TimeSpec; 2]>,
) -> Result<(), FsError> {
    if let Some([a, m]) = times {
        for t in &[a, m] {
            let ok = t.nsec == UTIME_NOW
                || t.nsec == UTIME_OMIT
                || (0..1_000_000_000).contains(&t.nsec);
            if !ok {
                return Err(FsError::Invalid("nanoseconds out of range"));
            }
        }
    }
    let now = st.now();
    let node = st.table.get_mut(ino)?;
    let mut changed = false;
    match times {
        None => {
            node.atime = now;
            node.mtime = now;
            changed = true;
        }
        Some([a, m]) => {
            if a.nsec != UTIME_OMIT {
                node.atime = if a.nsec == UTIME_NOW { now } else { *a };
                changed = true;
            }
            if m.nsec != UTIME_OMIT {
                node.mtime = if m.nsec == UTIME_NOW { now } else { *m };
                changed = true;
            }
        }
    }
    if changed {
        node.ctime = now;
    }
    Ok(())
}

fn access_node(st: &FsState, ino: u64, mode: i32) -> Result<(), FsError> {
    if mode & !(R_OK | W_OK | X_OK) != 0 {
        return Err(FsError::Invalid("unknown access mode bit"));
    }
    if mode == F_OK {
        return Ok(()); // resolving it proved existence
    }
    let mut want = 0u32;
    if mode & R_OK != 0 {
        want |= WANT_R;
    }
    if mode & W_OK != 0 {
        want |= WANT_W;
    }
    if mode & X_OK != 0 {
        want |= WANT_X;
    }
    if st.table.get(ino)?.grants(want) {
        Ok(())
    } else {
        Err(FsError::Access)
    }
}

impl MetaSupport for MemFs {
    fn stat(&self, path: &str) -> Result<Stat, FsError> {
        self.fstatat(AT_FDCWD, path, 0)
    }

    fn lstat(&self, path: &str) -> Result<Stat, FsError> {
        self.fstatat(AT_FDCWD, path, AT_SYMLINK_NOFOLLOW)
    }

    fn fstat(&self, fd: i32) -> Result<Stat, FsError> {
        let st = &*self.lock();
        let ino = st.fd_ino(fd)?;
        Ok(st.table.get(ino)?.stat())
    }

    fn fstatat(&self, dirfd: i32, path: &str, flags: i32) -> Result<Stat, FsError> {
        let st = &*self.lock();
        let ino = node_for(st, dirfd, path, flags)?;
        Ok(st.table.get(ino)?.stat())
    }

    fn statx(&self, dirfd: i32, path: &str, flags: i32, mask: u32) -> Result<Statx, FsError> {
        let st = &*self.lock();
        let ino = node_for(st, dirfd, path, flags)?;
        Ok(st.table.get(ino)?.statx(mask))
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError> {
        self.fchmodat(AT_FDCWD, path, mode, 0)
    }

    fn fchmod(&self, fd: i32, mode: u32) -> Result<(), FsError> {
        let st = &mut *self.lock();
        let ino = st.fd_ino(fd)?;
        chmod_node(st, ino, mode)
    }

    fn fchmodat(&self, dirfd: i32, path: &str, mode: u32, flags: i32) -> Result<(), FsError> {
        if flags & !AT_SYMLINK_NOFOLLOW != 0 {
            return Err(FsError::Invalid("unknown fchmodat flag"));
        }
        if flags & AT_SYMLINK_NOFOLLOW != 0 {
            // Accepted by the grammar, unimplemented on purpose.
            return Err(FsError::NotSupported("no-follow chmod"));
        }
        let st = &mut *self.lock();
        let ino = st.resolve_at(dirfd, path, true)?.node()?;
        chmod_node(st, ino, mode)
    }

    fn utimensat(
        &self,
        dirfd: i32,
        path: &str,
        times: Option<&[TimeSpec; 2]>,
        flags: i32,
    ) -> Result<(), FsError> {
        if flags & !AT_SYMLINK_NOFOLLOW != 0 {
            return Err(FsError::Invalid("unknown utimensat flag"));
        }
        let st = &mut *self.lock();
        let follow = flags & AT_SYMLINK_NOFOLLOW == 0;
        let ino = st.resolve_at(dirfd, path, follow)?.node()?;
        utimens_node(st, ino, times)
    }

    fn futimens(&self, fd: i32, times: Option<&[TimeSpec; 2]>) -> Result<(), FsError> {
        let st = &mut *self.lock();
        let ino = st.fd_ino(fd)?;
        utimens_node(st, ino, times)
    }

    fn access(&self, path: &str, mode: i32) -> Result<(), FsError> {
        self.faccessat(AT_FDCWD, path, mode, 0)
    }

    fn faccessat(&self, dirfd: i32, path: &str, mode: i32, flags: i32) -> Result<(), FsError> {
        // AT_EACCESS changes nothing for the single implicit subject.
        if flags & !(AT_EACCESS | AT_SYMLINK_NOFOLLOW) != 0 {
            return Err(FsError::Invalid("unknown faccessat flag"));
        }
        let st = &*self.lock();
        let follow = flags & AT_SYMLINK_NOFOLLOW == 0;
        let ino = st.resolve_at(dirfd, path, follow)?.node()?;
        access_node(st, ino, mode)
    }

    fn umask(&self, mask: u32) -> u32 {
        let st = &mut *self.lock();
        let old = st.umask;
        st.umask = mask & PERM_MASK;
        old
    }
}
