//! Naming operations: hard links, symlinks, unlink, rename, mknod.

use crate::engine::{FsState, MemFs, WANT_W};
use crate::error::FsError;
use crate::inode::Inode;
use crate::resolve::absolutize;
use memvfs_api::fs::LinkSupport;
use memvfs_api::types::{
    AT_EMPTY_PATH, AT_FDCWD, AT_REMOVEDIR, AT_SYMLINK_FOLLOW, O_EXCL, O_TMPFILE, PERM_MASK,
    RENAME_EXCHANGE, RENAME_NOREPLACE, S_IFMT, S_IFREG,
};

/// Shared by `unlink`, `unlinkat` and `rmdir`.
pub(crate) fn unlink_impl(st: &mut FsState, dirfd: i32, path: &str, flags: i32) -> Result<(), FsError> {
    if flags & !AT_REMOVEDIR != 0 {
        return Err(FsError::Invalid("unknown unlinkat flag"));
    }
    let remove_dir = flags & AT_REMOVEDIR != 0;

    let r = st.resolve_at(dirfd, path, false)?;
    if r.name == "/" {
        return Err(FsError::Busy("the root directory"));
    }
    if r.name == "." {
        return Err(if remove_dir {
            FsError::Invalid("removal of `.`")
        } else {
            FsError::IsDir
        });
    }
    if r.name == ".." {
        return Err(if remove_dir {
            FsError::NotEmpty
        } else {
            FsError::IsDir
        });
    }
    let ino = r.node()?;
    st.require(r.dir, WANT_W)?;

    let node = st.table.get(ino)?;
    if remove_dir {
        if !node.is_dir() {
            return Err(FsError::NotDir);
        }
        if !node.dir()?.is_empty() {
            return Err(FsError::NotEmpty);
        }
        if ino == st.cwd.ino {
            return Err(FsError::Busy("the working directory"));
        }
        if st.fds.refs(ino) > 0 {
            return Err(FsError::Busy("directory held open"));
        }
        {
            let parent = st.table.get_mut(r.dir)?;
            parent
                .dir_mut()?
                .remove(&r.name)
                .ok_or(FsError::Corrupt("resolved entry vanished"))?;
            parent.nlink -= 1;
        }
        st.touch_mtime(r.dir)?;
        st.table.get_mut(ino)?.nlink = 0;
        st.reclaim(ino);
    } else {
        if node.is_dir() {
            return Err(FsError::IsDir);
        }
        st.table
            .get_mut(r.dir)?
            .dir_mut()?
            .remove(&r.name)
            .ok_or(FsError::Corrupt("resolved entry vanished"))?;
        st.touch_mtime(r.dir)?;
        let node = st.table.get_mut(ino)?;
        node.nlink = node.nlink.saturating_sub(1);
        st.touch_ctime(ino)?;
        st.reclaim(ino);
    }
    Ok(())
}

fn linkat_impl(
    st: &mut FsState,
    olddirfd: i32,
    oldpath: &str,
    newdirfd: i32,
    newpath: &str,
    flags: i32,
) -> Result<(), FsError> {
    if flags & !(AT_SYMLINK_FOLLOW | AT_EMPTY_PATH) != 0 {
        return Err(FsError::Invalid("unknown linkat flag"));
    }

    let src = if oldpath.is_empty() && flags & AT_EMPTY_PATH != 0 {
        // Link the inode the descriptor itself holds open.
        let fdesc = st.fds.get(olddirfd)?;
        let (ino, fflags) = (fdesc.ino, fdesc.flags);
        if st.table.get(ino)?.nlink == 0 {
            // Only a tmpfile not opened exclusive may come back from zero.
            let tmp_linkable = fflags & O_TMPFILE == O_TMPFILE && fflags & O_EXCL == 0;
            if !tmp_linkable {
                return Err(FsError::NotFound);
            }
        }
        ino
    } else {
        let r = st.resolve_at(olddirfd, oldpath, flags & AT_SYMLINK_FOLLOW != 0)?;
        r.node()?
    };
    if st.table.get(src)?.is_dir() {
        return Err(FsError::NotPermitted("hard link to a directory"));
    }

    let rn = st.resolve_at(newdirfd, newpath, false)?;
    if rn.ino.is_some() {
        return Err(FsError::Exists);
    }
    if rn.dir_required {
        return Err(FsError::NotFound);
    }
    st.require(rn.dir, WANT_W)?;

    st.add_entry(rn.dir, &rn.name, src)?;
    st.table.get_mut(src)?.nlink += 1;
    st.touch_ctime(src)?;
    Ok(())
}

fn symlinkat_impl(
    st: &mut FsState,
    target: &str,
    dirfd: i32,
    linkpath: &str,
) -> Result<(), FsError> {
    if target.is_empty() {
        return Err(FsError::NotFound);
    }
    if target.len() as u64 >= st.params.path_max {
        return Err(FsError::NameTooLong);
    }
    if target.contains('\0') {
        return Err(FsError::Invalid("NUL byte in symlink target"));
    }

    let r = st.resolve_at(dirfd, linkpath, false)?;
    if r.ino.is_some() {
        return Err(FsError::Exists);
    }
    if r.dir_required {
        return Err(FsError::NotFound);
    }
    st.require(r.dir, WANT_W)?;

    // The second face of the target: pinned to the cwd of this moment (the
    // descriptor's directory for the *at form).
    let base = if dirfd == AT_FDCWD {
        st.cwd.path.clone()
    } else {
        st.abs_path_of(st.at_dir(dirfd)?)?
    };
    let resolved = absolutize(&base, target);

    let now = st.now();
    let ino = st
        .table
        .push(Inode::new_symlink(target.to_string(), resolved, now))?;
    if let Err(e) = st.add_entry(r.dir, &r.name, ino) {
        st.table.remove(ino);
        return Err(e);
    }
    Ok(())
}

fn readlinkat_impl(
    st: &mut FsState,
    dirfd: i32,
    path: &str,
    buf: &mut [u8],
) -> Result<usize, FsError> {
    if buf.is_empty() {
        return Err(FsError::Invalid("zero-sized readlink buffer"));
    }
    let r = st.resolve_at(dirfd, path, false)?;
    let ino = r.node()?;
    let n = {
        let node = st.table.get(ino)?;
        if !node.is_symlink() {
            return Err(FsError::Invalid("readlink of a non-symlink"));
        }
        let raw = node.link()?.raw.as_bytes();
        let n = raw.len().min(buf.len());
        buf[..n].copy_from_slice(&raw[..n]);
        n
    };
    st.touch_atime(ino)?;
    Ok(n)
}

fn mknodat_impl(
    st: &mut FsState,
    dirfd: i32,
    path: &str,
    mode: u32,
    _dev: u64,
) -> Result<(), FsError> {
    match mode & S_IFMT {
        0 | S_IFREG => {}
        _ => return Err(FsError::NotPermitted("node type not supported")),
    }
    let r = st.resolve_at(dirfd, path, false)?;
    if r.ino.is_some() {
        return Err(FsError::Exists);
    }
    if r.dir_required {
        return Err(FsError::NotFound);
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
    Ok(())
}

fn rename_impl(
    st: &mut FsState,
    olddirfd: i32,
    oldpath: &str,
    newdirfd: i32,
    newpath: &str,
    flags: u32,
) -> Result<(), FsError> {
    if flags & !(RENAME_NOREPLACE | RENAME_EXCHANGE) != 0 {
        return Err(FsError::Invalid("unknown rename flag"));
    }
    if flags & RENAME_NOREPLACE != 0 && flags & RENAME_EXCHANGE != 0 {
        return Err(FsError::Invalid("noreplace combined with exchange"));
    }

    let ro = st.resolve_at(olddirfd, oldpath, false)?;
    if ro.name == "." || ro.name == ".." || ro.name == "/" {
        return Err(FsError::Busy("rename of `.`, `..` or the root"));
    }
    let rn = st.resolve_at(newdirfd, newpath, false)?;
    if rn.name == "." || rn.name == ".." || rn.name == "/" {
        return Err(FsError::Busy("rename onto `.`, `..` or the root"));
    }

    let src = ro.node()?;
    st.require(ro.dir, WANT_W)?;
    st.require(rn.dir, WANT_W)?;
    let src_is_dir = st.table.get(src)?.is_dir();
    if rn.dir_required && !src_is_dir {
        return Err(FsError::NotDir);
    }

    if flags & RENAME_EXCHANGE != 0 {
        let dst = rn.node()?;
        if src == dst {
            return Ok(());
        }
        let dst_is_dir = st.table.get(dst)?.is_dir();
        if src_is_dir && (rn.dir == src || st.table.contains_descendant(src, rn.dir)?) {
            return Err(FsError::Invalid("exchange into its own subtree"));
        }
        if dst_is_dir && (ro.dir == dst || st.table.contains_descendant(dst, ro.dir)?) {
            return Err(FsError::Invalid("exchange into its own subtree"));
        }

        st.table
            .get_mut(ro.dir)?
            .dir_mut()?
            .repoint(&ro.name, dst)
            .ok_or(FsError::Corrupt("resolved entry vanished"))?;
        st.table
            .get_mut(rn.dir)?
            .dir_mut()?
            .repoint(&rn.name, src)
            .ok_or(FsError::Corrupt("resolved entry vanished"))?;

        if ro.dir != rn.dir {
            if src_is_dir {
                st.table.get_mut(src)?.dir_mut()?.set_parent(rn.dir);
                st.table.get_mut(ro.dir)?.nlink -= 1;
                st.table.get_mut(rn.dir)?.nlink += 1;
            }
            if dst_is_dir {
                st.table.get_mut(dst)?.dir_mut()?.set_parent(ro.dir);
                st.table.get_mut(rn.dir)?.nlink -= 1;
                st.table.get_mut(ro.dir)?.nlink += 1;
            }
        }
        st.touch_mtime(ro.dir)?;
        if rn.dir != ro.dir {
            st.touch_mtime(rn.dir)?;
        }
        st.touch_ctime(src)?;
        st.touch_ctime(dst)?;
        return Ok(());
    }

    if let Some(dst) = rn.ino {
        if flags & RENAME_NOREPLACE != 0 {
            return Err(FsError::Exists);
        }
        // Two names for one inode: rename does nothing and succeeds.
        if dst == src {
            return Ok(());
        }
    }
    if ro.dir == rn.dir && ro.name == rn.name {
        return Ok(());
    }
    if src_is_dir && (rn.dir == src || st.table.contains_descendant(src, rn.dir)?) {
        return Err(FsError::Invalid("rename into its own subtree"));
    }

    if let Some(dst) = rn.ino {
        let dnode = st.table.get(dst)?;
        if dnode.is_dir() {
            if !src_is_dir {
                return Err(FsError::IsDir);
            }
            if !dnode.dir()?.is_empty() {
                return Err(FsError::NotEmpty);
            }
            if dst == st.cwd.ino {
                return Err(FsError::Busy("the working directory"));
            }
            if st.fds.refs(dst) > 0 {
                return Err(FsError::Busy("directory held open"));
            }
        } else if src_is_dir {
            return Err(FsError::NotDir);
        }
    }

    // Push the new name first: the only fallible step happens while the old
    // entry still exists, so failure leaves the tree untouched.
    st.table
        .get_mut(rn.dir)?
        .dir_mut()?
        .push(rn.name.clone(), src)?;
    st.table.get_mut(ro.dir)?.dir_mut()?.remove(&ro.name);
    if let Some(dst) = rn.ino {
        // The replaced holder of the name sits in front of the pushed one,
        // so the first match is the right entry to drop.
        st.table.get_mut(rn.dir)?.dir_mut()?.remove(&rn.name);
        let dst_is_dir = st.table.get(dst)?.is_dir();
        if dst_is_dir {
            st.table.get_mut(dst)?.nlink = 0;
            st.table.get_mut(rn.dir)?.nlink -= 1;
        } else {
            let n = st.table.get_mut(dst)?;
            n.nlink = n.nlink.saturating_sub(1);
            st.touch_ctime(dst)?;
        }
        st.reclaim(dst);
    }
    if src_is_dir && ro.dir != rn.dir {
        st.table.get_mut(src)?.dir_mut()?.set_parent(rn.dir);
        st.table.get_mut(ro.dir)?.nlink -= 1;
        st.table.get_mut(rn.dir)?.nlink += 1;
    }
    st.touch_mtime(ro.dir)?;
    if rn.dir != ro.dir {
        st.touch_mtime(rn.dir)?;
    }
    st.touch_ctime(src)?;
    Ok(())
}

impl LinkSupport for MemFs {
    fn link(&self, oldpath: &str, newpath: &str) -> Result<(), FsError> {
        self.linkat(AT_FDCWD, oldpath, AT_FDCWD, newpath, 0)
    }

    fn linkat(
        &self,
        olddirfd: i32,
        oldpath: &str,
        newdirfd: i32,
        newpath: &str,
        flags: i32,
    ) -> Result<(), FsError> {
        let st = &mut *self.lock();
        linkat_impl(st, olddirfd, oldpath, newdirfd, newpath, flags)
    }

    fn symlink(&self, target: &str, linkpath: &str) -> Result<(), FsError> {
        self.symlinkat(target, AT_FDCWD, linkpath)
    }

    fn symlinkat(&self, target: &str, dirfd: i32, linkpath: &str) -> Result<(), FsError> {
        let st = &mut *self.lock();
        symlinkat_impl(st, target, dirfd, linkpath)
    }

    fn readlink(&self, path: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        self.readlinkat(AT_FDCWD, path, buf)
    }

    fn readlinkat(&self, dirfd: i32, path: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        let st = &mut *self.lock();
        readlinkat_impl(st, dirfd, path, buf)
    }

    fn unlink(&self, path: &str) -> Result<(), FsError> {
        self.unlinkat(AT_FDCWD, path, 0)
    }

    fn unlinkat(&self, dirfd: i32, path: &str, flags: i32) -> Result<(), FsError> {
        let st = &mut *self.lock();
        unlink_impl(st, dirfd, path, flags)
    }

    fn rename(&self, oldpath: &str, newpath: &str) -> Result<(), FsError> {
        self.renameat2(AT_FDCWD, oldpath, AT_FDCWD, newpath, 0)
    }

    fn renameat(
        &self,
        olddirfd: i32,
        oldpath: &str,
        newdirfd: i32,
        newpath: &str,
    ) -> Result<(), FsError> {
        self.renameat2(olddirfd, oldpath, newdirfd, newpath, 0)
    }

    fn renameat2(
        &self,
        olddirfd: i32,
        oldpath: &str,
        newdirfd: i32,
        newpath: &str,
        flags: u32,
    ) -> Result<(), FsError> {
        let st = &mut *self.lock();
        rename_impl(st, olddirfd, oldpath, newdirfd, newpath, flags)
    }

    fn mknod(&self, path: &str, mode: u32, dev: u64) -> Result<(), FsError> {
        self.mknodat(AT_FDCWD, path, mode, dev)
    }

    fn mknodat(&self, dirfd: i32, path: &str, mode: u32, dev: u64) -> Result<(), FsError> {
        let st = &mut *self.lock();
        mknodat_impl(st, dirfd, path, mode, dev)
    }
}
