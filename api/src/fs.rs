//! The operation surface an engine implements, split into capability traits.
//!
//! The split mirrors how the engine grows: [`FsCore`] creates an instance,
//! [`FileSupport`] adds descriptor-driven I/O, [`DirSupport`] adds the
//! directory tree and the cwd, [`LinkSupport`] adds naming (hard links,
//! symlinks, rename), [`MetaSupport`] adds attribute queries and updates,
//! and [`DumpSupport`] adds the binary image round-trip.
//!
//! Every method takes `&self`: the engine serializes internally behind its
//! own mutex, so a binding may share one instance across threads freely.
//! Paths are UTF-8 strings; descriptors and flag words are the raw integers
//! a binding receives from its caller. Unknown flag bits are rejected with
//! `EINVAL` rather than ignored.

use crate::types::{FsParams, Stat, Statx, TimeSpec};
use std::io::{Read, Write};
use std::{error, fmt};

/// Construction and configuration of an engine instance.
pub trait FsCore: Sized {
    /// The error type of this implementation. Every error must be
    /// convertible to a POSIX error number by the binding; `Display` gives
    /// the human-readable form.
    type Error: error::Error + fmt::Debug;

    /// Static check that a parameter set is internally consistent: non-zero
    /// limits, a component limit below the path limit, and a mask confined
    /// to the twelve permission bits.
    fn params_valid(params: &FsParams) -> bool;

    /// Build an empty engine: a root directory with mode `0755`, an empty
    /// descriptor table, the cwd at `/`, and the mask from `params`.
    fn new_fs(params: &FsParams) -> Result<Self, Self::Error>;
}

/// Descriptor-driven file I/O.
pub trait FileSupport: FsCore {
    /// Open `path` relative to the cwd. See `openat` for the flag surface.
    fn open(&self, path: &str, flags: i32, mode: u32) -> Result<i32, Self::Error>;

    /// Open `path` relative to `dirfd` and return the lowest free
    /// descriptor number.
    ///
    /// `O_CREAT` without `O_EXCL` reuses an existing file; with `O_EXCL` an
    /// existing file is `EEXIST` and the terminal symlink is never
    /// followed. `O_TRUNC` empties an existing regular file. `O_DIRECTORY`
    /// requires the target to be a directory. `O_TMPFILE` takes a directory
    /// path and creates an anonymous regular file reachable only through
    /// the returned descriptor. Creation modes are filtered through the
    /// engine mask.
    fn openat(&self, dirfd: i32, path: &str, flags: i32, mode: u32) -> Result<i32, Self::Error>;

    /// Equivalent to `open(path, O_CREAT | O_WRONLY | O_TRUNC, mode)`.
    fn creat(&self, path: &str, mode: u32) -> Result<i32, Self::Error>;

    /// Close a descriptor. The last close of an unlinked inode reclaims it.
    fn close(&self, fd: i32) -> Result<(), Self::Error>;

    /// Close every descriptor whose number lies in `[lo, hi]`. No flags are
    /// supported; a non-zero `flags` is `EINVAL`.
    fn close_range(&self, lo: u32, hi: u32, flags: u32) -> Result<(), Self::Error>;

    /// Read at the descriptor's seek offset, advancing it.
    fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Read at an explicit offset; the seek offset is untouched.
    fn pread(&self, fd: i32, buf: &mut [u8], offset: i64) -> Result<usize, Self::Error>;

    /// Gathering read at the seek offset.
    fn readv(&self, fd: i32, bufs: &mut [&mut [u8]]) -> Result<usize, Self::Error>;

    /// Gathering read at an explicit offset.
    fn preadv(&self, fd: i32, bufs: &mut [&mut [u8]], offset: i64) -> Result<usize, Self::Error>;

    /// Write at the descriptor's seek offset (or end-of-file under
    /// `O_APPEND`), advancing it.
    fn write(&self, fd: i32, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Write at an explicit offset; the seek offset is untouched. A
    /// descriptor opened with `O_APPEND` still writes at end-of-file.
    fn pwrite(&self, fd: i32, buf: &[u8], offset: i64) -> Result<usize, Self::Error>;

    /// Scattering write at the seek offset.
    fn writev(&self, fd: i32, bufs: &[&[u8]]) -> Result<usize, Self::Error>;

    /// Scattering write at an explicit offset.
    fn pwritev(&self, fd: i32, bufs: &[&[u8]], offset: i64) -> Result<usize, Self::Error>;

    /// Reposition the seek offset. `SEEK_DATA`/`SEEK_HOLE` find the next
    /// data or hole boundary at or after `offset`, returning the file size
    /// when none remains.
    fn lseek(&self, fd: i32, offset: i64, whence: i32) -> Result<i64, Self::Error>;

    /// Copy up to `count` bytes from `in_fd` to `out_fd` inside the engine.
    /// When `offset` is given it is read from and written back instead of
    /// the input descriptor's seek offset.
    fn sendfile(
        &self,
        out_fd: i32,
        in_fd: i32,
        offset: Option<&mut i64>,
        count: usize,
    ) -> Result<usize, Self::Error>;

    /// Truncate or extend the regular file at `path` to `length` bytes;
    /// extension grows the trailing hole.
    fn truncate(&self, path: &str, length: i64) -> Result<(), Self::Error>;

    /// Truncate or extend through a writable descriptor.
    fn ftruncate(&self, fd: i32, length: i64) -> Result<(), Self::Error>;

    /// Manipulate the allocated ranges of a regular file: mode `0`
    /// allocates `[offset, offset+length)` (growing the file),
    /// `FALLOC_FL_KEEP_SIZE` allocates without growing, and
    /// `FALLOC_FL_PUNCH_HOLE | FALLOC_FL_KEEP_SIZE` deallocates the span
    /// back to a hole.
    fn fallocate(&self, fd: i32, mode: i32, offset: i64, length: i64)
        -> Result<(), Self::Error>;
}

/// The directory tree and the current working directory.
pub trait DirSupport: FsCore {
    /// Create a directory relative to the cwd.
    fn mkdir(&self, path: &str, mode: u32) -> Result<(), Self::Error>;

    /// Create a directory relative to `dirfd`. The new directory carries
    /// `.` and `..` and raises its parent's link count.
    fn mkdirat(&self, dirfd: i32, path: &str, mode: u32) -> Result<(), Self::Error>;

    /// Remove an empty directory (two entries exactly). The root, the cwd,
    /// and any directory held by an open descriptor are `EBUSY`.
    fn rmdir(&self, path: &str) -> Result<(), Self::Error>;

    /// Fill `buf` with directory records starting at the descriptor's
    /// entry-index seek offset, advancing it by the records emitted.
    /// Returns the bytes written, zero at end, and `EINVAL` when `buf`
    /// cannot hold even the first record.
    fn getdents(&self, fd: i32, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Change the cwd, following symlinks; the stored cwd path becomes the
    /// absolute normalized form.
    fn chdir(&self, path: &str) -> Result<(), Self::Error>;

    /// Change the cwd to the directory a descriptor holds open.
    fn fchdir(&self, fd: i32) -> Result<(), Self::Error>;

    /// The absolute cwd path. `size` mirrors the caller's buffer capacity:
    /// zero is `EINVAL` and a path that does not fit (with its NUL) is
    /// `ERANGE`.
    fn getcwd(&self, size: usize) -> Result<String, Self::Error>;
}

/// Naming: hard links, symlinks, unlink, rename.
pub trait LinkSupport: DirSupport {
    /// Create a hard link; the source is not followed if it is a symlink.
    fn link(&self, oldpath: &str, newpath: &str) -> Result<(), Self::Error>;

    /// Create a hard link relative to two directory descriptors.
    /// `AT_SYMLINK_FOLLOW` follows a terminal source symlink;
    /// `AT_EMPTY_PATH` links the inode `olddirfd` itself holds open, which
    /// admits re-linking an `O_TMPFILE` file that was not opened `O_EXCL`.
    /// Directories can never be hard-linked.
    fn linkat(
        &self,
        olddirfd: i32,
        oldpath: &str,
        newdirfd: i32,
        newpath: &str,
        flags: i32,
    ) -> Result<(), Self::Error>;

    /// Create a symlink at `linkpath` holding `target` verbatim, plus the
    /// form resolved against the cwd at creation time used for following.
    fn symlink(&self, target: &str, linkpath: &str) -> Result<(), Self::Error>;

    /// Create a symlink relative to `dirfd`.
    fn symlinkat(&self, target: &str, dirfd: i32, linkpath: &str) -> Result<(), Self::Error>;

    /// Copy the raw (as-created) target into `buf`, truncating silently;
    /// returns the bytes copied, without a terminating NUL.
    fn readlink(&self, path: &str, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// `readlink` relative to `dirfd`.
    fn readlinkat(&self, dirfd: i32, path: &str, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Remove a non-directory entry. An open inode survives until its last
    /// descriptor closes.
    fn unlink(&self, path: &str) -> Result<(), Self::Error>;

    /// Remove an entry relative to `dirfd`; `AT_REMOVEDIR` removes an empty
    /// directory instead, like `rmdir`.
    fn unlinkat(&self, dirfd: i32, path: &str, flags: i32) -> Result<(), Self::Error>;

    /// Rename with no flags; see `renameat2`.
    fn rename(&self, oldpath: &str, newpath: &str) -> Result<(), Self::Error>;

    /// Rename relative to two directory descriptors, no flags.
    fn renameat(
        &self,
        olddirfd: i32,
        oldpath: &str,
        newdirfd: i32,
        newpath: &str,
    ) -> Result<(), Self::Error>;

    /// Rename, replacing an existing destination unless `RENAME_NOREPLACE`,
    /// or atomically swapping the two entries under `RENAME_EXCHANGE`.
    /// A rename onto the same inode succeeds and changes nothing; moving a
    /// directory into its own subtree is rejected.
    fn renameat2(
        &self,
        olddirfd: i32,
        oldpath: &str,
        newdirfd: i32,
        newpath: &str,
        flags: u32,
    ) -> Result<(), Self::Error>;

    /// Create a regular file without opening it. Non-regular node types are
    /// not supported by this engine and fail with `EPERM`.
    fn mknod(&self, path: &str, mode: u32, dev: u64) -> Result<(), Self::Error>;

    /// `mknod` relative to `dirfd`.
    fn mknodat(&self, dirfd: i32, path: &str, mode: u32, dev: u64) -> Result<(), Self::Error>;
}

/// Attribute queries and updates.
pub trait MetaSupport: FsCore {
    /// Stat the inode at `path`, following symlinks.
    fn stat(&self, path: &str) -> Result<Stat, Self::Error>;

    /// Stat without following a terminal symlink.
    fn lstat(&self, path: &str) -> Result<Stat, Self::Error>;

    /// Stat the inode a descriptor holds open.
    fn fstat(&self, fd: i32) -> Result<Stat, Self::Error>;

    /// Stat relative to `dirfd`; honors `AT_SYMLINK_NOFOLLOW` and
    /// `AT_EMPTY_PATH`.
    fn fstatat(&self, dirfd: i32, path: &str, flags: i32) -> Result<Stat, Self::Error>;

    /// Extended stat; `mask` selects the fields the caller wants and
    /// `stx_mask` reports the fields actually filled.
    fn statx(&self, dirfd: i32, path: &str, flags: i32, mask: u32)
        -> Result<Statx, Self::Error>;

    /// Replace the permission bits, preserving the type bits.
    fn chmod(&self, path: &str, mode: u32) -> Result<(), Self::Error>;

    /// `chmod` through a descriptor.
    fn fchmod(&self, fd: i32, mode: u32) -> Result<(), Self::Error>;

    /// `chmod` relative to `dirfd`. `AT_SYMLINK_NOFOLLOW` is accepted by
    /// the flag grammar but unsupported, as on Linux: `EOPNOTSUPP`.
    fn fchmodat(&self, dirfd: i32, path: &str, mode: u32, flags: i32)
        -> Result<(), Self::Error>;

    /// Set access and modification times. `None` means "both now"; within a
    /// pair, `UTIME_NOW` in the nanosecond field takes the clock and
    /// `UTIME_OMIT` leaves the field untouched.
    fn utimensat(
        &self,
        dirfd: i32,
        path: &str,
        times: Option<&[TimeSpec; 2]>,
        flags: i32,
    ) -> Result<(), Self::Error>;

    /// `utimensat` through a descriptor.
    fn futimens(&self, fd: i32, times: Option<&[TimeSpec; 2]>) -> Result<(), Self::Error>;

    /// Check accessibility of `path` against the owner permission class.
    fn access(&self, path: &str, mode: i32) -> Result<(), Self::Error>;

    /// `access` relative to `dirfd`.
    fn faccessat(&self, dirfd: i32, path: &str, mode: i32, flags: i32)
        -> Result<(), Self::Error>;

    /// Replace the file-creation mask, returning the previous one. Only the
    /// twelve permission bits are retained.
    fn umask(&self, mask: u32) -> u32;
}

/// The binary image round-trip.
pub trait DumpSupport: FsCore {
    /// The exact byte size `dump` will produce, so a fixed-size target like
    /// [`crate::image::Image`] can be created up front.
    fn dump_size(&self) -> Result<u64, Self::Error>;

    /// Serialize the whole engine into `w`. The descriptor table and cwd
    /// are runtime state and are not part of the image.
    fn dump(&self, w: &mut dyn Write) -> Result<(), Self::Error>;

    /// Rebuild an engine from an image produced by `dump`. Validates the
    /// magic and every length and index, relinks directory entries, prunes
    /// inodes persisted with zero links, and starts with the cwd at root
    /// and an empty descriptor table. Any short read aborts the load.
    fn load(params: &FsParams, r: &mut dyn Read) -> Result<Self, Self::Error>;
}
