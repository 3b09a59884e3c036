//! Types and constants shared by the engine and its bindings.
//!
//! The flag words mirror the classic Linux values so a binding can pass its
//! caller's arguments straight through. Only the flags listed here are part
//! of the surface; the engine rejects any unknown bit with `EINVAL`.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Largest byte count a single read/write-class call transfers; anything
/// larger is clamped, never rejected.
pub const RW_LIMIT: u64 = 0x7FFF_F000;

/// Largest representable file size; a write or truncate reaching past this
/// fails with `EFBIG`.
pub const MAX_FILE_SIZE: u64 = i64::MAX as u64;

// --- mode word -------------------------------------------------------------

/// Mask of the file-type field of a mode word.
pub const S_IFMT: u32 = 0o170000;
/// Regular file type bits.
pub const S_IFREG: u32 = 0o100000;
/// Directory type bits.
pub const S_IFDIR: u32 = 0o040000;
/// Symbolic link type bits.
pub const S_IFLNK: u32 = 0o120000;
/// Mask of the twelve permission bits.
pub const PERM_MASK: u32 = 0o7777;

/// Directory-entry type byte for a regular file.
pub const DT_REG: u8 = 8;
/// Directory-entry type byte for a directory.
pub const DT_DIR: u8 = 4;
/// Directory-entry type byte for a symbolic link.
pub const DT_LNK: u8 = 10;
/// Directory-entry type byte for anything else.
pub const DT_UNKNOWN: u8 = 0;

/// The directory-entry type byte of a mode word: its type field shifted
/// right by twelve.
pub fn file_type_byte(mode: u32) -> u8 {
    ((mode & S_IFMT) >> 12) as u8
}

// --- open(2) flags ---------------------------------------------------------

/// Open read-only.
pub const O_RDONLY: i32 = 0o0;
/// Open write-only.
pub const O_WRONLY: i32 = 0o1;
/// Open read-write.
pub const O_RDWR: i32 = 0o2;
/// Mask of the access-mode bits.
pub const O_ACCMODE: i32 = 0o3;
/// Create the file if it does not exist.
pub const O_CREAT: i32 = 0o100;
/// With `O_CREAT`, fail if the file exists; also implies no-follow.
pub const O_EXCL: i32 = 0o200;
/// Truncate a regular file to zero length on open.
pub const O_TRUNC: i32 = 0o1000;
/// Every write lands at end-of-file.
pub const O_APPEND: i32 = 0o2000;
/// Fail unless the path names a directory.
pub const O_DIRECTORY: i32 = 0o200000;
/// Fail with `ELOOP` when the terminal component is a symlink.
pub const O_NOFOLLOW: i32 = 0o400000;
/// Reads through this descriptor do not update the access time.
pub const O_NOATIME: i32 = 0o1000000;
/// Accepted and ignored; a single-process engine never execs.
pub const O_CLOEXEC: i32 = 0o2000000;
/// Create an anonymous regular file below the named directory, reachable
/// only through the returned descriptor.
pub const O_TMPFILE: i32 = 0o20200000;

// --- *at(2) flags ----------------------------------------------------------

/// Sentinel directory fd meaning "the current working directory".
pub const AT_FDCWD: i32 = -100;
/// Do not follow a terminal symlink.
pub const AT_SYMLINK_NOFOLLOW: i32 = 0x100;
/// `unlinkat`: remove a directory instead of a file.
pub const AT_REMOVEDIR: i32 = 0x200;
/// `faccessat`: accepted and ignored (single implicit subject).
pub const AT_EACCESS: i32 = 0x200;
/// `linkat`: follow a terminal symlink on the source side.
pub const AT_SYMLINK_FOLLOW: i32 = 0x400;
/// Operate on the fd itself when the path is empty.
pub const AT_EMPTY_PATH: i32 = 0x1000;

// --- lseek(2) whence -------------------------------------------------------

/// Seek to an absolute offset.
pub const SEEK_SET: i32 = 0;
/// Seek relative to the current offset.
pub const SEEK_CUR: i32 = 1;
/// Seek relative to end-of-file.
pub const SEEK_END: i32 = 2;
/// Seek to the next data segment at or after the offset.
pub const SEEK_DATA: i32 = 3;
/// Seek to the next hole at or after the offset.
pub const SEEK_HOLE: i32 = 4;

// --- renameat2(2) flags ----------------------------------------------------

/// Fail if the destination exists.
pub const RENAME_NOREPLACE: u32 = 1;
/// Atomically exchange source and destination.
pub const RENAME_EXCHANGE: u32 = 2;
/// Whiteout support; not part of this surface, always rejected.
pub const RENAME_WHITEOUT: u32 = 4;

// --- utimensat(2) sentinels ------------------------------------------------

/// Nanosecond sentinel: set the field from the clock.
pub const UTIME_NOW: i64 = 0x3fffffff;
/// Nanosecond sentinel: leave the field untouched.
pub const UTIME_OMIT: i64 = 0x3ffffffe;

// --- fallocate(2) modes ----------------------------------------------------

/// Allocate without changing the file size.
pub const FALLOC_FL_KEEP_SIZE: i32 = 0x1;
/// Punch a hole; must be combined with `FALLOC_FL_KEEP_SIZE`.
pub const FALLOC_FL_PUNCH_HOLE: i32 = 0x2;

// --- access(2) modes -------------------------------------------------------

/// Test for existence.
pub const F_OK: i32 = 0;
/// Test for execute permission.
pub const X_OK: i32 = 1;
/// Test for write permission.
pub const W_OK: i32 = 2;
/// Test for read permission.
pub const R_OK: i32 = 4;

// --- statx(2) masks --------------------------------------------------------

/// Want the type bits of `stx_mode`.
pub const STATX_TYPE: u32 = 0x1;
/// Want the permission bits of `stx_mode`.
pub const STATX_MODE: u32 = 0x2;
/// Want `stx_nlink`.
pub const STATX_NLINK: u32 = 0x4;
/// Want `stx_uid`.
pub const STATX_UID: u32 = 0x8;
/// Want `stx_gid`.
pub const STATX_GID: u32 = 0x10;
/// Want `stx_atime`.
pub const STATX_ATIME: u32 = 0x20;
/// Want `stx_mtime`.
pub const STATX_MTIME: u32 = 0x40;
/// Want `stx_ctime`.
pub const STATX_CTIME: u32 = 0x80;
/// Want `stx_ino`.
pub const STATX_INO: u32 = 0x100;
/// Want `stx_size`.
pub const STATX_SIZE: u32 = 0x200;
/// Want `stx_blocks`.
pub const STATX_BLOCKS: u32 = 0x400;
/// All of the classic stat fields.
pub const STATX_BASIC_STATS: u32 = 0x7ff;
/// Want the birth time.
pub const STATX_BTIME: u32 = 0x800;

// --- time ------------------------------------------------------------------

/// A point in time as seconds and nanoseconds since the epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpec {
    /// Whole seconds.
    pub sec: i64,
    /// Nanoseconds, `0..1_000_000_000` when produced by the engine.
    pub nsec: i64,
}

impl TimeSpec {
    /// The `(seconds, nanoseconds)` pair layout used by the dump image.
    pub fn to_pair(self) -> [i64; 2] {
        [self.sec, self.nsec]
    }

    /// Rebuild from the dump-image pair layout.
    pub fn from_pair(pair: [i64; 2]) -> TimeSpec {
        TimeSpec {
            sec: pair[0],
            nsec: pair[1],
        }
    }
}

// --- metadata projections --------------------------------------------------

/// The classic `stat(2)` projection of an inode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Device id; always zero for the in-memory engine.
    pub st_dev: u64,
    /// Stable inode id.
    pub st_ino: u64,
    /// Link count.
    pub st_nlink: u64,
    /// Type and permission bits.
    pub st_mode: u32,
    /// Owner uid; always zero (single implicit subject).
    pub st_uid: u32,
    /// Owner gid; always zero.
    pub st_gid: u32,
    /// Device id of a special file; never used here.
    pub st_rdev: u64,
    /// Logical size in bytes.
    pub st_size: u64,
    /// Preferred I/O block size.
    pub st_blksize: u64,
    /// Allocated 512-byte blocks; holes contribute nothing.
    pub st_blocks: u64,
    /// Last access.
    pub st_atim: TimeSpec,
    /// Last modification.
    pub st_mtim: TimeSpec,
    /// Last status change.
    pub st_ctim: TimeSpec,
}

/// One timestamp in the `statx(2)` projection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatxTimestamp {
    /// Whole seconds.
    pub tv_sec: i64,
    /// Nanoseconds.
    pub tv_nsec: u32,
}

impl From<TimeSpec> for StatxTimestamp {
    fn from(ts: TimeSpec) -> StatxTimestamp {
        StatxTimestamp {
            tv_sec: ts.sec,
            tv_nsec: ts.nsec as u32,
        }
    }
}

/// The `statx(2)` projection of an inode. `stx_mask` names the fields the
/// engine filled in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statx {
    /// Which fields below carry data.
    pub stx_mask: u32,
    /// Preferred I/O block size.
    pub stx_blksize: u32,
    /// Link count.
    pub stx_nlink: u32,
    /// Owner uid; always zero.
    pub stx_uid: u32,
    /// Owner gid; always zero.
    pub stx_gid: u32,
    /// Type and permission bits.
    pub stx_mode: u16,
    /// Stable inode id.
    pub stx_ino: u64,
    /// Logical size in bytes.
    pub stx_size: u64,
    /// Allocated 512-byte blocks.
    pub stx_blocks: u64,
    /// Last access.
    pub stx_atime: StatxTimestamp,
    /// Birth time.
    pub stx_btime: StatxTimestamp,
    /// Last status change.
    pub stx_ctime: StatxTimestamp,
    /// Last modification.
    pub stx_mtime: StatxTimestamp,
}

// --- engine parameters -----------------------------------------------------

/// Tunable limits an engine instance is created with.
///
/// The defaults are the classic POSIX values; embedders that marshal paths
/// through a constrained transport can lower them. Consistency is checked by
/// `FsCore::params_valid` before an engine is built.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsParams {
    /// Longest accepted path, in bytes, including the terminal component.
    pub path_max: u64,
    /// Longest accepted single component, in bytes.
    pub name_max: u64,
    /// Symlink follow budget shared across one resolution.
    pub follow_max: u64,
    /// Initial file-creation mask; the twelve permission bits only.
    pub umask: u32,
}

impl Default for FsParams {
    fn default() -> FsParams {
        FsParams {
            path_max: 4096,
            name_max: 255,
            follow_max: 40,
            umask: 0o022,
        }
    }
}

// --- dump image records ----------------------------------------------------

/// Magic prefix of a dump image: `"\x7FVFS"`.
pub const DUMP_MAGIC: [u8; 4] = [0x7F, 0x56, 0x46, 0x53];

/// The fixed per-inode record of the dump image.
///
/// Every field is a 64-bit little-endian word; the four timestamps are
/// (seconds, nanoseconds) pairs in birth, status-change, modify, access
/// order. Encoded with [`bincode`], whose default configuration is exactly
/// this fixed-width little-endian layout.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InodeRecord {
    /// Stable inode id.
    pub ino: u64,
    /// Logical size in bytes.
    pub size: u64,
    /// Link count as persisted; zero-link inodes are pruned on load.
    pub nlink: u64,
    /// Type and permission bits.
    pub mode: u64,
    /// Birth, status-change, modify, access timestamps.
    pub times: [[i64; 2]; 4],
}

/// The fixed per-range header of a regular inode's dump payload; the range's
/// raw bytes follow it.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RangeRecord {
    /// Byte offset of the range within the file.
    pub offset: u64,
    /// Length of the range in bytes.
    pub size: u64,
}

lazy_static! {
    /// Size of the encoded [`InodeRecord`], in bytes.
    /// Computed at runtime from the codec itself, so the two can never drift apart.
    pub static ref INODE_RECORD_SIZE: u64 =
        bincode::serialized_size(&InodeRecord::default()).unwrap();
}

lazy_static! {
    /// Size of the encoded [`RangeRecord`], in bytes.
    pub static ref RANGE_RECORD_SIZE: u64 =
        bincode::serialized_size(&RangeRecord::default()).unwrap();
}
