//! Inodes: base metadata plus a per-kind payload.
//!
//! The stable id (`ino`) identifies the object for its whole lifetime; the
//! slot index (`ndx`) is its current position in the inode table and moves
//! as the table compacts. Cross-inode references (directory entries, the
//! cwd, descriptors) always use the stable id.

use crate::dent::DirEntries;
use crate::error::FsError;
use crate::range::RangeList;
use bit_field::BitField;
use memvfs_api::types::{
    file_type_byte, Stat, Statx, StatxTimestamp, TimeSpec, PERM_MASK, STATX_BASIC_STATS,
    STATX_BTIME, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG,
};

/// Stable id of the root directory; also its permanent slot.
pub const ROOT_INO: u64 = 0;

/// Preferred I/O size reported by the stat projections.
pub const BLOCK_SIZE: u64 = 4096;

/// Both faces of a symlink target: the string given at creation, returned
/// verbatim by `readlink`, and the form resolved against the cwd of that
/// moment, used when following.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    /// The target exactly as given.
    pub raw: String,
    /// The target resolved against the creation-time cwd.
    pub resolved: String,
}

/// The per-kind payload of an inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A regular file's sparse content.
    Regular(RangeList),
    /// A directory's entry list.
    Directory(DirEntries),
    /// A symlink's target strings.
    Symlink(LinkTarget),
}

/// One file-system object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    /// Stable id, never reassigned while the object lives.
    pub ino: u64,
    /// Current slot in the inode table.
    pub ndx: usize,
    /// Type and permission bits.
    pub mode: u32,
    /// Link count; the threshold for reclamation is zero.
    pub nlink: u32,
    /// Birth time.
    pub btime: TimeSpec,
    /// Last status change.
    pub ctime: TimeSpec,
    /// Last modification.
    pub mtime: TimeSpec,
    /// Last access.
    pub atime: TimeSpec,
    /// Kind-specific payload.
    pub kind: NodeKind,
}

impl Inode {
    fn blank(mode: u32, nlink: u32, now: TimeSpec, kind: NodeKind) -> Inode {
        Inode {
            ino: 0,
            ndx: 0,
            mode,
            nlink,
            btime: now,
            ctime: now,
            mtime: now,
            atime: now,
            kind,
        }
    }

    /// A fresh regular file with one link.
    pub fn new_regular(perm: u32, now: TimeSpec) -> Inode {
        Inode::blank(
            S_IFREG | (perm & PERM_MASK),
            1,
            now,
            NodeKind::Regular(RangeList::new()),
        )
    }

    /// A fresh anonymous regular file (tmpfile); reachable only through a
    /// descriptor until linked in, so it starts with no links.
    pub fn new_tmpfile(perm: u32, now: TimeSpec) -> Inode {
        let mut n = Inode::new_regular(perm, now);
        n.nlink = 0;
        n
    }

    /// A fresh directory. The pinned pair points at placeholder ids; the
    /// caller repoints them once the table has assigned the real id.
    pub fn new_directory(perm: u32, now: TimeSpec) -> Inode {
        Inode::blank(
            S_IFDIR | (perm & PERM_MASK),
            2,
            now,
            NodeKind::Directory(DirEntries::new(0, 0)),
        )
    }

    /// A fresh symlink; mode is always `0777` and the mask never applies.
    pub fn new_symlink(raw: String, resolved: String, now: TimeSpec) -> Inode {
        Inode::blank(
            S_IFLNK | 0o777,
            1,
            now,
            NodeKind::Symlink(LinkTarget { raw, resolved }),
        )
    }

    /// Whether this is a directory.
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Whether this is a regular file.
    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Whether this is a symlink.
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// The twelve permission bits.
    pub fn perm(&self) -> u32 {
        self.mode.get_bits(0..12)
    }

    /// Replace the permission bits, preserving the type field.
    pub fn set_perm(&mut self, perm: u32) {
        self.mode.set_bits(0..12, perm & PERM_MASK);
    }

    /// Whether the owner class grants `want`, an rwx triple (`0..=7`).
    pub fn grants(&self, want: u32) -> bool {
        self.mode.get_bits(6..9) & want == want
    }

    /// Logical size in bytes: content size, summed entry names, or raw
    /// target length.
    pub fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::Regular(data) => data.size(),
            NodeKind::Directory(entries) => entries.byte_size(),
            NodeKind::Symlink(t) => t.raw.len() as u64,
        }
    }

    /// Bytes backed by memory; only regular content allocates.
    pub fn allocated(&self) -> u64 {
        match &self.kind {
            NodeKind::Regular(data) => data.allocated(),
            _ => 0,
        }
    }

    /// The entry list, or a corruption error for non-directories.
    pub fn dir(&self) -> Result<&DirEntries, FsError> {
        match &self.kind {
            NodeKind::Directory(entries) => Ok(entries),
            _ => Err(FsError::Corrupt("directory payload expected")),
        }
    }

    /// Mutable entry list access.
    pub fn dir_mut(&mut self) -> Result<&mut DirEntries, FsError> {
        match &mut self.kind {
            NodeKind::Directory(entries) => Ok(entries),
            _ => Err(FsError::Corrupt("directory payload expected")),
        }
    }

    /// The sparse content, or a corruption error for non-regular inodes.
    pub fn data(&self) -> Result<&RangeList, FsError> {
        match &self.kind {
            NodeKind::Regular(data) => Ok(data),
            _ => Err(FsError::Corrupt("regular payload expected")),
        }
    }

    /// Mutable sparse content access.
    pub fn data_mut(&mut self) -> Result<&mut RangeList, FsError> {
        match &mut self.kind {
            NodeKind::Regular(data) => Ok(data),
            _ => Err(FsError::Corrupt("regular payload expected")),
        }
    }

    /// The symlink target pair, or a corruption error otherwise.
    pub fn link(&self) -> Result<&LinkTarget, FsError> {
        match &self.kind {
            NodeKind::Symlink(t) => Ok(t),
            _ => Err(FsError::Corrupt("symlink payload expected")),
        }
    }

    /// The directory-entry type byte of this inode.
    pub fn type_byte(&self) -> u8 {
        file_type_byte(self.mode)
    }

    /// The classic stat projection.
    pub fn stat(&self) -> Stat {
        Stat {
            st_dev: 0,
            st_ino: self.ino,
            st_nlink: u64::from(self.nlink),
            st_mode: self.mode,
            st_uid: 0,
            st_gid: 0,
            st_rdev: 0,
            st_size: self.size(),
            st_blksize: BLOCK_SIZE,
            st_blocks: (self.allocated() + 511) / 512,
            st_atim: self.atime,
            st_mtim: self.mtime,
            st_ctim: self.ctime,
        }
    }

    /// The extended stat projection; `mask` filters the reported field set,
    /// the fields themselves are always filled.
    pub fn statx(&self, mask: u32) -> Statx {
        Statx {
            stx_mask: (STATX_BASIC_STATS | STATX_BTIME) & mask,
            stx_blksize: BLOCK_SIZE as u32,
            stx_nlink: self.nlink,
            stx_uid: 0,
            stx_gid: 0,
            stx_mode: self.mode as u16,
            stx_ino: self.ino,
            stx_size: self.size(),
            stx_blocks: (self.allocated() + 511) / 512,
            stx_atime: StatxTimestamp::from(self.atime),
            stx_btime: StatxTimestamp::from(self.btime),
            stx_ctime: StatxTimestamp::from(self.ctime),
            stx_mtime: StatxTimestamp::from(self.mtime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memvfs_api::types::{DT_DIR, DT_LNK, DT_REG};

    fn t0() -> TimeSpec {
        TimeSpec { sec: 100, nsec: 7 }
    }

    #[test]
    fn kinds_carry_their_type_bits() {
        assert_eq!(Inode::new_regular(0o644, t0()).type_byte(), DT_REG);
        assert_eq!(Inode::new_directory(0o755, t0()).type_byte(), DT_DIR);
        let l = Inode::new_symlink("t".into(), "/t".into(), t0());
        assert_eq!(l.type_byte(), DT_LNK);
        assert_eq!(l.perm(), 0o777);
    }

    #[test]
    fn set_perm_preserves_the_type_field() {
        let mut n = Inode::new_regular(0o644, t0());
        n.set_perm(0o7777);
        assert!(n.is_regular());
        assert_eq!(n.perm(), 0o7777);
        n.set_perm(0);
        assert!(n.is_regular());
        assert_eq!(n.perm(), 0);
    }

    #[test]
    fn grants_reads_the_owner_class_only() {
        let n = Inode::new_regular(0o400, t0());
        assert!(n.grants(0o4));
        assert!(!n.grants(0o2));
        // group/other bits do not grant the implicit subject anything
        let n = Inode::new_regular(0o044, t0());
        assert!(!n.grants(0o4));
    }

    #[test]
    fn symlink_size_is_the_raw_target_length() {
        let l = Inode::new_symlink("abc".into(), "/x/abc".into(), t0());
        assert_eq!(l.size(), 3);
    }

    #[test]
    fn stat_counts_allocated_blocks_sparsely() {
        let mut n = Inode::new_regular(0o644, t0());
        n.data_mut().unwrap().write(1_000_000, b"X").unwrap();
        let st = n.stat();
        assert_eq!(st.st_size, 1_000_001);
        assert_eq!(st.st_blocks, 1); // one byte allocated, rounded up
        assert_eq!(st.st_blksize, BLOCK_SIZE);
    }

    #[test]
    fn statx_mask_filters_the_reported_set() {
        let n = Inode::new_regular(0o644, t0());
        let sx = n.statx(STATX_BTIME);
        assert_eq!(sx.stx_mask, STATX_BTIME);
        assert_eq!(sx.stx_btime.tv_sec, 100);
        let sx = n.statx(u32::MAX);
        assert_eq!(sx.stx_mask, STATX_BASIC_STATS | STATX_BTIME);
    }
}
