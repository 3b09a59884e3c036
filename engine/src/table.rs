//! The inode table: a compact array that is also the id allocator.
//!
//! Slots are kept sorted by stable id, and a fresh id is the lowest number
//! not in use, found by binary search over the prefix where `ino == ndx`
//! still holds. Removal compacts the array and renumbers the slot index of
//! everything behind the hole; stable ids never move.

use crate::error::FsError;
use crate::inode::Inode;

/// The slot-indexed inode arena.
#[derive(Debug, Default)]
pub struct InodeTable {
    slots: Vec<Inode>,
}

impl InodeTable {
    /// An empty table.
    pub fn new() -> InodeTable {
        InodeTable::default()
    }

    /// Number of live inodes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table is empty; only true before the root exists.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every inode in slot order.
    pub fn slots(&self) -> &[Inode] {
        &self.slots
    }

    /// The inode at a slot index; used by the dump codec.
    pub fn by_slot(&self, ndx: usize) -> Option<&Inode> {
        self.slots.get(ndx)
    }

    fn pos_of(&self, ino: u64) -> Result<usize, FsError> {
        self.slots
            .binary_search_by_key(&ino, |n| n.ino)
            .map_err(|_| FsError::Corrupt("stale inode id"))
    }

    /// Shared lookup by stable id.
    pub fn get(&self, ino: u64) -> Result<&Inode, FsError> {
        let pos = self.pos_of(ino)?;
        Ok(&self.slots[pos])
    }

    /// Mutable lookup by stable id.
    pub fn get_mut(&mut self, ino: u64) -> Result<&mut Inode, FsError> {
        let pos = self.pos_of(ino)?;
        Ok(&mut self.slots[pos])
    }

    /// Mutable access to two distinct inodes at once.
    pub fn pair_mut(&mut self, a: u64, b: u64) -> Result<(&mut Inode, &mut Inode), FsError> {
        if a == b {
            return Err(FsError::Corrupt("aliasing pair lookup"));
        }
        let pa = self.pos_of(a)?;
        let pb = self.pos_of(b)?;
        if pa < pb {
            let (left, right) = self.slots.split_at_mut(pb);
            Ok((&mut left[pa], &mut right[0]))
        } else {
            let (left, right) = self.slots.split_at_mut(pa);
            Ok((&mut right[0], &mut left[pb]))
        }
    }

    /// Insert a fresh inode under the lowest free id and return that id.
    ///
    /// The prefix of the table where every slot still holds `ino == ndx` is
    /// exactly the region with no gaps, so the first slot violating it is
    /// the lowest free id, and the end of the table when none does.
    pub fn push(&mut self, mut inode: Inode) -> Result<u64, FsError> {
        self.slots.try_reserve(1).map_err(|_| FsError::NoMemory)?;
        let mut lo = 0;
        let mut hi = self.slots.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.slots[mid].ino == mid as u64 {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        inode.ino = lo as u64;
        inode.ndx = lo;
        self.slots.insert(lo, inode);
        for i in lo + 1..self.slots.len() {
            self.slots[i].ndx = i;
        }
        Ok(lo as u64)
    }

    /// Append an inode carrying an id taken from a dump image. Ids must
    /// arrive strictly increasing, which is what table order guarantees.
    pub fn push_loaded(&mut self, mut inode: Inode) -> Result<(), FsError> {
        if let Some(last) = self.slots.last() {
            if inode.ino <= last.ino {
                return Err(FsError::Invalid("image inode ids out of order"));
            }
        }
        self.slots.try_reserve(1).map_err(|_| FsError::NoMemory)?;
        inode.ndx = self.slots.len();
        self.slots.push(inode);
        Ok(())
    }

    /// Remove an inode, compacting the array and renumbering the slots
    /// behind it.
    pub fn remove(&mut self, ino: u64) -> Option<Inode> {
        let pos = self.pos_of(ino).ok()?;
        let node = self.slots.remove(pos);
        for i in pos..self.slots.len() {
            self.slots[i].ndx = i;
        }
        Some(node)
    }

    /// Whether `target` is reachable below the directory `dir` through any
    /// chain of user entries. Used to reject renames that would detach a
    /// subtree into itself.
    pub fn contains_descendant(&self, dir: u64, target: u64) -> Result<bool, FsError> {
        let entries = self.get(dir)?.dir()?;
        for d in entries.user() {
            if d.ino == target {
                return Ok(true);
            }
            if self.get(d.ino)?.is_dir() && self.contains_descendant(d.ino, target)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
