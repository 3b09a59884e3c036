//! The engine itself: the state record, the coarse lock around it, and the
//! helpers every operation file shares.
//!
//! One mutex serializes every public operation end to end. Operations lock,
//! resolve, mutate, stamp timestamps, and release; nothing inside ever
//! suspends, so the lock is held only for in-memory work (dump and load may
//! block on their byte stream while holding it, by design).

use crate::error::FsError;
use crate::fd::FdTable;
use crate::inode::{Inode, ROOT_INO};
use crate::resolve::{resolve, Resolved};
use crate::table::InodeTable;
use log::debug;
use memvfs_api::clock::{Clock, SystemClock};
use memvfs_api::fs::FsCore;
use memvfs_api::types::{FsParams, TimeSpec, AT_FDCWD, PERM_MASK};
use std::sync::{Mutex, MutexGuard};

/// Permission bit asked of [`Inode::grants`] for reading.
pub(crate) const WANT_R: u32 = 0o4;
/// Permission bit for writing.
pub(crate) const WANT_W: u32 = 0o2;
/// Permission bit for searching/executing.
pub(crate) const WANT_X: u32 = 0o1;

/// The current working directory: its canonical absolute path, its inode,
/// and its parent's inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cwd {
    /// Canonical absolute path, `.`/`..`-free.
    pub path: String,
    /// The directory's stable id.
    pub ino: u64,
    /// The parent directory's stable id.
    pub parent: u64,
}

/// Everything behind the engine lock.
pub(crate) struct FsState {
    pub table: InodeTable,
    pub fds: FdTable,
    pub cwd: Cwd,
    pub umask: u32,
    pub params: FsParams,
    pub clock: Box<dyn Clock>,
}

impl FsState {
    pub fn now(&self) -> TimeSpec {
        self.clock.now()
    }

    /// The directory a `*at` call starts from: the cwd for `AT_FDCWD`,
    /// otherwise the directory the descriptor holds open.
    pub fn at_dir(&self, dirfd: i32) -> Result<u64, FsError> {
        if dirfd == AT_FDCWD {
            return Ok(self.cwd.ino);
        }
        let ino = self.fds.get(dirfd)?.ino;
        if !self.table.get(ino)?.is_dir() {
            return Err(FsError::NotDir);
        }
        Ok(ino)
    }

    /// The inode any descriptor holds open, directory or not.
    pub fn fd_ino(&self, fd: i32) -> Result<u64, FsError> {
        Ok(self.fds.get(fd)?.ino)
    }

    /// Resolve `path` against `dirfd`, with a fresh follow budget. An
    /// absolute path never consults the descriptor.
    pub fn resolve_at(&self, dirfd: i32, path: &str, follow: bool) -> Result<Resolved, FsError> {
        let start = if path.starts_with('/') {
            ROOT_INO
        } else {
            self.at_dir(dirfd)?
        };
        let mut budget = 0;
        resolve(&self.table, &self.params, start, path, follow, &mut budget)
    }

    /// Require a permission from the owner class of `ino`.
    pub fn require(&self, ino: u64, want: u32) -> Result<(), FsError> {
        if self.table.get(ino)?.grants(want) {
            Ok(())
        } else {
            Err(FsError::Access)
        }
    }

    /// Stamp the access time.
    pub fn touch_atime(&mut self, ino: u64) -> Result<(), FsError> {
        let now = self.now();
        self.table.get_mut(ino)?.atime = now;
        Ok(())
    }

    /// Stamp modify and status-change together, the write-path pair.
    pub fn touch_mtime(&mut self, ino: u64) -> Result<(), FsError> {
        let now = self.now();
        let node = self.table.get_mut(ino)?;
        node.mtime = now;
        node.ctime = now;
        Ok(())
    }

    /// Stamp status-change alone, the metadata pair.
    pub fn touch_ctime(&mut self, ino: u64) -> Result<(), FsError> {
        let now = self.now();
        self.table.get_mut(ino)?.ctime = now;
        Ok(())
    }

    /// Append an entry to a directory and stamp it. The caller unwinds on
    /// its own failures; this helper either fully succeeds or leaves the
    /// directory untouched.
    pub fn add_entry(&mut self, dir: u64, name: &str, child: u64) -> Result<(), FsError> {
        let now = self.now();
        let node = self.table.get_mut(dir)?;
        node.dir_mut()?.push(name.to_string(), child)?;
        node.mtime = now;
        node.ctime = now;
        Ok(())
    }

    /// Drop an inode the moment nothing names it and nothing holds it open.
    /// The root is permanent.
    pub fn reclaim(&mut self, ino: u64) {
        if ino == ROOT_INO {
            return;
        }
        if let Ok(node) = self.table.get(ino) {
            if node.nlink == 0 && self.fds.refs(ino) == 0 {
                self.table.remove(ino);
            }
        }
    }

    /// Rebuild the absolute path of a directory by climbing `..` links and
    /// matching the child in each parent. Used when a descriptor, not a
    /// path, names the new cwd.
    pub fn abs_path_of(&self, ino: u64) -> Result<String, FsError> {
        let mut parts: Vec<String> = Vec::new();
        let mut cur = ino;
        while cur != ROOT_INO {
            let parent = self.table.get(cur)?.dir()?.parent();
            let pdir = self.table.get(parent)?.dir()?;
            let name = pdir
                .user()
                .iter()
                .find(|d| d.ino == cur)
                .map(|d| d.name.clone())
                .ok_or(FsError::Corrupt("directory missing from its parent"))?;
            parts.push(name);
            cur = parent;
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    /// Push a fresh directory inode wired to `parent`, returning its id.
    pub fn push_directory(&mut self, perm: u32, parent: u64) -> Result<u64, FsError> {
        let now = self.now();
        let ino = self.table.push(Inode::new_directory(perm, now))?;
        let entries = self.table.get_mut(ino)?.dir_mut()?;
        entries.set_self(ino);
        entries.set_parent(parent);
        Ok(ino)
    }
}

/// The in-memory POSIX file system engine.
///
/// Cheap to share: every operation takes `&self` and serializes on the
/// internal mutex, so a binding can wrap one `MemFs` in an `Arc` and call
/// in from any thread.
pub struct MemFs {
    pub(crate) state: Mutex<FsState>,
}

impl MemFs {
    /// Lock the engine for one operation. A panic mid-operation poisons the
    /// mutex; the state is still structurally sound, so the lock is taken
    /// over rather than propagating the poison.
    pub(crate) fn lock(&self) -> MutexGuard<'_, FsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Build an engine with an explicit clock; tests inject a fixed one.
    pub fn with_clock(params: &FsParams, clock: Box<dyn Clock>) -> Result<MemFs, FsError> {
        if !Self::params_valid(params) {
            return Err(FsError::Invalid("inconsistent engine parameters"));
        }
        let mut table = InodeTable::new();
        let now = clock.now();
        let mut root = Inode::new_directory(0o755, now);
        {
            let entries = root.dir_mut()?;
            entries.set_self(ROOT_INO);
            entries.set_parent(ROOT_INO);
        }
        let ino = table.push(root)?;
        debug_assert_eq!(ino, ROOT_INO);
        debug!("engine created, umask {:o}", params.umask);
        Ok(MemFs {
            state: Mutex::new(FsState {
                table,
                fds: FdTable::new(),
                cwd: Cwd {
                    path: "/".to_string(),
                    ino: ROOT_INO,
                    parent: ROOT_INO,
                },
                umask: params.umask & PERM_MASK,
                params: *params,
                clock,
            }),
        })
    }

    /// Wrap an already-built state; the load codec finishes there.
    pub(crate) fn from_state(state: FsState) -> MemFs {
        MemFs {
            state: Mutex::new(state),
        }
    }
}

impl FsCore for MemFs {
    type Error = FsError;

    fn params_valid(params: &FsParams) -> bool {
        params.name_max > 0
            && params.path_max > params.name_max
            && params.follow_max > 0
            && params.umask & !PERM_MASK == 0
    }

    fn new_fs(params: &FsParams) -> Result<MemFs, FsError> {
        MemFs::with_clock(params, Box::new(SystemClock))
    }
}
