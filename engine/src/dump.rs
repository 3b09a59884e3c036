//! The binary image codec: serialize the whole engine, verify and rebuild.
//!
//! The image is sequential: the magic, an inode count, then every inode in
//! slot order as a fixed record followed by a kind-specific payload.
//! Directory payloads reference other inodes by slot index, which is stable
//! inside one image; a relink pass swaps them for stable ids once the whole
//! table exists. Loading trusts nothing: every length, index and name is
//! checked, and any short read aborts the load as a whole.

use crate::dent::DirEntries;
use crate::engine::{Cwd, FsState, MemFs};
use crate::error::FsError;
use crate::fd::FdTable;
use crate::inode::{Inode, LinkTarget, NodeKind, ROOT_INO};
use crate::table::InodeTable;
use log::{debug, warn};
use memvfs_api::clock::SystemClock;
use memvfs_api::error::ApiError;
use memvfs_api::fs::{DumpSupport, FsCore};
use memvfs_api::types::{
    FsParams, InodeRecord, RangeRecord, TimeSpec, DUMP_MAGIC, INODE_RECORD_SIZE, PERM_MASK,
    RANGE_RECORD_SIZE, RW_LIMIT, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG,
};
use std::io::{Read, Write};

fn image_size(st: &FsState) -> u64 {
    let mut total = DUMP_MAGIC.len() as u64 + 8;
    for node in st.table.slots() {
        total += *INODE_RECORD_SIZE;
        match &node.kind {
            NodeKind::Symlink(t) => {
                total += t.resolved.len() as u64 + 1 + t.raw.len() as u64;
            }
            NodeKind::Directory(entries) => {
                total += 8 + 8;
                for e in entries.user() {
                    total += 8 + e.name.len() as u64 + 1;
                }
            }
            NodeKind::Regular(data) => {
                if data.size() > 0 {
                    total += 8;
                    for r in data.ranges() {
                        total += *RANGE_RECORD_SIZE + r.len();
                    }
                }
            }
        }
    }
    total
}

/// Raw payload bytes go out in bounded chunks.
fn write_blob(w: &mut dyn Write, bytes: &[u8]) -> Result<(), FsError> {
    for chunk in bytes.chunks(RW_LIMIT as usize) {
        w.write_all(chunk).map_err(ApiError::from)?;
    }
    Ok(())
}

fn write_word(w: &mut dyn Write, word: u64) -> Result<(), FsError> {
    bincode::serialize_into(w, &word).map_err(ApiError::from)?;
    Ok(())
}

fn dump_impl(st: &FsState, w: &mut dyn Write) -> Result<(), FsError> {
    w.write_all(&DUMP_MAGIC).map_err(ApiError::from)?;
    write_word(w, st.table.len() as u64)?;

    for node in st.table.slots() {
        let rec = InodeRecord {
            ino: node.ino,
            size: node.size(),
            nlink: u64::from(node.nlink),
            mode: u64::from(node.mode),
            times: [
                node.btime.to_pair(),
                node.ctime.to_pair(),
                node.mtime.to_pair(),
                node.atime.to_pair(),
            ],
        };
        bincode::serialize_into(&mut *w, &rec).map_err(ApiError::from)?;

        match &node.kind {
            NodeKind::Symlink(t) => {
                w.write_all(t.resolved.as_bytes()).map_err(ApiError::from)?;
                w.write_all(&[0]).map_err(ApiError::from)?;
                write_blob(w, t.raw.as_bytes())?;
            }
            NodeKind::Directory(entries) => {
                write_word(w, entries.all().len() as u64)?;
                write_word(w, st.table.get(entries.parent())?.ndx as u64)?;
                for e in entries.user() {
                    write_word(w, st.table.get(e.ino)?.ndx as u64)?;
                    w.write_all(e.name.as_bytes()).map_err(ApiError::from)?;
                    w.write_all(&[0]).map_err(ApiError::from)?;
                }
            }
            NodeKind::Regular(data) => {
                if data.size() > 0 {
                    write_word(w, data.ranges().len() as u64)?;
                    for r in data.ranges() {
                        let rr = RangeRecord {
                            offset: r.offset,
                            size: r.len(),
                        };
                        bincode::serialize_into(&mut *w, &rr).map_err(ApiError::from)?;
                        write_blob(w, &r.bytes)?;
                    }
                }
            }
        }
    }
    debug!("dumped {} inodes", st.table.len());
    Ok(())
}

fn read_word(r: &mut dyn Read) -> Result<u64, FsError> {
    let word: u64 = bincode::deserialize_from(r).map_err(ApiError::from)?;
    Ok(word)
}

/// A NUL-terminated string, bounded so a corrupt image cannot balloon.
fn read_cstr(r: &mut dyn Read, cap: u64) -> Result<String, FsError> {
    let mut buf = Vec::new();
    loop {
        let mut b = [0u8; 1];
        r.read_exact(&mut b).map_err(ApiError::from)?;
        if b[0] == 0 {
            break;
        }
        if buf.len() as u64 >= cap {
            return Err(FsError::Invalid("unterminated string in image"));
        }
        buf.push(b[0]);
    }
    String::from_utf8(buf).map_err(|_| FsError::Invalid("non-UTF-8 string in image"))
}

fn read_blob(r: &mut dyn Read, len: u64) -> Result<Vec<u8>, FsError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len as usize)
        .map_err(|_| FsError::NoMemory)?;
    v.resize(len as usize, 0);
    let mut done = 0usize;
    while done < v.len() {
        let take = (v.len() - done).min(RW_LIMIT as usize);
        r.read_exact(&mut v[done..done + take])
            .map_err(ApiError::from)?;
        done += take;
    }
    Ok(v)
}

/// Per-slot directory payload parked until the relink pass.
struct DirImage {
    size: u64,
    parent_ndx: u64,
    entries: Vec<(u64, String)>,
}

fn load_impl(params: &FsParams, r: &mut dyn Read) -> Result<MemFs, FsError> {
    if !MemFs::params_valid(params) {
        return Err(FsError::Invalid("inconsistent engine parameters"));
    }

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(ApiError::from)?;
    if magic != DUMP_MAGIC {
        warn!("image rejected: bad magic {:02x?}", magic);
        return Err(FsError::Invalid("bad image magic"));
    }
    let count = read_word(r)?;
    if count == 0 {
        return Err(FsError::Invalid("image without a root inode"));
    }

    let mut table = InodeTable::new();
    let mut dirs: Vec<Option<DirImage>> = Vec::new();
    dirs.try_reserve(count as usize)
        .map_err(|_| FsError::NoMemory)?;

    for slot in 0..count {
        let rec: InodeRecord = bincode::deserialize_from(&mut *r).map_err(ApiError::from)?;
        if rec.mode > u64::from(u32::MAX) || rec.nlink > u64::from(u32::MAX) {
            return Err(FsError::Invalid("image field out of range"));
        }
        let mode = rec.mode as u32;

        let kind = match mode & S_IFMT {
            S_IFLNK => {
                if rec.size >= params.path_max {
                    return Err(FsError::Invalid("symlink target too long in image"));
                }
                let resolved = read_cstr(r, params.path_max)?;
                if !resolved.starts_with('/') {
                    return Err(FsError::Invalid("relative resolved target in image"));
                }
                let raw_bytes = read_blob(r, rec.size)?;
                let raw = String::from_utf8(raw_bytes)
                    .map_err(|_| FsError::Invalid("non-UTF-8 symlink target"))?;
                NodeKind::Symlink(LinkTarget { raw, resolved })
            }
            S_IFDIR => {
                let total = read_word(r)?;
                if total < 2 {
                    return Err(FsError::Invalid("directory without its pinned pair"));
                }
                let parent_ndx = read_word(r)?;
                if parent_ndx >= count {
                    return Err(FsError::Invalid("parent index out of range"));
                }
                let mut entries = Vec::new();
                entries
                    .try_reserve((total - 2) as usize)
                    .map_err(|_| FsError::NoMemory)?;
                for _ in 0..total - 2 {
                    let child = read_word(r)?;
                    if child >= count {
                        return Err(FsError::Invalid("entry index out of range"));
                    }
                    let name = read_cstr(r, params.name_max)?;
                    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
                        return Err(FsError::Invalid("bad entry name in image"));
                    }
                    entries.push((child, name));
                }
                dirs.push(Some(DirImage {
                    size: rec.size,
                    parent_ndx,
                    entries,
                }));
                // placeholder payload until the relink pass
                let kind = NodeKind::Directory(DirEntries::new(0, 0));
                push_slot(&mut table, slot, &rec, mode, kind)?;
                continue;
            }
            S_IFREG => {
                let mut ranges: Vec<crate::range::DataRange> = Vec::new();
                if rec.size > 0 {
                    let nranges = read_word(r)?;
                    let mut prev_end: Option<u64> = None;
                    for _ in 0..nranges {
                        ranges.try_reserve(1).map_err(|_| FsError::NoMemory)?;
                        let rr: RangeRecord =
                            bincode::deserialize_from(&mut *r).map_err(ApiError::from)?;
                        if rr.size == 0 {
                            return Err(FsError::Invalid("empty range in image"));
                        }
                        let end = rr
                            .offset
                            .checked_add(rr.size)
                            .ok_or(FsError::Invalid("range overflow in image"))?;
                        if end > rec.size {
                            return Err(FsError::Invalid("range past the inode size"));
                        }
                        if let Some(pe) = prev_end {
                            if rr.offset <= pe {
                                return Err(FsError::Invalid("ranges unordered or adjacent"));
                            }
                        }
                        prev_end = Some(end);
                        let bytes = read_blob(r, rr.size)?;
                        ranges.push(crate::range::DataRange {
                            offset: rr.offset,
                            bytes,
                        });
                    }
                }
                NodeKind::Regular(crate::range::RangeList::from_parts(rec.size, ranges))
            }
            _ => return Err(FsError::Invalid("unknown inode type in image")),
        };

        dirs.push(None);
        push_slot(&mut table, slot, &rec, mode, kind)?;
    }

    // The root must sit in slot 0 under id 0 and be a directory.
    match table.by_slot(0) {
        Some(root) if root.ino == ROOT_INO && root.is_dir() => {}
        _ => return Err(FsError::Invalid("image root is not a directory")),
    }

    relink(&mut table, &dirs)?;
    verify_tree(&table)?;
    prune_unlinked(&mut table)?;

    debug!("loaded {} inodes", table.len());
    Ok(MemFs::from_state(FsState {
        table,
        fds: FdTable::new(),
        cwd: Cwd {
            path: "/".to_string(),
            ino: ROOT_INO,
            parent: ROOT_INO,
        },
        umask: params.umask & PERM_MASK,
        params: *params,
        clock: Box::new(SystemClock),
    }))
}

fn push_slot(
    table: &mut InodeTable,
    slot: u64,
    rec: &InodeRecord,
    mode: u32,
    kind: NodeKind,
) -> Result<(), FsError> {
    let node = Inode {
        ino: rec.ino,
        ndx: slot as usize,
        mode,
        nlink: rec.nlink as u32,
        btime: TimeSpec::from_pair(rec.times[0]),
        ctime: TimeSpec::from_pair(rec.times[1]),
        mtime: TimeSpec::from_pair(rec.times[2]),
        atime: TimeSpec::from_pair(rec.times[3]),
        kind,
    };
    table.push_loaded(node)
}

/// Swap parked slot indices for stable ids and rebuild each entry list.
fn relink(table: &mut InodeTable, dirs: &[Option<DirImage>]) -> Result<(), FsError> {
    let ids: Vec<u64> = table.slots().iter().map(|n| n.ino).collect();
    for (slot, meta) in dirs.iter().enumerate() {
        let meta = match meta {
            Some(m) => m,
            None => continue,
        };
        if slot == 0 && meta.parent_ndx != 0 {
            return Err(FsError::Invalid("image root does not parent itself"));
        }
        let self_ino = ids[slot];
        let parent_ino = ids[meta.parent_ndx as usize];
        let mut entries = DirEntries::new(self_ino, parent_ino);
        for (child, name) in &meta.entries {
            entries.push(name.clone(), ids[*child as usize])?;
        }
        if meta.size != entries.byte_size() {
            return Err(FsError::Invalid("directory size does not match its names"));
        }
        *table.get_mut(self_ino)?.dir_mut()? = entries;
    }
    Ok(())
}

/// Every non-root directory must be named by exactly the parent its `..`
/// points at.
fn verify_tree(table: &InodeTable) -> Result<(), FsError> {
    for node in table.slots() {
        if !node.is_dir() || node.ino == ROOT_INO {
            continue;
        }
        let parent = node.dir()?.parent();
        let named = table
            .get(parent)?
            .dir()?
            .user()
            .iter()
            .filter(|d| d.ino == node.ino)
            .count();
        if named != 1 && node.nlink > 0 {
            return Err(FsError::Invalid("directory not linked from its parent"));
        }
    }
    Ok(())
}

/// Inodes persisted with zero links were open-but-unlinked at dump time;
/// with no descriptor table left, they go away now.
fn prune_unlinked(table: &mut InodeTable) -> Result<(), FsError> {
    let dead: Vec<u64> = table
        .slots()
        .iter()
        .filter(|n| n.nlink == 0)
        .map(|n| n.ino)
        .collect();
    for ino in &dead {
        // nothing may still name a dead inode
        for node in table.slots() {
            if let NodeKind::Directory(entries) = &node.kind {
                if entries.user().iter().any(|d| d.ino == *ino) {
                    return Err(FsError::Invalid("zero-link inode still referenced"));
                }
            }
        }
        if let NodeKind::Directory(entries) = &table.get(*ino)?.kind {
            if !entries.is_empty() {
                return Err(FsError::Invalid("zero-link directory not empty"));
            }
        }
        table.remove(*ino);
    }
    Ok(())
}

impl DumpSupport for MemFs {
    fn dump_size(&self) -> Result<u64, FsError> {
        let st = &*self.lock();
        Ok(image_size(st))
    }

    fn dump(&self, w: &mut dyn Write) -> Result<(), FsError> {
        let st = &*self.lock();
        dump_impl(st, w)
    }

    fn load(params: &FsParams, r: &mut dyn Read) -> Result<MemFs, FsError> {
        load_impl(params, r)
    }
}
