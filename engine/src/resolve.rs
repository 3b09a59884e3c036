//! Path resolution.
//!
//! A resolve walks a path component by component from its starting
//! directory (root for absolute paths, the caller-supplied directory
//! otherwise), requiring every traversed directory to grant search
//! permission. Symlinks met along the way are followed through their stored
//! resolved target, all follows drawing on one shared budget. The terminal
//! component is special: the caller chooses whether to follow it, and even
//! when it does not exist the walk succeeds with the parent directory and
//! the dangling name, which is what the create-class operations need.

use crate::error::FsError;
use crate::inode::ROOT_INO;
use crate::table::InodeTable;
use memvfs_api::types::FsParams;
use relative_path::RelativePath;

/// The outcome of a resolve: the terminal inode when it exists, and always
/// the directory that holds (or would hold) it plus the terminal name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The terminal inode, if present.
    pub ino: Option<u64>,
    /// The last directory traversed.
    pub dir: u64,
    /// The terminal component; `/` when the path named the root.
    pub name: String,
    /// Whether a trailing slash demanded a directory.
    pub dir_required: bool,
}

impl Resolved {
    /// The terminal inode, or `ENOENT`.
    pub fn node(&self) -> Result<u64, FsError> {
        self.ino.ok_or(FsError::NotFound)
    }
}

fn bump(budget: &mut u64, params: &FsParams) -> Result<(), FsError> {
    *budget += 1;
    if *budget >= params.follow_max {
        return Err(FsError::Loop);
    }
    Ok(())
}

/// A directory about to be searched must be one and must grant execute.
fn check_search(table: &InodeTable, ino: u64) -> Result<(), FsError> {
    let node = table.get(ino)?;
    if !node.is_dir() {
        return Err(FsError::NotDir);
    }
    if !node.grants(0o1) {
        return Err(FsError::Access);
    }
    Ok(())
}

/// Walk `path` from `start`, sharing `budget` across every symlink followed.
pub fn resolve(
    table: &InodeTable,
    params: &FsParams,
    start: u64,
    path: &str,
    follow_terminal: bool,
    budget: &mut u64,
) -> Result<Resolved, FsError> {
    if path.is_empty() {
        return Err(FsError::NotFound);
    }
    if path.len() as u64 >= params.path_max {
        return Err(FsError::NameTooLong);
    }
    if path.contains('\0') {
        return Err(FsError::Invalid("NUL byte in path"));
    }

    let mut cur = if path.starts_with('/') { ROOT_INO } else { start };
    let comps: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    let trailing = path.ends_with('/');

    let (last, walk) = match comps.split_last() {
        // Nothing but slashes: the root itself.
        None => {
            return Ok(Resolved {
                ino: Some(ROOT_INO),
                dir: ROOT_INO,
                name: "/".to_string(),
                dir_required: true,
            });
        }
        Some((last, walk)) => (*last, walk),
    };

    for comp in walk {
        if comp.len() as u64 > params.name_max {
            return Err(FsError::NameTooLong);
        }
        check_search(table, cur)?;
        let child = match table.get(cur)?.dir()?.find(comp) {
            Some(d) => d.ino,
            None => return Err(FsError::NotFound),
        };
        let node = table.get(child)?;
        cur = if node.is_dir() {
            child
        } else if node.is_symlink() {
            let target = node.link()?.resolved.clone();
            bump(budget, params)?;
            let sub = resolve(table, params, cur, &target, true, budget)?;
            let sub_ino = sub.node()?;
            if !table.get(sub_ino)?.is_dir() {
                return Err(FsError::NotDir);
            }
            sub_ino
        } else {
            return Err(FsError::NotDir);
        };
    }

    if last.len() as u64 > params.name_max {
        return Err(FsError::NameTooLong);
    }
    check_search(table, cur)?;
    match table.get(cur)?.dir()?.find(last) {
        None => Ok(Resolved {
            ino: None,
            dir: cur,
            name: last.to_string(),
            dir_required: trailing,
        }),
        Some(d) => {
            let child = d.ino;
            let node = table.get(child)?;
            if node.is_symlink() && (follow_terminal || trailing) {
                let target = node.link()?.resolved.clone();
                bump(budget, params)?;
                let sub = resolve(table, params, cur, &target, true, budget)?;
                if trailing && !table.get(sub.node()?)?.is_dir() {
                    return Err(FsError::NotDir);
                }
                return Ok(sub);
            }
            if trailing && !node.is_dir() {
                return Err(FsError::NotDir);
            }
            Ok(Resolved {
                ino: Some(child),
                dir: cur,
                name: last.to_string(),
                dir_required: trailing,
            })
        }
    }
}

/// Textual normalization of `path` against the absolute directory `base`:
/// the absolute form with `.`/`..` folded away and `..` clamped at the
/// root. Used for the cwd string and for pinning a symlink target to its
/// creation-time cwd.
pub fn absolutize(base: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        RelativePath::new(path.trim_start_matches('/')).normalize()
    } else {
        RelativePath::new(base.trim_start_matches('/'))
            .join(path)
            .normalize()
    };
    let mut comps: Vec<&str> = joined
        .as_str()
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    while comps.first() == Some(&"..") {
        comps.remove(0);
    }
    format!("/{}", comps.join("/"))
}
