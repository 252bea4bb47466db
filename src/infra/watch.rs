//! # File Watching Module / 文件监视模块
//!
//! Thin wrappers over `notify` for the two kinds of watches the adapter
//! needs: one exact path (a test binary, the configuration file) and a glob
//! over a workspace folder. A watcher stops when it is dropped.
//!
//! 基于 `notify` 的轻量封装，提供两种监视：精确路径和工作区上的 glob。
//! 监视器在被 drop 时停止。

use globset::GlobMatcher;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::error::WatchError;
use crate::infra::fs::glob_matches;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChange {
    Created,
    Changed,
    Deleted,
}

/// Which changes a watcher reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeMask {
    pub created: bool,
    pub changed: bool,
    pub deleted: bool,
}

impl ChangeMask {
    pub const ALL: ChangeMask = ChangeMask {
        created: true,
        changed: true,
        deleted: true,
    };

    pub const CREATE_DELETE: ChangeMask = ChangeMask {
        created: true,
        changed: false,
        deleted: true,
    };

    pub fn accepts(&self, change: FileChange) -> bool {
        match change {
            FileChange::Created => self.created,
            FileChange::Changed => self.changed,
            FileChange::Deleted => self.deleted,
        }
    }
}

/// Maps a raw `notify` event to per-path changes. Renames count as a delete
/// of the old name and a create of the new one.
pub fn changes(event: &Event) -> Vec<(FileChange, PathBuf)> {
    let all = |change: FileChange| -> Vec<(FileChange, PathBuf)> {
        event.paths.iter().map(|p| (change, p.clone())).collect()
    };
    match &event.kind {
        EventKind::Create(_) => all(FileChange::Created),
        EventKind::Remove(_) => all(FileChange::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(FileChange::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(FileChange::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                (FileChange::Deleted, from.clone()),
                (FileChange::Created, to.clone()),
            ],
            _ => all(FileChange::Changed),
        },
        EventKind::Modify(_) => all(FileChange::Changed),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => all(FileChange::Changed),
        _ => Vec::new(),
    }
}

/// A live file system watch. Dropping it stops the watch.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    description: String,
}

impl FileWatcher {
    /// Watches the single file `path`, which does not need to exist yet.
    ///
    /// The nearest existing ancestor directory is watched and events are
    /// filtered down to `path`.
    pub fn watch_path<F>(path: &Path, mask: ChangeMask, on_change: F) -> Result<Self, WatchError>
    where
        F: Fn(FileChange, &Path) + Send + 'static,
    {
        let (dir, mode) = watch_root_for(path)?;
        let target = canonical_target(path, &dir);

        let watched = target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            for (change, p) in changes(&event) {
                if p == watched && mask.accepts(change) {
                    on_change(change, &p);
                }
            }
        })
        .map_err(|source| WatchError::Notify {
            path: path.to_path_buf(),
            source,
        })?;
        watcher
            .watch(&dir, mode)
            .map_err(|source| WatchError::Notify {
                path: dir.clone(),
                source,
            })?;

        Ok(Self {
            _watcher: watcher,
            description: target.display().to_string(),
        })
    }

    /// Watches every file below `root` whose workspace-relative path matches
    /// `matcher`.
    pub fn watch_glob<F>(
        root: &Path,
        pattern: &str,
        matcher: GlobMatcher,
        mask: ChangeMask,
        on_change: F,
    ) -> Result<Self, WatchError>
    where
        F: Fn(FileChange, &Path) + Send + 'static,
    {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let base = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            for (change, p) in changes(&event) {
                if mask.accepts(change) && glob_matches(&matcher, &base, &p) {
                    on_change(change, &p);
                }
            }
        })
        .map_err(|source| WatchError::Notify {
            path: root.clone(),
            source,
        })?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Notify {
                path: root.clone(),
                source,
            })?;

        Ok(Self {
            _watcher: watcher,
            description: format!("{}/{}", root.display(), pattern),
        })
    }
}

impl fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatcher")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// The directory to hand to `notify` for `path`: its parent when that exists
/// (non-recursive), otherwise the nearest existing ancestor (recursive).
fn watch_root_for(path: &Path) -> Result<(PathBuf, RecursiveMode), WatchError> {
    let parent = path
        .parent()
        .ok_or_else(|| WatchError::NoParent(path.to_path_buf()))?;
    if parent.is_dir() {
        let dir = std::fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
        return Ok((dir, RecursiveMode::NonRecursive));
    }
    let ancestor = parent
        .ancestors()
        .find(|a| a.is_dir())
        .ok_or_else(|| WatchError::NoParent(path.to_path_buf()))?;
    let dir = std::fs::canonicalize(ancestor).unwrap_or_else(|_| ancestor.to_path_buf());
    Ok((dir, RecursiveMode::Recursive))
}

/// Rebuilds `path` on top of the canonical watched directory so it compares
/// equal to the paths `notify` reports.
fn canonical_target(path: &Path, watched_dir: &Path) -> PathBuf {
    let Some(parent) = path.parent() else {
        return path.to_path_buf();
    };
    let canonical_parent = std::fs::canonicalize(parent).ok();
    match (canonical_parent, path.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => {
            // The parent does not exist yet: keep the tail below the watched
            // ancestor.
            let tail = parent
                .ancestors()
                .find_map(|a| {
                    std::fs::canonicalize(a)
                        .ok()
                        .filter(|c| c == watched_dir)
                        .and_then(|_| path.strip_prefix(a).ok())
                })
                .map(Path::to_path_buf);
            match tail {
                Some(tail) => watched_dir.join(tail),
                None => path.to_path_buf(),
            }
        }
    }
}
