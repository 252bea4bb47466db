//! # File System Operations Module / 文件系统操作模块
//!
//! Glob expansion over a workspace folder, executable checks and source
//! detection.
//!
//! 工作区文件夹上的 glob 展开、可执行文件检查和源文件检测。

use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::core::error::ConfigError;

/// Extensions that mark a workspace as containing C/C++ sources.
const SOURCE_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "h", "hpp"];

/// Directories never descended into while searching.
const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn", "node_modules"];

/// Compiles a workspace-relative glob. `*` does not cross `/`; `**` does.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher, ConfigError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| ConfigError::InvalidGlob {
            pattern: pattern.to_string(),
            source,
        })
}

/// Whether `path` (absolute) matches `matcher` relative to `root`.
pub fn glob_matches(matcher: &GlobMatcher, root: &Path, path: &Path) -> bool {
    match path.strip_prefix(root) {
        Ok(rel) => matcher.is_match(rel),
        Err(_) => false,
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// Every file below `root` matching `matcher`, sorted by path so repeated
/// calls over an unchanged tree return the same list.
pub fn find_files(root: &Path, matcher: &GlobMatcher) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|p| glob_matches(matcher, root, p))
        .collect();
    files.sort();
    files
}

/// Whether the workspace holds at least one C/C++ source or header file.
pub fn contains_sources(root: &Path) -> bool {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .any(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
        })
}

/// The executable files below `root` matching `matcher`, found on the
/// blocking pool.
pub async fn find_executables_in_background(root: PathBuf, matcher: GlobMatcher) -> Vec<PathBuf> {
    tokio::task::spawn_blocking(move || {
        find_files(&root, &matcher)
            .into_iter()
            .filter(|p| is_executable(p))
            .collect()
    })
    .await
    .unwrap_or_default()
}

/// [`contains_sources`] on the blocking pool.
pub async fn contains_sources_in_background(root: PathBuf) -> bool {
    tokio::task::spawn_blocking(move || contains_sources(&root))
        .await
        .unwrap_or(false)
}

/// Whether `path` is a regular file the current user may execute.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Whether `path` is a regular file the current user may execute.
#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file())
}
