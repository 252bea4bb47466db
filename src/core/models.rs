//! # Data Models Module / 数据模型模块
//!
//! Plain data shared between the manager, the adapters and the host: workspace
//! folders, run requests and test messages.
//!
//! 管理器、适配器和宿主之间共享的纯数据：工作区文件夹、运行请求和测试消息。

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::item::{SourceLocation, TestItem};

/// A folder opened in the host. One adapter is created per folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFolder {
    /// Display name, the last path component.
    pub name: String,
    /// Canonical absolute path.
    pub path: PathBuf,
    /// Position among the open folders.
    pub index: usize,
}

impl WorkspaceFolder {
    /// Creates a folder entry, canonicalizing `path` when it exists.
    pub fn new(path: impl AsRef<Path>, index: usize) -> Self {
        let path = path.as_ref();
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { name, path, index }
    }
}

/// Folders added to and removed from the host in one change notification.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceFoldersChange {
    pub added: Vec<WorkspaceFolder>,
    pub removed: Vec<WorkspaceFolder>,
}

/// Which kind of profile a request was issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunProfileKind {
    Run,
    Debug,
}

impl fmt::Display for RunProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunProfileKind::Run => f.write_str("run"),
            RunProfileKind::Debug => f.write_str("debug"),
        }
    }
}

/// A request to run or debug tests.
///
/// `include == None` means "everything". A non-empty `exclude` is rejected.
#[derive(Debug, Clone, Default)]
pub struct TestRunRequest {
    pub include: Option<Vec<TestItem>>,
    pub exclude: Option<Vec<TestItem>>,
    pub profile: Option<RunProfileKind>,
}

impl TestRunRequest {
    pub fn run(include: Option<Vec<TestItem>>) -> Self {
        Self {
            include,
            exclude: None,
            profile: Some(RunProfileKind::Run),
        }
    }

    pub fn debug(include: Option<Vec<TestItem>>) -> Self {
        Self {
            include,
            exclude: None,
            profile: Some(RunProfileKind::Debug),
        }
    }

    pub fn has_exclusions(&self) -> bool {
        self.exclude.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Message attached to a failed or errored test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMessage {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl TestMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for TestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}({}): {}", loc.file.display(), loc.line, self.message),
            None => f.write_str(&self.message),
        }
    }
}
