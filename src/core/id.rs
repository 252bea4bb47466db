//! # Identity Scheme Module / 标识方案模块
//!
//! Deterministic, hierarchical identifiers for everything shown in the test
//! tree. An id is a `/`-joined list of segments that encodes the complete
//! ownership chain:
//!
//! ```text
//! <adapter-id>/<test-exe-hash>/<suite>/.../<case>
//! ```
//!
//! The owning adapter and the owning test executable are recovered from the
//! first one and two segments respectively, without any extra index.
//!
//! 测试树中所有节点的确定性分层标识符。标识符由 `/` 连接的段组成，
//! 完整编码了所属关系链。

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Separator between id segments. Never appears inside a segment.
pub const SEPARATOR: char = '/';

/// Returns the lowercase hex SHA-256 digest of `s`.
pub fn string_hash(s: &str) -> String {
    hex::encode(Sha256::digest(s.as_bytes()))
}

/// Identifies one workspace adapter. Derived from the workspace folder's
/// canonical location, so removing and re-adding a folder yields the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterId(String);

impl AdapterId {
    pub fn for_workspace(folder: &Path) -> Self {
        Self(string_hash(&folder.to_string_lossy()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id of the adapter's own root test item.
    pub fn to_item_id(&self) -> TestItemId {
        TestItemId(self.0.clone())
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one test executable, scoped under its adapter:
/// `<adapter-id>/<hash(absolute path)>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestExecutableId(String);

impl TestExecutableId {
    pub fn new(adapter_id: &AdapterId, exe_path: &Path) -> Self {
        Self(format!(
            "{}{}{}",
            adapter_id.as_str(),
            SEPARATOR,
            string_hash(&exe_path.to_string_lossy())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn adapter_id(&self) -> AdapterId {
        AdapterId(first_segments(&self.0, 1).to_string())
    }

    pub fn to_item_id(&self) -> TestItemId {
        TestItemId(self.0.clone())
    }
}

impl fmt::Display for TestExecutableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Id of any node in the test tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestItemId(String);

impl TestItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends one segment. `/` inside `segment` is replaced so that the
    /// segment boundaries stay authoritative.
    pub fn child(&self, segment: &str) -> TestItemId {
        let segment = segment.replace(SEPARATOR, "_");
        TestItemId(format!("{}{}{}", self.0, SEPARATOR, segment))
    }

    /// The owning adapter: the first segment.
    pub fn adapter_id(&self) -> AdapterId {
        AdapterId(first_segments(&self.0, 1).to_string())
    }

    /// The owning test executable: the first two segments.
    pub fn test_exe_id(&self) -> TestExecutableId {
        TestExecutableId(first_segments(&self.0, 2).to_string())
    }

    /// The path of this item relative to its test executable, e.g.
    /// `Suite1/caseA`. Empty for adapter and executable items.
    pub fn test_path(&self) -> &str {
        match self.0.splitn(3, SEPARATOR).nth(2) {
            Some(rest) => rest,
            None => "",
        }
    }

    /// Builds an id from a string produced elsewhere by this scheme.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        TestItemId(raw.into())
    }
}

impl fmt::Display for TestItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&AdapterId> for TestItemId {
    fn from(id: &AdapterId) -> Self {
        id.to_item_id()
    }
}

impl From<&TestExecutableId> for TestItemId {
    fn from(id: &TestExecutableId) -> Self {
        id.to_item_id()
    }
}

/// Returns the prefix of `id` made of its first `n` segments, or all of `id`
/// if it has fewer.
fn first_segments(id: &str, n: usize) -> &str {
    match id.match_indices(SEPARATOR).nth(n - 1) {
        Some((pos, _)) => &id[..pos],
        None => id,
    }
}
