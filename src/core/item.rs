//! # Test Item Module / 测试项模块
//!
//! The in-process test tree. A [`TestItem`] is a cheap, clonable handle to a
//! node; nodes know their parent (weakly) and own an ordered list of children.
//! The orchestration core only needs identity, parent-chain traversal and
//! child replacement, which is exactly what this module offers.
//!
//! 进程内测试树。[`TestItem`] 是一个廉价可克隆的节点句柄；
//! 节点（弱）引用其父节点并拥有有序的子节点列表。

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::core::id::TestItemId;

/// The level of a node in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestItemKind {
    Workspace,
    Executable,
    Suite,
    Case,
}

/// A position in a source file, as reported by the test binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
}

struct ItemNode {
    id: TestItemId,
    label: String,
    kind: TestItemKind,
    uri: Option<PathBuf>,
    location: Option<SourceLocation>,
    parent: RwLock<Weak<ItemNode>>,
    children: RwLock<Vec<TestItem>>,
}

/// Handle to one node of the test tree. Equality is node identity.
#[derive(Clone)]
pub struct TestItem {
    node: Arc<ItemNode>,
}

impl TestItem {
    pub fn new(
        id: TestItemId,
        label: impl Into<String>,
        kind: TestItemKind,
        uri: Option<PathBuf>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self {
            node: Arc::new(ItemNode {
                id,
                label: label.into(),
                kind,
                uri,
                location,
                parent: RwLock::new(Weak::new()),
                children: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &TestItemId {
        &self.node.id
    }

    pub fn label(&self) -> &str {
        &self.node.label
    }

    pub fn kind(&self) -> TestItemKind {
        self.node.kind
    }

    /// The file this item stands for (workspace folder or binary).
    pub fn uri(&self) -> Option<&Path> {
        self.node.uri.as_deref()
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.node.location.as_ref()
    }

    pub fn parent(&self) -> Option<TestItem> {
        self.node.parent.read().upgrade().map(|node| TestItem { node })
    }

    /// Snapshot of the direct children, in insertion order.
    pub fn children(&self) -> Vec<TestItem> {
        self.node.children.read().clone()
    }

    pub fn child_count(&self) -> usize {
        self.node.children.read().len()
    }

    /// Adds `child`, replacing an existing child with the same id.
    pub fn add_child(&self, child: TestItem) {
        *child.node.parent.write() = Arc::downgrade(&self.node);
        let mut children = self.node.children.write();
        match children.iter_mut().find(|c| c.id() == child.id()) {
            Some(slot) => {
                if !slot.ptr_eq(&child) {
                    *slot.node.parent.write() = Weak::new();
                }
                *slot = child;
            }
            None => children.push(child),
        }
    }

    /// Replaces all children at once. Detached children lose their parent.
    pub fn replace_children(&self, new_children: Vec<TestItem>) {
        for child in &new_children {
            *child.node.parent.write() = Arc::downgrade(&self.node);
        }
        let old = std::mem::replace(&mut *self.node.children.write(), new_children);
        for child in old {
            if !self.node.children.read().iter().any(|c| c.ptr_eq(&child)) {
                *child.node.parent.write() = Weak::new();
            }
        }
    }

    pub fn ptr_eq(&self, other: &TestItem) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// `true` if `self` is a proper ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &TestItem) -> bool {
        let mut current = other.parent();
        while let Some(item) = current {
            if item.ptr_eq(self) {
                return true;
            }
            current = item.parent();
        }
        false
    }

    /// All descendants in pre-order, not including `self`.
    pub fn descendants(&self) -> Vec<TestItem> {
        let mut out = Vec::new();
        let mut stack: Vec<TestItem> = self.children().into_iter().rev().collect();
        while let Some(item) = stack.pop() {
            stack.extend(item.children().into_iter().rev());
            out.push(item);
        }
        out
    }

    /// The test cases covered by this item: itself if it is a case, otherwise
    /// every case below it.
    pub fn cases(&self) -> Vec<TestItem> {
        if self.kind() == TestItemKind::Case {
            return vec![self.clone()];
        }
        self.descendants()
            .into_iter()
            .filter(|item| item.kind() == TestItemKind::Case)
            .collect()
    }

    /// Finds the descendant (or self) with `id`, following id prefixes.
    pub fn find(&self, id: &TestItemId) -> Option<TestItem> {
        if self.id() == id {
            return Some(self.clone());
        }
        let wanted = id.as_str();
        self.children().into_iter().find_map(|child| {
            let prefix = child.id().as_str();
            let on_path = wanted == prefix
                || (wanted.starts_with(prefix)
                    && wanted[prefix.len()..].starts_with(crate::core::id::SEPARATOR));
            if on_path { child.find(id) } else { None }
        })
    }

    pub fn snapshot(&self) -> TestItemSnapshot {
        TestItemSnapshot {
            id: self.id().to_string(),
            label: self.label().to_string(),
            kind: self.kind(),
            uri: self.node.uri.clone(),
            location: self.node.location.clone(),
            children: self.children().iter().map(TestItem::snapshot).collect(),
        }
    }
}

impl PartialEq for TestItem {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TestItem {}

impl fmt::Debug for TestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestItem")
            .field("id", &self.node.id)
            .field("label", &self.node.label)
            .field("kind", &self.node.kind)
            .finish_non_exhaustive()
    }
}

/// Serializable copy of a subtree, used by `list --json`.
#[derive(Debug, Clone, Serialize)]
pub struct TestItemSnapshot {
    pub id: String,
    pub label: String,
    pub kind: TestItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TestItemSnapshot>,
}

/// The top-level item collection of the host.
#[derive(Debug, Clone, Default)]
pub struct TestItemCollection {
    items: Arc<RwLock<Vec<TestItem>>>,
}

impl TestItemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `item`, replacing an existing item with the same id.
    pub fn add(&self, item: TestItem) {
        let mut items = self.items.write();
        match items.iter_mut().find(|i| i.id() == item.id()) {
            Some(slot) => *slot = item,
            None => items.push(item),
        }
    }

    pub fn remove(&self, id: &TestItemId) -> Option<TestItem> {
        let mut items = self.items.write();
        let pos = items.iter().position(|i| i.id() == id)?;
        Some(items.remove(pos))
    }

    pub fn all(&self) -> Vec<TestItem> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}
