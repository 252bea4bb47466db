//! # Selection Module / 选择模块
//!
//! Helpers that turn a heterogeneous selection of test items into work units:
//! ancestor reduction and grouping by owning adapter or test executable.
//!
//! 将异构的测试项选择转换为工作单元的辅助函数：
//! 祖先归约，以及按所属适配器或测试可执行文件分组。

use indexmap::IndexMap;
use std::hash::Hash;

use crate::core::id::{AdapterId, TestExecutableId};
use crate::core::item::TestItem;

/// A test item handed to a controller.
///
/// `recursive` items were picked by the host; their loaded descendants are
/// already enqueued. Non-recursive items are executable references the
/// adapter synthesised while expanding its root item: the controller resolves
/// the test list first if needed and does the bookkeeping for the descendants
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestItemRef {
    pub item: TestItem,
    pub recursive: bool,
}

impl TestItemRef {
    pub fn new(item: TestItem, recursive: bool) -> Self {
        Self { item, recursive }
    }

    pub fn selected(item: TestItem) -> Self {
        Self::new(item, true)
    }
}

/// Drops every item that has a proper ancestor in `items`, keeping the
/// minimal covering set in the original order.
///
/// Running an ancestor already runs its descendants, so keeping both would
/// launch and report the same cases twice.
pub fn keep_only_ancestors(items: &[TestItem]) -> Vec<TestItem> {
    items
        .iter()
        .filter(|item| !items.iter().any(|other| other.is_ancestor_of(item)))
        .cloned()
        .collect()
}

/// Groups `items` by `key`, preserving first-appearance order of the keys and
/// the relative order of items inside each group.
pub fn group_by<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> IndexMap<K, Vec<T>>
where
    K: Hash + Eq,
    F: FnMut(&T) -> K,
{
    let mut groups: IndexMap<K, Vec<T>> = IndexMap::new();
    for item in items {
        groups.entry(key(&item)).or_default().push(item);
    }
    groups
}

pub fn group_by_adapter(items: Vec<TestItem>) -> IndexMap<AdapterId, Vec<TestItem>> {
    group_by(items, |item| item.id().adapter_id())
}

/// Groups by the `<adapter>/<exe>` prefix of each id.
pub fn group_by_test_exe(items: Vec<TestItemRef>) -> IndexMap<TestExecutableId, Vec<TestItemRef>> {
    group_by(items, |r| r.item.id().test_exe_id())
}
