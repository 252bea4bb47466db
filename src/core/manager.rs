//! # Adapter Manager Module / 适配器管理器模块
//!
//! The [`AdapterManager`] keeps one [`WorkspaceAdapter`] per open workspace
//! folder and fans run and debug requests out to them. It is an explicit
//! context object: the host constructs it and passes it around by reference.
//!
//! [`AdapterManager`] 为每个打开的工作区文件夹维护一个 [`WorkspaceAdapter`]，
//! 并将运行和调试请求分发给它们。

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::adapter::{AdapterOptions, WorkspaceAdapter};
use crate::core::host::{skip_covered, DebugLauncher, TestRun, TestRunFactory};
use crate::core::id::AdapterId;
use crate::core::item::{TestItem, TestItemCollection, TestItemKind};
use crate::core::models::{RunProfileKind, TestRunRequest, WorkspaceFolder, WorkspaceFoldersChange};
use crate::core::selection::{group_by_adapter, keep_only_ancestors};
use crate::core::variables::VariableContext;
use crate::infra::logger::Logger;
use crate::infra::t;

/// What the host provides to the core.
#[derive(Clone)]
pub struct HostServices {
    pub run_factory: Arc<dyn TestRunFactory>,
    pub debug_launcher: Arc<dyn DebugLauncher>,
    /// The file currently active in the host, for `${file}` and friends.
    pub active_file: Option<PathBuf>,
    pub adapter_options: AdapterOptions,
    pub log: Logger,
}

pub struct AdapterManager {
    services: HostServices,
    items: TestItemCollection,
    folders: Mutex<Vec<WorkspaceFolder>>,
    adapters: Mutex<IndexMap<AdapterId, Arc<WorkspaceAdapter>>>,
}

impl AdapterManager {
    /// Creates one adapter per folder. Must be called inside a tokio runtime.
    pub fn new(folders: Vec<WorkspaceFolder>, services: HostServices) -> Self {
        let manager = Self {
            services,
            items: TestItemCollection::new(),
            folders: Mutex::new(folders.clone()),
            adapters: Mutex::new(IndexMap::new()),
        };
        for folder in folders {
            manager.add_adapter(folder);
        }
        manager
    }

    /// Top-level test items, one per loaded adapter.
    pub fn items(&self) -> &TestItemCollection {
        &self.items
    }

    pub fn adapters(&self) -> Vec<Arc<WorkspaceAdapter>> {
        self.adapters.lock().values().cloned().collect()
    }

    pub fn adapter(&self, id: &AdapterId) -> Option<Arc<WorkspaceAdapter>> {
        self.adapters.lock().get(id).cloned()
    }

    fn add_adapter(&self, folder: WorkspaceFolder) -> Option<Arc<WorkspaceAdapter>> {
        let id = AdapterId::for_workspace(&folder.path);
        if self.adapters.lock().contains_key(&id) {
            self.services
                .log
                .debug(t!("manager.duplicate_folder", folder = folder.path.display()));
            return None;
        }
        let ctx = VariableContext::new(folder)
            .with_active_file(self.services.active_file.clone())
            .with_workspace_folders(self.folders.lock().clone());
        let adapter = WorkspaceAdapter::new(ctx, self.services.adapter_options.clone(), &self.services.log);
        self.adapters.lock().insert(id, Arc::clone(&adapter));
        Some(adapter)
    }

    /// Disposes the adapters of removed folders and creates (and loads)
    /// adapters for added ones.
    pub async fn on_workspace_folders_changed(&self, change: WorkspaceFoldersChange) {
        {
            let mut folders = self.folders.lock();
            folders.retain(|f| !change.removed.iter().any(|r| r.path == f.path));
            for added in &change.added {
                if !folders.iter().any(|f| f.path == added.path) {
                    folders.push(added.clone());
                }
            }
        }

        for folder in &change.removed {
            let id = AdapterId::for_workspace(&folder.path);
            let removed = self.adapters.lock().shift_remove(&id);
            if let Some(adapter) = removed {
                adapter.dispose();
                self.items.remove(&id.to_item_id());
            }
        }

        for folder in change.added {
            if let Some(adapter) = self.add_adapter(folder) {
                adapter.reload().await;
                self.items.add(adapter.item().clone());
            }
        }
    }

    /// Loads every adapter in turn and publishes its root item.
    pub async fn load_tests(&self) {
        for adapter in self.adapters() {
            adapter.reload().await;
            self.items.add(adapter.item().clone());
        }
    }

    /// Resolves the children of `item`, or everything for `None`.
    pub async fn resolve_handler(&self, item: Option<&TestItem>) {
        let Some(item) = item else {
            self.load_tests().await;
            return;
        };
        if item.kind() != TestItemKind::Executable {
            return;
        }
        match self.adapter(&item.id().adapter_id()) {
            Some(adapter) => adapter.resolve_test_exe_tests(&item.id().test_exe_id()).await,
            None => self
                .services
                .log
                .bug(t!("manager.unknown_adapter", id = item.id().adapter_id())),
        }
    }

    /// Handles a run or debug request from the host.
    pub async fn run_handler(&self, request: TestRunRequest, token: CancellationToken) {
        let Some(profile) = request.profile else {
            return;
        };
        if request.has_exclusions() {
            self.services.log.error(t!("manager.exclusion_unsupported"), true);
            return;
        }

        let included = match &request.include {
            Some(items) => items.clone(),
            None => self.adapters().iter().map(|a| a.item().clone()).collect(),
        };
        let included = keep_only_ancestors(&included);
        let groups = group_by_adapter(included.clone());

        match profile {
            RunProfileKind::Run => {
                let forwarder = self.spawn_cancel_forwarder(token.clone());
                let run = self.services.run_factory.create_test_run(&request);
                enqueue_test_items(run.as_ref(), &included);
                for (adapter_id, items) in groups {
                    if token.is_cancelled() {
                        for item in &items {
                            skip_covered(run.as_ref(), item);
                        }
                        continue;
                    }
                    let Some(adapter) = self.adapter(&adapter_id) else {
                        self.services
                            .log
                            .bug(t!("manager.unknown_adapter", id = adapter_id));
                        continue;
                    };
                    adapter.run(run.as_ref(), &items, &token).await;
                }
                run.end();
                forwarder.abort();
            }
            RunProfileKind::Debug => {
                for (adapter_id, items) in groups {
                    let Some(adapter) = self.adapter(&adapter_id) else {
                        self.services
                            .log
                            .bug(t!("manager.unknown_adapter", id = adapter_id));
                        continue;
                    };
                    adapter
                        .debug(self.services.debug_launcher.as_ref(), &items)
                        .await;
                }
            }
        }
    }

    /// Cancels every adapter once `token` fires.
    fn spawn_cancel_forwarder(&self, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        let adapters = self.adapters();
        tokio::spawn(async move {
            token.cancelled().await;
            for adapter in adapters {
                adapter.cancel();
            }
        })
    }

    /// Disposes every adapter.
    pub fn dispose(&self) {
        let adapters: Vec<_> = self.adapters.lock().drain(..).map(|(_, a)| a).collect();
        for adapter in adapters {
            adapter.dispose();
        }
    }
}

impl std::fmt::Debug for AdapterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterManager")
            .field("adapters", &self.adapters.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Marks `items` and all their loaded descendants as enqueued.
fn enqueue_test_items(run: &dyn TestRun, items: &[TestItem]) {
    for item in items {
        run.enqueued(item);
        for descendant in item.descendants() {
            run.enqueued(&descendant);
        }
    }
}
