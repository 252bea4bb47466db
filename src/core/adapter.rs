//! # Workspace Adapter Module / 工作区适配器模块
//!
//! A [`WorkspaceAdapter`] owns every [`TestExecutable`] of one workspace
//! folder. It rebuilds that set from the configuration on reload, expands
//! host selections into per-executable work, and reacts to file system
//! changes.
//!
//! Reload, run, debug and per-executable resolution all go through one
//! exclusive section, so at most one of them is active per adapter and the
//! rest queue in arrival order. File watchers never touch the adapter
//! directly: they post an [`AdapterEvent`] to the adapter's queue, which a
//! background task debounces and then handles inside the section.
//!
//! 一个 [`WorkspaceAdapter`] 拥有一个工作区文件夹中的所有 [`TestExecutable`]。
//! 重新加载、运行、调试和单个可执行文件解析都经过同一个互斥区。
//! 文件监视器只向适配器的队列投递事件，由后台任务去抖后在互斥区内处理。

use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::config::{self, TestConfig, TestExeSource};
use crate::core::executable::TestExecutable;
use crate::core::host::{skip_covered, DebugLauncher, TestRun};
use crate::core::id::{AdapterId, TestExecutableId};
use crate::core::item::{TestItem, TestItemKind};
use crate::core::models::WorkspaceFolder;
use crate::core::selection::{group_by_test_exe, TestItemRef};
use crate::core::variables::VariableContext;
use crate::infra::fs as infra_fs;
use crate::infra::logger::Logger;
use crate::infra::t;
use crate::infra::watch::{ChangeMask, FileWatcher};

/// Load state of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    Unloaded,
    Loading,
    Loaded,
}

/// Work requested from outside the exclusive section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdapterEvent {
    /// Rebuild everything from the configuration.
    Reload,
    /// Re-list the tests of one executable.
    ResolveTestExe(TestExecutableId),
}

#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Quiet period before a burst of events is handled.
    pub debounce: Duration,
    /// Install file watchers at all.
    pub watch: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            watch: true,
        }
    }
}

type ExecutableMap = IndexMap<TestExecutableId, Arc<TestExecutable>>;

/// State only touched inside the exclusive section.
#[derive(Default)]
struct SectionState {
    default_config_attempted: bool,
}

#[derive(Default)]
struct Watchers {
    /// Configuration file, glob patterns and missing literal paths.
    adapter: Vec<FileWatcher>,
    /// Binaries whose tests have been resolved.
    executables: HashMap<TestExecutableId, FileWatcher>,
}

pub struct WorkspaceAdapter {
    id: AdapterId,
    folder: WorkspaceFolder,
    ctx: VariableContext,
    options: AdapterOptions,
    item: TestItem,
    section: tokio::sync::Mutex<SectionState>,
    executables: RwLock<Arc<ExecutableMap>>,
    watchers: Mutex<Watchers>,
    /// Executables resolved since the last reload.
    resolved: Mutex<HashSet<TestExecutableId>>,
    status: Mutex<AdapterStatus>,
    cancelled: AtomicBool,
    events: mpsc::UnboundedSender<AdapterEvent>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    generation: watch::Sender<u64>,
    log: Logger,
}

impl WorkspaceAdapter {
    /// Creates the adapter of `ctx.workspace_folder` and starts its event
    /// task. Must be called inside a tokio runtime.
    pub fn new(ctx: VariableContext, options: AdapterOptions, log: &Logger) -> Arc<Self> {
        let folder = ctx.workspace_folder.clone();
        let id = AdapterId::for_workspace(&folder.path);
        let item = TestItem::new(
            id.to_item_id(),
            folder.name.clone(),
            TestItemKind::Workspace,
            Some(folder.path.clone()),
            None,
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let (generation, _) = watch::channel(0);

        let adapter = Arc::new(Self {
            log: log.scoped(&folder.name),
            id,
            folder,
            ctx,
            options,
            item,
            section: tokio::sync::Mutex::new(SectionState::default()),
            executables: RwLock::new(Arc::new(IndexMap::new())),
            watchers: Mutex::new(Watchers::default()),
            resolved: Mutex::new(HashSet::new()),
            status: Mutex::new(AdapterStatus::Unloaded),
            cancelled: AtomicBool::new(false),
            events: tx,
            event_task: Mutex::new(None),
            shutdown: CancellationToken::new(),
            generation,
        });

        let task = tokio::spawn(event_loop(
            Arc::downgrade(&adapter),
            rx,
            adapter.shutdown.clone(),
            adapter.options.debounce,
        ));
        *adapter.event_task.lock() = Some(task);
        adapter
    }

    pub fn id(&self) -> &AdapterId {
        &self.id
    }

    pub fn folder(&self) -> &WorkspaceFolder {
        &self.folder
    }

    /// The adapter's root test item.
    pub fn item(&self) -> &TestItem {
        &self.item
    }

    pub fn status(&self) -> AdapterStatus {
        *self.status.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Current controllers, in configuration order.
    pub fn test_executables(&self) -> Vec<Arc<TestExecutable>> {
        self.snapshot().values().cloned().collect()
    }

    pub fn test_executable(&self, id: &TestExecutableId) -> Option<Arc<TestExecutable>> {
        self.snapshot().get(id).cloned()
    }

    /// Controllers whose tests have not been resolved since the last reload.
    pub fn unresolved_executables(&self) -> Vec<Arc<TestExecutable>> {
        let resolved = self.resolved.lock();
        self.snapshot()
            .values()
            .filter(|exe| !resolved.contains(exe.id()))
            .cloned()
            .collect()
    }

    /// Receiver that ticks after every reload or resolution.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Queues `event` for the adapter's event task.
    pub fn post(&self, event: AdapterEvent) {
        // The receiver is gone only after dispose.
        let _ = self.events.send(event);
    }

    fn snapshot(&self) -> Arc<ExecutableMap> {
        Arc::clone(&self.executables.read())
    }

    fn bump_generation(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    /// Rebuilds the controller set from the configuration.
    pub async fn reload(&self) {
        let mut state = self.section.lock().await;
        self.reload_locked(&mut state).await;
    }

    async fn reload_locked(&self, state: &mut SectionState) {
        *self.status.lock() = AdapterStatus::Loading;
        self.log.info(t!("adapter.reloading", folder = self.folder.path.display()));

        {
            let mut watchers = self.watchers.lock();
            watchers.adapter.clear();
            watchers.executables.clear();
        }
        self.resolved.lock().clear();
        let previous = std::mem::replace(&mut *self.executables.write(), Arc::new(IndexMap::new()));
        for exe in previous.values() {
            exe.cancel_tests();
        }
        self.item.replace_children(Vec::new());

        let config_path = config::config_path(&self.folder.path);
        self.watch_path(config_path, ChangeMask::ALL);

        let config = match self.load_config(state).await {
            Some(config) => config,
            None => TestConfig::default(),
        };

        let mut executables: ExecutableMap = IndexMap::new();
        for entry in config.entries {
            let binaries: Vec<PathBuf> = match &entry.source {
                TestExeSource::Glob(pattern) => {
                    let matcher = match infra_fs::compile_glob(pattern) {
                        Ok(matcher) => matcher,
                        Err(e) => {
                            self.log.error(e, true);
                            continue;
                        }
                    };
                    if self.watching() {
                        let tx = self.events.clone();
                        match FileWatcher::watch_glob(
                            &self.folder.path,
                            pattern,
                            matcher.clone(),
                            ChangeMask::CREATE_DELETE,
                            move |_, _| {
                                let _ = tx.send(AdapterEvent::Reload);
                            },
                        ) {
                            Ok(w) => self.watchers.lock().adapter.push(w),
                            Err(e) => self.log.warn(e),
                        }
                    }
                    infra_fs::find_executables_in_background(self.folder.path.clone(), matcher)
                        .await
                }
                TestExeSource::Path(path) => {
                    if infra_fs::is_executable(path) {
                        vec![path.clone()]
                    } else {
                        self.log.warn(t!("adapter.missing_executable", path = path.display()));
                        self.watch_path(path.clone(), ChangeMask::CREATE_DELETE);
                        Vec::new()
                    }
                }
            };

            for binary in binaries {
                let exe = TestExecutable::new(
                    &self.id,
                    entry.for_binary(binary.clone()),
                    binary,
                    self.folder.path.clone(),
                    &self.log,
                );
                if executables.contains_key(exe.id()) {
                    self.log.debug(t!("adapter.duplicate_executable", path = exe.path().display()));
                    continue;
                }
                executables.insert(exe.id().clone(), Arc::new(exe));
            }
        }

        self.item
            .replace_children(executables.values().map(|e| e.item().clone()).collect());
        self.log.info(t!("adapter.loaded", count = executables.len()));
        *self.executables.write() = Arc::new(executables);
        *self.status.lock() = AdapterStatus::Loaded;
        self.bump_generation();
    }

    /// Reads the configuration, writing the default file once when there is
    /// none and the folder holds C/C++ sources. `None` means the
    /// configuration was rejected.
    async fn load_config(&self, state: &mut SectionState) -> Option<TestConfig> {
        let config = match config::load_config(&self.ctx, &self.log).await {
            Ok(config) => config,
            Err(e) => {
                self.log.error(t!("adapter.config_error", error = e), true);
                return None;
            }
        };
        if !config.is_empty() || state.default_config_attempted {
            return Some(config);
        }
        state.default_config_attempted = true;
        match config::create_default_config(&self.folder.path, &self.log).await {
            Ok(true) => match config::load_config(&self.ctx, &self.log).await {
                Ok(config) => Some(config),
                Err(e) => {
                    self.log.error(t!("adapter.config_error", error = e), true);
                    None
                }
            },
            Ok(false) => Some(config),
            Err(e) => {
                self.log.error(e, true);
                Some(config)
            }
        }
    }

    fn watching(&self) -> bool {
        self.options.watch && !self.shutdown.is_cancelled()
    }

    /// Watches `path` and posts a reload on any change `mask` accepts.
    fn watch_path(&self, path: PathBuf, mask: ChangeMask) {
        if !self.watching() {
            return;
        }
        let tx = self.events.clone();
        match FileWatcher::watch_path(&path, mask, move |_, _| {
            let _ = tx.send(AdapterEvent::Reload);
        }) {
            Ok(w) => self.watchers.lock().adapter.push(w),
            Err(e) => self.log.warn(e),
        }
    }

    /// Lists the tests of one executable and starts watching its binary.
    pub async fn resolve_test_exe_tests(&self, id: &TestExecutableId) {
        let _state = self.section.lock().await;
        let Some(exe) = self.test_executable(id) else {
            self.log.bug(t!("adapter.unknown_executable", id = id));
            return;
        };

        if self.watching() && !self.watchers.lock().executables.contains_key(id) {
            let tx = self.events.clone();
            let exe_id = id.clone();
            match FileWatcher::watch_path(exe.path(), ChangeMask::ALL, move |_, _| {
                let _ = tx.send(AdapterEvent::ResolveTestExe(exe_id.clone()));
            }) {
                Ok(w) => {
                    self.watchers.lock().executables.insert(id.clone(), w);
                }
                Err(e) => self.log.warn(e),
            }
        }

        self.resolved.lock().insert(id.clone());
        if let Err(e) = exe.load_tests().await {
            self.log.error(e, true);
        }
        self.bump_generation();
    }

    /// Expands the adapter's root item into every executable and wraps host
    /// selections as recursive references.
    fn expand(&self, items: &[TestItem], executables: &ExecutableMap) -> Vec<TestItemRef> {
        let mut refs = Vec::new();
        for item in items {
            if item.id() == self.item.id() {
                refs.extend(
                    executables
                        .values()
                        .map(|exe| TestItemRef::new(exe.item().clone(), false)),
                );
            } else if item.id().adapter_id() == self.id {
                refs.push(TestItemRef::selected(item.clone()));
            } else {
                self.log.bug(t!("adapter.foreign_item", id = item.id()));
            }
        }
        refs
    }

    /// Runs `items`, one batch per executable, until cancelled.
    pub async fn run(&self, run: &dyn TestRun, items: &[TestItem], token: &CancellationToken) {
        let _state = self.section.lock().await;
        self.cancelled.store(false, Ordering::SeqCst);
        let executables = self.snapshot();
        for exe in executables.values() {
            exe.reset_cancellation();
        }

        let groups = group_by_test_exe(self.expand(items, &executables));
        for (exe_id, group) in groups {
            if self.is_cancelled() || token.is_cancelled() {
                for r in &group {
                    skip_covered(run, &r.item);
                }
                continue;
            }
            let Some(exe) = executables.get(&exe_id) else {
                self.log.bug(t!("adapter.unknown_executable", id = exe_id));
                continue;
            };
            if let Err(e) = exe.run_tests(run, &group).await {
                self.log.error(e, false);
            }
        }
    }

    /// Debugs `items`, which must all belong to one executable.
    pub async fn debug(&self, launcher: &dyn DebugLauncher, items: &[TestItem]) {
        let _state = self.section.lock().await;
        let executables = self.snapshot();
        let groups = group_by_test_exe(self.expand(items, &executables));
        if groups.len() > 1 {
            self.log.error(t!("adapter.debug_multiple"), true);
            return;
        }
        let Some((exe_id, group)) = groups.into_iter().next() else {
            return;
        };
        let Some(exe) = executables.get(&exe_id) else {
            self.log.bug(t!("adapter.unknown_executable", id = exe_id));
            return;
        };
        if let Err(e) = exe.debug_tests(launcher, &group).await {
            self.log.error(e, true);
        }
    }

    /// Stops dispatching further batches and kills running processes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        for exe in self.snapshot().values() {
            exe.cancel_tests();
        }
    }

    /// Cancels everything, stops the event task and drops all watchers.
    pub fn dispose(&self) {
        self.cancel();
        self.shutdown.cancel();
        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
        let mut watchers = self.watchers.lock();
        watchers.adapter.clear();
        watchers.executables.clear();
    }
}

impl Drop for WorkspaceAdapter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for WorkspaceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceAdapter")
            .field("id", &self.id)
            .field("folder", &self.folder.path)
            .finish_non_exhaustive()
    }
}

/// Drains the adapter's queue. Events arriving within `debounce` of each
/// other are handled together; a reload subsumes any resolution.
async fn event_loop(
    adapter: Weak<WorkspaceAdapter>,
    mut rx: mpsc::UnboundedReceiver<AdapterEvent>,
    shutdown: CancellationToken,
    debounce: Duration,
) {
    loop {
        let first = tokio::select! {
            _ = shutdown.cancelled() => return,
            event = rx.recv() => match event {
                Some(event) => event,
                None => return,
            },
        };

        let mut batch: IndexSet<AdapterEvent> = IndexSet::new();
        batch.insert(first);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(debounce) => break,
                event = rx.recv() => match event {
                    Some(event) => {
                        batch.insert(event);
                    }
                    None => break,
                },
            }
        }

        let Some(adapter) = adapter.upgrade() else {
            return;
        };
        if batch.contains(&AdapterEvent::Reload) {
            adapter.reload().await;
            continue;
        }
        for event in batch {
            if let AdapterEvent::ResolveTestExe(id) = event {
                adapter.resolve_test_exe_tests(&id).await;
            }
        }
    }
}
