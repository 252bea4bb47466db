//! Shared plumbing of the CLI commands: building the manager, loading every
//! test list, and resolving label paths to test items.

use anyhow::{bail, Result};
use colored::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::adapter::AdapterOptions;
use crate::core::host::{DebugLauncher, TestRunFactory};
use crate::core::item::{TestItem, TestItemKind};
use crate::core::manager::{AdapterManager, HostServices};
use crate::core::models::WorkspaceFolder;
use crate::infra::logger::{Logger, Notifier};
use crate::infra::t;

/// Options every command shares.
#[derive(Debug, Clone)]
pub struct CliOptions {
    pub workspaces: Vec<PathBuf>,
    pub active_file: Option<PathBuf>,
    pub verbose: u8,
}

impl CliOptions {
    pub fn folders(&self) -> Vec<WorkspaceFolder> {
        self.workspaces
            .iter()
            .enumerate()
            .map(|(index, path)| WorkspaceFolder::new(path, index))
            .collect()
    }
}

/// Prints user-facing errors in red and counts them for the exit code.
#[derive(Debug, Default)]
pub struct CliNotifier {
    errors: AtomicUsize,
}

impl CliNotifier {
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

impl Notifier for CliNotifier {
    fn show_error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        eprintln!("{}", message.red().bold());
    }
}

/// A manager over the CLI's workspace folders.
pub struct Session {
    pub manager: AdapterManager,
    pub notifier: Arc<CliNotifier>,
}

impl Session {
    pub fn new(
        options: &CliOptions,
        run_factory: Arc<dyn TestRunFactory>,
        debug_launcher: Arc<dyn DebugLauncher>,
        watch: bool,
    ) -> Self {
        let notifier = Arc::new(CliNotifier::default());
        let services = HostServices {
            run_factory,
            debug_launcher,
            active_file: options.active_file.clone(),
            adapter_options: AdapterOptions {
                watch,
                ..AdapterOptions::default()
            },
            log: Logger::new(notifier.clone()),
        };
        Self {
            manager: AdapterManager::new(options.folders(), services),
            notifier,
        }
    }

    /// Loads every adapter and resolves every executable's test list.
    pub async fn load_all(&self) {
        self.manager.load_tests().await;
        self.load_unresolved().await;
    }

    /// Resolves the executables no one has expanded since their adapter's
    /// last reload.
    pub async fn load_unresolved(&self) {
        for adapter in self.manager.adapters() {
            for exe in adapter.unresolved_executables() {
                self.manager.resolve_handler(Some(exe.item())).await;
            }
        }
    }

    /// Finds the item at `path`: `<executable label>[/suite.../case]`, looked
    /// up across all workspace folders in order.
    pub fn find(&self, path: &str) -> Result<TestItem> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let Some(exe_label) = segments.next() else {
            bail!(t!("select.empty_path").to_string());
        };
        let rest: Vec<&str> = segments.collect();

        for root in self.manager.items().all() {
            for exe in root.children() {
                if exe.kind() != TestItemKind::Executable || exe.label() != exe_label {
                    continue;
                }
                if let Some(item) = descend(&exe, &rest) {
                    return Ok(item);
                }
            }
        }
        bail!(t!("select.not_found", path = path).to_string())
    }

    pub fn dispose(&self) {
        self.manager.dispose();
    }
}

fn descend(item: &TestItem, labels: &[&str]) -> Option<TestItem> {
    let Some((first, rest)) = labels.split_first() else {
        return Some(item.clone());
    };
    item.children()
        .iter()
        .filter(|child| child.label() == *first)
        .find_map(|child| descend(child, rest))
}
