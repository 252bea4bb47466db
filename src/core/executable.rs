//! # Test Executable Module / 测试可执行文件模块
//!
//! A [`TestExecutable`] owns one Boost.Test binary: it lists the binary's
//! tests into a subtree of test items, runs or debugs a selection of them,
//! and kills the in-flight process on cancellation.
//!
//! 每个 [`TestExecutable`] 拥有一个 Boost.Test 二进制文件：将其测试列出为测试项子树，
//! 运行或调试所选测试，并在取消时终止正在运行的进程。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::boost::{self, RunEvent, TestNode};
use crate::core::config::TestExeEntry;
use crate::core::error::ExecutionError;
use crate::core::host::{DebugLauncher, DebugSession, TestRun};
use crate::core::id::{AdapterId, TestExecutableId, TestItemId};
use crate::core::item::{SourceLocation, TestItem, TestItemKind};
use crate::core::models::TestMessage;
use crate::core::selection::TestItemRef;
use crate::infra::command::{self, CapturedOutput};
use crate::infra::fs::is_executable;
use crate::infra::logger::Logger;
use crate::infra::t;

/// Terminal state of one case within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Passed,
    Failed,
    Errored,
    Skipped,
}

/// Controller of one test binary.
pub struct TestExecutable {
    id: TestExecutableId,
    entry: TestExeEntry,
    path: PathBuf,
    workspace: PathBuf,
    item: TestItem,
    loaded: AtomicBool,
    cancelled: AtomicBool,
    stop_token: Mutex<CancellationToken>,
    log: Logger,
}

impl TestExecutable {
    /// Creates the controller for `path`, the binary `entry` resolved to.
    pub fn new(
        adapter_id: &AdapterId,
        entry: TestExeEntry,
        path: PathBuf,
        workspace: PathBuf,
        log: &Logger,
    ) -> Self {
        let id = TestExecutableId::new(adapter_id, &path);
        let label = entry.label.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned())
        });
        let item = TestItem::new(
            id.to_item_id(),
            label,
            TestItemKind::Executable,
            Some(path.clone()),
            None,
        );
        Self {
            log: log.scoped(path.display()),
            id,
            entry,
            path,
            workspace,
            item,
            loaded: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            stop_token: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn id(&self) -> &TestExecutableId {
        &self.id
    }

    pub fn item(&self) -> &TestItem {
        &self.item
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self) -> &TestExeEntry {
        &self.entry
    }

    /// Whether the test list has been loaded successfully at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Lists the binary's tests and replaces the item's children with them.
    ///
    /// On failure the item is left childless.
    pub async fn load_tests(&self) -> Result<(), ExecutionError> {
        let result = self.list_tests().await;
        match result {
            Ok(root) => {
                let children = root
                    .children
                    .iter()
                    .map(|node| self.build_item(self.item.id(), node))
                    .collect();
                self.item.replace_children(children);
                self.loaded.store(true, Ordering::SeqCst);
                self.log.debug(t!(
                    "executable.loaded",
                    count = self.item.cases().len()
                ));
                Ok(())
            }
            Err(e) => {
                self.item.replace_children(Vec::new());
                self.loaded.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn list_tests(&self) -> Result<TestNode, ExecutionError> {
        let output = self.spawn(boost::list_args(), None).await?;
        // Boost.Test prints the list on stdout or stderr depending on version.
        let parsed = boost::parse_list_output(&output.combined());
        match parsed {
            Ok(root) => Ok(root),
            Err(_) if !output.success() => Err(ExecutionError::ListFailed {
                path: self.path.clone(),
                status: output.status_string(),
                stderr: output.stderr,
            }),
            Err(source) => Err(ExecutionError::Parse {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn build_item(&self, parent_id: &TestItemId, node: &TestNode) -> TestItem {
        let id = parent_id.child(&node.name);
        let kind = if node.is_suite() {
            TestItemKind::Suite
        } else {
            TestItemKind::Case
        };
        let location = node.location.as_ref().map(|(file, line)| SourceLocation {
            file: self.resolve_source(Path::new(file)),
            line: *line,
        });
        let item = TestItem::new(id.clone(), node.name.clone(), kind, None, location);
        for child in &node.children {
            item.add_child(self.build_item(&id, child));
        }
        item
    }

    fn resolve_source(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.entry.source_prefix.join(file)
        }
    }

    /// Forgets an earlier cancellation and arms a fresh token for the next
    /// process.
    pub fn reset_cancellation(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        *self.stop_token.lock() = CancellationToken::new();
    }

    /// Cancels the in-flight process, if any. Idempotent.
    pub fn cancel_tests(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.stop_token.lock().cancel();
    }

    /// Runs the cases covered by `items` in one process and reports every
    /// covered case (and every selected suite) to `run`.
    pub async fn run_tests(&self, run: &dyn TestRun, items: &[TestItemRef]) -> Result<(), ExecutionError> {
        if items.iter().any(|r| !r.recursive) && !self.is_loaded() {
            if let Err(e) = self.load_tests().await {
                run.errored(&self.item, vec![TestMessage::new(e.to_string())], None);
                return Err(e);
            }
            for r in items.iter().filter(|r| !r.recursive) {
                for item in r.item.descendants() {
                    run.enqueued(&item);
                }
            }
        }

        let cases = covered_cases(items);
        if self.is_cancelled() {
            for case in &cases {
                run.skipped(case);
            }
            return Ok(());
        }
        if cases.is_empty() {
            for r in items {
                run.skipped(&r.item);
            }
            return Ok(());
        }

        let whole = items.iter().any(|r| r.item.ptr_eq(&self.item));
        let paths: Vec<&str> = if whole {
            Vec::new()
        } else {
            items.iter().map(|r| r.item.id().test_path()).collect()
        };

        for r in items.iter().filter(|r| r.item.kind() != TestItemKind::Case) {
            run.started(&r.item);
        }
        self.log.info(t!("executable.running", count = cases.len()));

        let token = self.stop_token.lock().clone();
        let output = match self.spawn(boost::run_args(&paths), Some(token)).await {
            Ok(output) => output,
            Err(e) => {
                let message = TestMessage::new(e.to_string());
                for case in &cases {
                    run.errored(case, vec![message.clone()], None);
                }
                for r in items.iter().filter(|r| r.item.kind() != TestItemKind::Case) {
                    run.errored(&r.item, vec![message.clone()], None);
                }
                return Err(e);
            }
        };

        run.append_output(&output.combined());
        let outcomes = self.report_results(run, &cases, &output);

        for r in items.iter().filter(|r| r.item.kind() != TestItemKind::Case) {
            report_aggregate(run, &r.item, &outcomes);
        }
        Ok(())
    }

    /// Turns the run log into terminal states for `cases`.
    fn report_results(
        &self,
        run: &dyn TestRun,
        cases: &[TestItem],
        output: &CapturedOutput,
    ) -> HashMap<TestItemId, (Outcome, Option<Duration>)> {
        let by_path: HashMap<&str, &TestItem> = cases
            .iter()
            .map(|case| (case.id().test_path(), case))
            .collect();
        let mut outcomes: HashMap<TestItemId, (Outcome, Option<Duration>)> = HashMap::new();
        let mut unit_errors: Vec<(String, TestMessage)> = Vec::new();

        let mut parser = boost::RunLogParser::new();
        let mut events: Vec<RunEvent> = output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .filter_map(|line| parser.feed(line))
            .collect();
        events.extend(parser.finish());

        let mut settle = |case: &TestItem, outcome: Outcome, duration: Option<Duration>| {
            outcomes.insert(case.id().clone(), (outcome, duration));
        };

        for event in events {
            match event {
                RunEvent::CaseStarted { path } => {
                    if let Some(&case) = by_path.get(path.as_str()) {
                        run.started(case);
                    }
                }
                RunEvent::CaseFinished {
                    path,
                    errors,
                    duration,
                } => {
                    let Some(&case) = by_path.get(path.as_str()) else {
                        self.log.debug(t!("executable.unknown_case", path = path));
                        continue;
                    };
                    if errors.is_empty() {
                        run.passed(case, duration);
                        settle(case, Outcome::Passed, duration);
                    } else {
                        run.failed(case, self.resolve_messages(errors), duration);
                        settle(case, Outcome::Failed, duration);
                    }
                }
                RunEvent::CaseSkipped { path, .. } => {
                    if let Some(&case) = by_path.get(path.as_str()) {
                        run.skipped(case);
                        settle(case, Outcome::Skipped, None);
                    }
                }
                RunEvent::SuiteSkipped { path, .. } => {
                    for case in cases.iter().filter(|c| is_under(c.id().test_path(), &path)) {
                        run.skipped(case);
                        settle(case, Outcome::Skipped, None);
                    }
                }
                RunEvent::UnitError { path, message } => {
                    unit_errors.push((path, message));
                }
                RunEvent::CaseAborted { path, errors } => {
                    if let Some(&case) = by_path.get(path.as_str()) {
                        let mut messages = self.resolve_messages(errors);
                        messages.push(TestMessage::new(t!("executable.case_aborted").to_string()));
                        run.errored(case, messages, None);
                        settle(case, Outcome::Errored, None);
                    }
                }
            }
        }

        let remaining: Vec<&TestItem> = cases
            .iter()
            .filter(|c| !outcomes.contains_key(c.id()))
            .collect();

        if output.was_cancelled {
            for case in remaining {
                run.skipped(case);
                outcomes.insert(case.id().clone(), (Outcome::Skipped, None));
            }
            return outcomes;
        }

        if outcomes.is_empty() && !output.success() {
            let mut messages = vec![TestMessage::new(
                t!("executable.exit_without_results", status = output.status_string()).to_string(),
            )];
            if !output.stderr.trim().is_empty() {
                messages.push(TestMessage::new(output.stderr.trim().to_string()));
            }
            messages.extend(unit_errors.into_iter().map(|(_, m)| m));
            let messages = self.resolve_messages(messages);
            for case in remaining {
                run.errored(case, messages.clone(), None);
                outcomes.insert(case.id().clone(), (Outcome::Errored, None));
            }
            return outcomes;
        }

        for case in remaining {
            let errors: Vec<TestMessage> = unit_errors
                .iter()
                .filter(|(path, _)| is_under(case.id().test_path(), path))
                .map(|(_, m)| m.clone())
                .collect();
            if errors.is_empty() {
                run.skipped(case);
                outcomes.insert(case.id().clone(), (Outcome::Skipped, None));
            } else {
                run.errored(case, self.resolve_messages(errors), None);
                outcomes.insert(case.id().clone(), (Outcome::Errored, None));
            }
        }
        outcomes
    }

    fn resolve_messages(&self, messages: Vec<TestMessage>) -> Vec<TestMessage> {
        messages
            .into_iter()
            .map(|mut m| {
                if let Some(loc) = &mut m.location {
                    loc.file = self.resolve_source(&loc.file);
                }
                m
            })
            .collect()
    }

    /// Starts the binary under the host's debugger with the cases covered by
    /// `items` selected.
    pub async fn debug_tests(
        &self,
        launcher: &dyn DebugLauncher,
        items: &[TestItemRef],
    ) -> Result<(), ExecutionError> {
        let whole = items.iter().any(|r| r.item.ptr_eq(&self.item));
        let paths: Vec<&str> = if whole {
            Vec::new()
        } else {
            items.iter().map(|r| r.item.id().test_path()).collect()
        };
        if !is_executable(&self.path) {
            return Err(ExecutionError::NotExecutable(self.path.clone()));
        }
        let session = DebugSession {
            name: self.entry.debug_config.clone(),
            debugger_command: self.entry.debugger_command.clone(),
            program: self.path.clone(),
            args: boost::debug_args(&paths),
            cwd: self.cwd(),
            env: self.env().await?,
        };
        self.log.info(t!("executable.debugging", label = self.item.label()));
        launcher.launch(session).await?;
        Ok(())
    }

    fn cwd(&self) -> PathBuf {
        self.entry.cwd.clone().unwrap_or_else(|| self.workspace.clone())
    }

    /// Extra environment for the process: the env file first, then the
    /// explicit variables on top.
    async fn env(&self) -> Result<BTreeMap<String, String>, ExecutionError> {
        let mut env = BTreeMap::new();
        if let Some(file) = &self.entry.env_file {
            let text = tokio::fs::read_to_string(file)
                .await
                .map_err(|source| ExecutionError::EnvFile {
                    path: file.clone(),
                    source,
                })?;
            env.extend(parse_env_file(&text));
        }
        env.extend(self.entry.env.clone());
        Ok(env)
    }

    async fn spawn(
        &self,
        args: Vec<String>,
        token: Option<CancellationToken>,
    ) -> Result<CapturedOutput, ExecutionError> {
        if !is_executable(&self.path) {
            return Err(ExecutionError::NotExecutable(self.path.clone()));
        }
        let mut cmd = tokio::process::Command::new(&self.path);
        cmd.args(&args)
            .current_dir(self.cwd())
            .envs(self.env().await?)
            .kill_on_drop(true);
        command::spawn_and_capture(cmd, token)
            .await
            .map_err(|source| ExecutionError::Spawn {
                path: self.path.clone(),
                source,
            })
    }
}

impl std::fmt::Debug for TestExecutable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestExecutable")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Every case covered by `items`, without duplicates, in selection order.
fn covered_cases(items: &[TestItemRef]) -> Vec<TestItem> {
    let mut seen = HashSet::new();
    items
        .iter()
        .flat_map(|r| r.item.cases())
        .filter(|case| seen.insert(case.id().clone()))
        .collect()
}

/// `true` if `path` is `unit` or lies below it.
fn is_under(path: &str, unit: &str) -> bool {
    path == unit
        || (path.starts_with(unit) && path[unit.len()..].starts_with('/'))
}

/// Reports a suite or executable from the states of its cases.
fn report_aggregate(
    run: &dyn TestRun,
    item: &TestItem,
    outcomes: &HashMap<TestItemId, (Outcome, Option<Duration>)>,
) {
    let states: Vec<(Outcome, Option<Duration>)> = item
        .cases()
        .iter()
        .filter_map(|case| outcomes.get(case.id()).copied())
        .collect();
    let total: Option<Duration> = states
        .iter()
        .filter_map(|(_, d)| *d)
        .reduce(|a, b| a + b);

    if states.iter().any(|(o, _)| *o == Outcome::Errored) {
        run.errored(item, Vec::new(), total);
    } else if states.iter().any(|(o, _)| *o == Outcome::Failed) {
        run.failed(item, Vec::new(), total);
    } else if states.iter().all(|(o, _)| *o == Outcome::Skipped) {
        run.skipped(item);
    } else {
        run.passed(item, total);
    }
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are ignored, an
/// `export ` prefix is allowed, and matching surrounding quotes are removed.
pub fn parse_env_file(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = ['"', '\'']
                .iter()
                .find_map(|q| {
                    value
                        .strip_prefix(*q)
                        .and_then(|v| v.strip_suffix(*q))
                })
                .unwrap_or(value);
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
