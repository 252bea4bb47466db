// Shared test helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

use boost_test_adapter::core::adapter::AdapterOptions;
use boost_test_adapter::core::error::DebugError;
use boost_test_adapter::core::host::{DebugLauncher, DebugSession, TestRun, TestRunFactory};
use boost_test_adapter::core::id::TestItemId;
use boost_test_adapter::core::item::TestItem;
use boost_test_adapter::core::models::{TestMessage, TestRunRequest, WorkspaceFolder};
use boost_test_adapter::core::variables::VariableContext;
use boost_test_adapter::core::HostServices;
use boost_test_adapter::infra::logger::{Logger, Notifier};

/// DOT listing of the standard fake module:
/// `Suite1/{caseA, caseB}` and a top-level `caseC`.
pub const SAMPLE_DOT: &str = r#"digraph G {rankdir=LR;
tu1[shape=ellipse,peripheries=2,fontname=Helvetica,color=green,label="fake|main.cpp(1)"];
{
tu2[shape=Mrecord,fontname=Helvetica,color=green,label="Suite1|suite1.cpp(5)"];
tu1 -> tu2;
{
tu65536[shape=Mrecord,fontname=Helvetica,color=green,label="caseA|suite1.cpp(7)"];
tu2 -> tu65536;
tu65537[shape=Mrecord,fontname=Helvetica,color=green,label="caseB|suite1.cpp(12)"];
tu2 -> tu65537;
}
tu65538[shape=Mrecord,fontname=Helvetica,color=green,label="caseC|main.cpp(3)"];
tu1 -> tu65538;
}
}"#;

/// Run log of the standard fake module: caseB fails, the others pass.
pub const SAMPLE_LOG: &str = r#"Running 3 test cases...
Entering test module "fake"
suite1.cpp(5): Entering test suite "Suite1"
suite1.cpp(7): Entering test case "caseA"
suite1.cpp(7): Leaving test case "caseA"; testing time: 120us
suite1.cpp(12): Entering test case "caseB"
suite1.cpp(14): error: in "Suite1/caseB": check 1 == 2 has failed [1 != 2]
suite1.cpp(12): Leaving test case "caseB"; testing time: 3ms
suite1.cpp(5): Leaving test suite "Suite1"; testing time: 4ms
main.cpp(3): Entering test case "caseC"
main.cpp(3): Leaving test case "caseC"; testing time: 50us
Leaving test module "fake"; testing time: 5ms"#;

/// Run log in which every case passes.
pub const PASSING_LOG: &str = r#"Running 3 test cases...
Entering test module "fake"
suite1.cpp(5): Entering test suite "Suite1"
suite1.cpp(7): Entering test case "caseA"
suite1.cpp(7): Leaving test case "caseA"; testing time: 120us
suite1.cpp(12): Entering test case "caseB"
suite1.cpp(12): Leaving test case "caseB"; testing time: 3ms
suite1.cpp(5): Leaving test suite "Suite1"; testing time: 4ms
main.cpp(3): Entering test case "caseC"
main.cpp(3): Leaving test case "caseC"; testing time: 50us
Leaving test module "fake"; testing time: 5ms"#;

/// A POSIX shell script standing in for a Boost.Test binary. Every
/// invocation appends its arguments to `<binary>.calls`.
pub struct FakeBoost {
    dot: String,
    log: String,
    stderr: String,
    exit_code: i32,
    sleep: Option<Duration>,
}

impl Default for FakeBoost {
    fn default() -> Self {
        Self {
            dot: SAMPLE_DOT.to_string(),
            log: SAMPLE_LOG.to_string(),
            stderr: String::new(),
            exit_code: 201,
            sleep: None,
        }
    }
}

impl FakeBoost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passing() -> Self {
        Self {
            log: PASSING_LOG.to_string(),
            exit_code: 0,
            ..Self::default()
        }
    }

    pub fn dot(mut self, dot: &str) -> Self {
        self.dot = dot.to_string();
        self
    }

    pub fn log(mut self, log: &str) -> Self {
        self.log = log.to_string();
        self
    }

    pub fn stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn sleep(mut self, duration: Duration) -> Self {
        self.sleep = Some(duration);
        self
    }

    pub fn script(&self) -> String {
        let sleep = self
            .sleep
            // Detached from the pipes so that killing the script closes them.
            .map(|d| format!("sleep {:.3} >/dev/null 2>&1\n", d.as_secs_f64()))
            .unwrap_or_default();
        format!(
            r#"#!/bin/sh
echo "$*" >> "$0.calls"
for arg in "$@"; do
  if [ "$arg" = "--list_content=DOT" ]; then
    cat >&2 <<'__DOT__'
{dot}
__DOT__
    exit 0
  fi
done
{sleep}cat <<'__LOG__'
{log}
__LOG__
cat >&2 <<'__ERR__'
{stderr}
__ERR__
exit {code}
"#,
            dot = self.dot,
            sleep = sleep,
            log = self.log,
            stderr = self.stderr,
            code = self.exit_code,
        )
    }

    /// Writes the script to `path` and makes it executable.
    pub fn write_to(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create binary directory");
        }
        fs::write(path, self.script()).expect("Failed to write fake binary");
        let mut perms = fs::metadata(path).expect("Failed to stat fake binary").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("Failed to chmod fake binary");
        path.to_path_buf()
    }
}

/// Arguments of every invocation of the fake binary at `binary`.
pub fn calls(binary: &Path) -> Vec<String> {
    let mut path = binary.as_os_str().to_owned();
    path.push(".calls");
    fs::read_to_string(PathBuf::from(path))
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Invocations that ran tests, as opposed to listing them.
pub fn run_calls(binary: &Path) -> Vec<String> {
    calls(binary)
        .into_iter()
        .filter(|c| !c.contains("--list_content"))
        .collect()
}

pub fn setup_workspace() -> TempDir {
    tempdir().expect("Failed to create temporary directory")
}

pub fn write_config(workspace: &Path, content: &str) -> PathBuf {
    let path = workspace.join("boost-test-adapter.toml");
    fs::write(&path, content).expect("Failed to write configuration");
    path
}

pub fn folder(workspace: &Path) -> WorkspaceFolder {
    WorkspaceFolder::new(workspace, 0)
}

pub fn context(workspace: &Path) -> VariableContext {
    VariableContext::new(folder(workspace))
}

/// Options for tests that do not exercise file watching.
pub fn no_watch() -> AdapterOptions {
    AdapterOptions {
        debounce: Duration::from_millis(50),
        watch: false,
    }
}

pub fn watching() -> AdapterOptions {
    AdapterOptions {
        debounce: Duration::from_millis(50),
        watch: true,
    }
}

/// Everything a [`TestRun`] was told, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEntry {
    Enqueued(String),
    Started(String),
    Passed(String),
    Failed(String, Vec<String>),
    Errored(String, Vec<String>),
    Skipped(String),
    Output(String),
    End,
}

#[derive(Debug, Default)]
pub struct RecordingRun {
    entries: Mutex<Vec<RunEntry>>,
}

impl RecordingRun {
    pub fn entries(&self) -> Vec<RunEntry> {
        self.entries.lock().unwrap().clone()
    }

    fn push(&self, entry: RunEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    /// The last terminal state reported for `id`: "passed", "failed",
    /// "errored" or "skipped".
    pub fn state_of(&self, id: &TestItemId) -> Option<&'static str> {
        let id = id.as_str();
        self.entries().iter().rev().find_map(|e| match e {
            RunEntry::Passed(i) if i == id => Some("passed"),
            RunEntry::Failed(i, _) if i == id => Some("failed"),
            RunEntry::Errored(i, _) if i == id => Some("errored"),
            RunEntry::Skipped(i) if i == id => Some("skipped"),
            _ => None,
        })
    }

    pub fn messages_of(&self, id: &TestItemId) -> Vec<String> {
        let id = id.as_str();
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                RunEntry::Failed(i, m) | RunEntry::Errored(i, m) if i == id => Some(m),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn enqueued(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                RunEntry::Enqueued(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    pub fn ended(&self) -> bool {
        self.entries().contains(&RunEntry::End)
    }
}

fn texts(messages: Vec<TestMessage>) -> Vec<String> {
    messages.iter().map(|m| m.to_string()).collect()
}

impl TestRun for RecordingRun {
    fn enqueued(&self, item: &TestItem) {
        self.push(RunEntry::Enqueued(item.id().to_string()));
    }

    fn started(&self, item: &TestItem) {
        self.push(RunEntry::Started(item.id().to_string()));
    }

    fn passed(&self, item: &TestItem, _duration: Option<Duration>) {
        self.push(RunEntry::Passed(item.id().to_string()));
    }

    fn failed(&self, item: &TestItem, messages: Vec<TestMessage>, _duration: Option<Duration>) {
        self.push(RunEntry::Failed(item.id().to_string(), texts(messages)));
    }

    fn errored(&self, item: &TestItem, messages: Vec<TestMessage>, _duration: Option<Duration>) {
        self.push(RunEntry::Errored(item.id().to_string(), texts(messages)));
    }

    fn skipped(&self, item: &TestItem) {
        self.push(RunEntry::Skipped(item.id().to_string()));
    }

    fn append_output(&self, output: &str) {
        self.push(RunEntry::Output(output.to_string()));
    }

    fn end(&self) {
        self.push(RunEntry::End);
    }
}

#[derive(Debug, Default)]
pub struct RecordingFactory {
    runs: Mutex<Vec<Arc<RecordingRun>>>,
}

impl RecordingFactory {
    pub fn runs(&self) -> Vec<Arc<RecordingRun>> {
        self.runs.lock().unwrap().clone()
    }
}

impl TestRunFactory for RecordingFactory {
    fn create_test_run(&self, _request: &TestRunRequest) -> Arc<dyn TestRun> {
        let run = Arc::new(RecordingRun::default());
        self.runs.lock().unwrap().push(run.clone());
        run
    }
}

#[derive(Debug, Default)]
pub struct RecordingDebugLauncher {
    sessions: Mutex<Vec<DebugSession>>,
}

impl RecordingDebugLauncher {
    pub fn sessions(&self) -> Vec<DebugSession> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl DebugLauncher for RecordingDebugLauncher {
    async fn launch(&self, session: DebugSession) -> Result<(), DebugError> {
        self.sessions.lock().unwrap().push(session);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

/// Recording doubles wired into [`HostServices`].
pub struct Host {
    pub factory: Arc<RecordingFactory>,
    pub launcher: Arc<RecordingDebugLauncher>,
    pub notifier: Arc<RecordingNotifier>,
    pub services: HostServices,
}

impl Host {
    pub fn new(options: AdapterOptions) -> Self {
        let factory = Arc::new(RecordingFactory::default());
        let launcher = Arc::new(RecordingDebugLauncher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let services = HostServices {
            run_factory: factory.clone(),
            debug_launcher: launcher.clone(),
            active_file: None,
            adapter_options: options,
            log: Logger::new(notifier.clone()),
        };
        Self {
            factory,
            launcher,
            notifier,
            services,
        }
    }

    pub fn log(&self) -> Logger {
        self.services.log.clone()
    }
}
