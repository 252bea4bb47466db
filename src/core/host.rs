//! # Host Interface Module / 宿主接口模块
//!
//! The seams between the orchestration core and whatever hosts it: the sink
//! that records a test run, the factory creating those sinks, and the debug
//! launcher. The core only writes to these; it never reads host state back.
//!
//! 编排核心与宿主之间的接缝：记录测试运行的接收器、创建接收器的工厂以及调试启动器。

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::DebugError;
use crate::core::item::{TestItem, TestItemKind};
use crate::core::models::{TestMessage, TestRunRequest};

/// Write-only record of one test run, shared by every controller taking part
/// in the request. Each item belongs to exactly one controller, so writes for
/// different items may interleave freely.
pub trait TestRun: Send + Sync {
    fn enqueued(&self, item: &TestItem);
    fn started(&self, item: &TestItem);
    fn passed(&self, item: &TestItem, duration: Option<Duration>);
    fn failed(&self, item: &TestItem, messages: Vec<TestMessage>, duration: Option<Duration>);
    fn errored(&self, item: &TestItem, messages: Vec<TestMessage>, duration: Option<Duration>);
    fn skipped(&self, item: &TestItem);
    /// Raw output of a test process.
    fn append_output(&self, output: &str);
    /// No further writes follow.
    fn end(&self);
}

/// Marks everything `item` covers as skipped: its cases, and the item itself
/// unless it is a case. A workspace item stands for its executables.
pub fn skip_covered(run: &dyn TestRun, item: &TestItem) {
    if item.kind() == TestItemKind::Workspace {
        for exe in item.children() {
            skip_covered(run, &exe);
        }
        return;
    }
    for case in item.cases() {
        run.skipped(&case);
    }
    if item.kind() != TestItemKind::Case {
        run.skipped(item);
    }
}

/// Creates the run record for a run-profile request.
pub trait TestRunFactory: Send + Sync {
    fn create_test_run(&self, request: &TestRunRequest) -> Arc<dyn TestRun>;
}

/// Everything needed to start a test binary under a debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSession {
    /// Name of the debug configuration from the test entry, if any.
    pub name: Option<String>,
    /// Debugger command line configured under that name, if any.
    pub debugger_command: Option<String>,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

/// Starts debug sessions. Returns once the session has ended.
#[async_trait]
pub trait DebugLauncher: Send + Sync {
    async fn launch(&self, session: DebugSession) -> Result<(), DebugError>;
}
