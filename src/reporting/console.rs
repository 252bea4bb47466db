//! # Console Reporting Module / 控制台报告模块
//!
//! A [`TestRun`] that prints each finished test case as it is reported and a
//! coloured summary at the end of the run, plus a tree printer for listing.
//!
//! 一个 [`TestRun`] 实现：在每个测试用例完成时打印结果，并在运行结束时打印彩色摘要；
//! 另外提供用于列出测试的树形打印。

use colored::*;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::core::host::{TestRun, TestRunFactory};
use crate::core::id::TestItemId;
use crate::core::item::{TestItem, TestItemKind};
use crate::core::models::{TestMessage, TestRunRequest};
use crate::infra::t;

/// Terminal state of a reported item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    Enqueued,
    Running,
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl TestState {
    fn label(&self) -> String {
        match self {
            TestState::Enqueued => t!("report.enqueued").to_string(),
            TestState::Running => t!("report.running").to_string(),
            TestState::Passed => t!("report.passed").to_string(),
            TestState::Failed => t!("report.failed").to_string(),
            TestState::Errored => t!("report.errored").to_string(),
            TestState::Skipped => t!("report.skipped").to_string(),
        }
    }

    fn colored(&self) -> ColoredString {
        let label = self.label();
        match self {
            TestState::Passed => label.green(),
            TestState::Failed | TestState::Errored => label.red(),
            TestState::Skipped => label.dimmed(),
            TestState::Enqueued | TestState::Running => label.normal(),
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    name: String,
    kind: TestItemKind,
    state: TestState,
    duration: Option<Duration>,
    messages: Vec<TestMessage>,
}

/// Counts of case outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored + self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

/// Prints results to stdout.
pub struct ConsoleTestRun {
    records: Mutex<IndexMap<TestItemId, Record>>,
    show_output: bool,
}

impl ConsoleTestRun {
    pub fn new(show_output: bool) -> Self {
        Self {
            records: Mutex::new(IndexMap::new()),
            show_output,
        }
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for record in self.records.lock().values() {
            if record.kind != TestItemKind::Case {
                continue;
            }
            match record.state {
                TestState::Passed => summary.passed += 1,
                TestState::Failed => summary.failed += 1,
                TestState::Errored => summary.errored += 1,
                TestState::Skipped => summary.skipped += 1,
                TestState::Enqueued | TestState::Running => {}
            }
        }
        summary
    }

    /// Final state of the item with `id`, if it was reported.
    pub fn state_of(&self, id: &TestItemId) -> Option<TestState> {
        self.records.lock().get(id).map(|r| r.state)
    }

    fn update(
        &self,
        item: &TestItem,
        state: TestState,
        duration: Option<Duration>,
        messages: Vec<TestMessage>,
    ) {
        let record = {
            let mut records = self.records.lock();
            let record = records.entry(item.id().clone()).or_insert_with(|| Record {
                name: display_name(item),
                kind: item.kind(),
                state,
                duration: None,
                messages: Vec::new(),
            });
            record.state = state;
            if duration.is_some() {
                record.duration = duration;
            }
            record.messages.extend(messages);
            record.clone()
        };
        if item.kind() == TestItemKind::Case && is_terminal(state) {
            print_result(&record);
        }
    }

    fn print_summary(&self) {
        let summary = self.summary();
        println!("\n{}", t!("report.summary_banner").bold());
        let line = t!(
            "report.summary_line",
            total = summary.total(),
            passed = summary.passed,
            failed = summary.failed,
            errored = summary.errored,
            skipped = summary.skipped
        );
        if summary.is_success() {
            println!("{}", line.green());
        } else {
            println!("{}", line.red());
            for record in self.records.lock().values() {
                if record.kind == TestItemKind::Case
                    && matches!(record.state, TestState::Failed | TestState::Errored)
                {
                    println!("  - {}", record.name.red());
                }
            }
        }
    }
}

impl TestRun for ConsoleTestRun {
    fn enqueued(&self, item: &TestItem) {
        self.update(item, TestState::Enqueued, None, Vec::new());
    }

    fn started(&self, item: &TestItem) {
        self.update(item, TestState::Running, None, Vec::new());
    }

    fn passed(&self, item: &TestItem, duration: Option<Duration>) {
        self.update(item, TestState::Passed, duration, Vec::new());
    }

    fn failed(&self, item: &TestItem, messages: Vec<TestMessage>, duration: Option<Duration>) {
        self.update(item, TestState::Failed, duration, messages);
    }

    fn errored(&self, item: &TestItem, messages: Vec<TestMessage>, duration: Option<Duration>) {
        self.update(item, TestState::Errored, duration, messages);
    }

    fn skipped(&self, item: &TestItem) {
        self.update(item, TestState::Skipped, None, Vec::new());
    }

    fn append_output(&self, output: &str) {
        if self.show_output && !output.trim().is_empty() {
            println!("{}", output.trim_end().dimmed());
        }
    }

    fn end(&self) {
        self.print_summary();
    }
}

fn is_terminal(state: TestState) -> bool {
    !matches!(state, TestState::Enqueued | TestState::Running)
}

fn print_result(record: &Record) {
    let duration = record
        .duration
        .map(|d| format!("{d:.2?}"))
        .unwrap_or_default();
    println!("  - {:<10} | {:<50} {:>10}", record.state.colored(), record.name, duration);
    for message in &record.messages {
        for line in message.to_string().lines() {
            println!("      {}", line.yellow());
        }
    }
}

/// `Executable/Suite/case`, built from the labels up to the executable.
fn display_name(item: &TestItem) -> String {
    let mut parts = vec![item.label().to_string()];
    let mut current = item.parent();
    while let Some(parent) = current {
        if parent.kind() == TestItemKind::Workspace {
            break;
        }
        parts.push(parent.label().to_string());
        current = parent.parent();
    }
    parts.reverse();
    parts.join("/")
}

/// Creates [`ConsoleTestRun`]s and keeps them for inspection after the run.
#[derive(Default)]
pub struct ConsoleRunFactory {
    show_output: bool,
    runs: Mutex<Vec<Arc<ConsoleTestRun>>>,
}

impl ConsoleRunFactory {
    pub fn new(show_output: bool) -> Self {
        Self {
            show_output,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Outcome counts over every run created so far.
    pub fn summary(&self) -> RunSummary {
        self.runs
            .lock()
            .iter()
            .map(|run| run.summary())
            .fold(RunSummary::default(), |acc, s| RunSummary {
                passed: acc.passed + s.passed,
                failed: acc.failed + s.failed,
                errored: acc.errored + s.errored,
                skipped: acc.skipped + s.skipped,
            })
    }
}

impl TestRunFactory for ConsoleRunFactory {
    fn create_test_run(&self, _request: &TestRunRequest) -> Arc<dyn TestRun> {
        let run = Arc::new(ConsoleTestRun::new(self.show_output));
        self.runs.lock().push(Arc::clone(&run));
        run
    }
}

/// Prints `item` and its subtree, one line per node.
pub fn print_tree(item: &TestItem, depth: usize) {
    let indent = "  ".repeat(depth);
    let label = match item.kind() {
        TestItemKind::Workspace => item.label().bold().to_string(),
        TestItemKind::Executable => item.label().cyan().to_string(),
        TestItemKind::Suite => item.label().blue().to_string(),
        TestItemKind::Case => item.label().to_string(),
    };
    let location = item
        .location()
        .map(|loc| format!("  {}", format!("{}:{}", loc.file.display(), loc.line).dimmed()))
        .unwrap_or_default();
    println!("{indent}{label}{location}");
    for child in item.children() {
        print_tree(&child, depth + 1);
    }
}
