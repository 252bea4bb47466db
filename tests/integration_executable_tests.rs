//! # Test Executable Integration Tests / 测试可执行文件集成测试
//!
//! Drives a [`TestExecutable`] against scripted stand-ins for Boost.Test
//! binaries: listing, running whole binaries and subsets, crashes, missing
//! binaries, cancellation and debug sessions.
//!
//! 使用模拟 Boost.Test 二进制文件的脚本驱动 [`TestExecutable`]：
//! 列出、运行整个二进制或子集、崩溃、缺失的二进制、取消以及调试会话。

mod common;

use boost_test_adapter::core::config::{TestExeEntry, TestExeSource};
use boost_test_adapter::core::error::ExecutionError;
use boost_test_adapter::core::executable::TestExecutable;
use boost_test_adapter::core::id::AdapterId;
use boost_test_adapter::core::item::{TestItem, TestItemKind};
use boost_test_adapter::core::models::WorkspaceFolder;
use boost_test_adapter::core::selection::TestItemRef;
use boost_test_adapter::infra::logger::Logger;
use common::{run_calls, setup_workspace, FakeBoost, RecordingDebugLauncher, RecordingRun, RunEntry};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Fixture {
    _ws: TempDir,
    root: PathBuf,
    binary: PathBuf,
    exe: TestExecutable,
}

fn entry(binary: &Path, root: &Path) -> TestExeEntry {
    TestExeEntry {
        source: TestExeSource::Path(binary.to_path_buf()),
        label: None,
        debug_config: None,
        debugger_command: None,
        cwd: None,
        env: BTreeMap::new(),
        env_file: None,
        source_prefix: root.to_path_buf(),
    }
}

fn fixture_with(fake: FakeBoost, customize: impl FnOnce(&mut TestExeEntry)) -> Fixture {
    let ws = setup_workspace();
    let root = WorkspaceFolder::new(ws.path(), 0).path;
    let binary = fake.write_to(&root.join("bin").join("fake_test"));
    let mut entry = entry(&binary, &root);
    customize(&mut entry);
    let adapter_id = AdapterId::for_workspace(&root);
    let exe = TestExecutable::new(&adapter_id, entry, binary.clone(), root.clone(), &Logger::console());
    Fixture {
        _ws: ws,
        root,
        binary,
        exe,
    }
}

fn fixture(fake: FakeBoost) -> Fixture {
    fixture_with(fake, |_| {})
}

/// Looks up a loaded item by its path below the executable.
fn item(exe: &TestExecutable, path: &str) -> TestItem {
    let id = path
        .split('/')
        .fold(exe.item().id().clone(), |id, segment| id.child(segment));
    exe.item()
        .find(&id)
        .unwrap_or_else(|| panic!("no item at {path}"))
}

#[cfg(test)]
mod load_tests {
    use super::*;

    #[tokio::test]
    async fn test_load_builds_tree_with_locations() {
        let f = fixture(FakeBoost::new());
        assert!(!f.exe.is_loaded());
        f.exe.load_tests().await.unwrap();
        assert!(f.exe.is_loaded());

        let labels: Vec<String> = f.exe.item().children().iter().map(|c| c.label().to_string()).collect();
        assert_eq!(labels, vec!["Suite1", "caseC"]);
        assert_eq!(f.exe.item().label(), "fake_test");
        assert_eq!(f.exe.item().kind(), TestItemKind::Executable);

        let suite = item(&f.exe, "Suite1");
        assert_eq!(suite.kind(), TestItemKind::Suite);
        let case_b = item(&f.exe, "Suite1/caseB");
        assert_eq!(case_b.kind(), TestItemKind::Case);
        let location = case_b.location().unwrap();
        assert_eq!(location.file, f.root.join("suite1.cpp"));
        assert_eq!(location.line, 12);
        assert_eq!(f.exe.item().cases().len(), 3);
    }

    #[tokio::test]
    async fn test_reload_replaces_children() {
        let f = fixture(FakeBoost::new());
        f.exe.load_tests().await.unwrap();
        let before = item(&f.exe, "caseC");

        f.exe.load_tests().await.unwrap();
        let after = item(&f.exe, "caseC");
        assert_eq!(before.id(), after.id());
        assert_ne!(before, after);
        assert_eq!(f.exe.item().child_count(), 2);
    }

    #[tokio::test]
    async fn test_entry_label_is_used() {
        let f = fixture_with(FakeBoost::new(), |e| e.label = Some("Unit tests".to_string()));
        assert_eq!(f.exe.item().label(), "Unit tests");
    }

    #[tokio::test]
    async fn test_missing_binary_fails_load() {
        let f = fixture(FakeBoost::new());
        f.exe.load_tests().await.unwrap();
        fs::remove_file(&f.binary).unwrap();

        let err = f.exe.load_tests().await.unwrap_err();
        assert!(matches!(err, ExecutionError::NotExecutable(_)));
        assert_eq!(f.exe.item().child_count(), 0);
        assert!(!f.exe.is_loaded());
    }

    #[tokio::test]
    async fn test_unparsable_list_is_parse_error() {
        let f = fixture(FakeBoost::new().dot("garbage"));
        // The list branch always exits 0, so garbage is a parse error.
        let err = f.exe.load_tests().await.unwrap_err();
        assert!(matches!(err, ExecutionError::Parse { .. }));
    }
}

#[cfg(test)]
mod run_tests {
    use super::*;

    #[tokio::test]
    async fn test_run_whole_executable() {
        let f = fixture(FakeBoost::new());
        f.exe.load_tests().await.unwrap();
        let run = RecordingRun::default();

        f.exe
            .run_tests(&run, &[TestItemRef::selected(f.exe.item().clone())])
            .await
            .unwrap();

        assert_eq!(run.state_of(item(&f.exe, "Suite1/caseA").id()), Some("passed"));
        assert_eq!(run.state_of(item(&f.exe, "Suite1/caseB").id()), Some("failed"));
        assert_eq!(run.state_of(item(&f.exe, "caseC").id()), Some("passed"));
        assert_eq!(run.state_of(f.exe.item().id()), Some("failed"));

        let messages = run.messages_of(item(&f.exe, "Suite1/caseB").id());
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("check 1 == 2 has failed"));
        assert!(messages[0].starts_with(&f.root.join("suite1.cpp").display().to_string()));

        let calls = run_calls(&f.binary);
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].contains("--run_test"));
        assert!(calls[0].contains("--log_level=test_suite"));
        assert!(run.entries().iter().any(|e| matches!(e, RunEntry::Output(o) if o.contains("Entering test module"))));
    }

    #[tokio::test]
    async fn test_run_subset_selects_paths() {
        let f = fixture(FakeBoost::new());
        f.exe.load_tests().await.unwrap();
        let run = RecordingRun::default();
        let case_a = item(&f.exe, "Suite1/caseA");
        let case_c = item(&f.exe, "caseC");

        f.exe
            .run_tests(
                &run,
                &[TestItemRef::selected(case_a.clone()), TestItemRef::selected(case_c.clone())],
            )
            .await
            .unwrap();

        let calls = run_calls(&f.binary);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("--run_test=Suite1/caseA"));
        assert!(calls[0].contains("--run_test=caseC"));
        assert_eq!(run.state_of(case_a.id()), Some("passed"));
        assert_eq!(run.state_of(case_c.id()), Some("passed"));
        // Not selected, so never reported even though the log mentions it.
        assert_eq!(run.state_of(item(&f.exe, "Suite1/caseB").id()), None);
    }

    #[tokio::test]
    async fn test_suite_selection_reports_aggregate() {
        let f = fixture(FakeBoost::new());
        f.exe.load_tests().await.unwrap();
        let run = RecordingRun::default();
        let suite = item(&f.exe, "Suite1");

        f.exe
            .run_tests(&run, &[TestItemRef::selected(suite.clone())])
            .await
            .unwrap();

        assert!(run.entries().contains(&RunEntry::Started(suite.id().to_string())));
        assert_eq!(run.state_of(suite.id()), Some("failed"));
        assert!(run_calls(&f.binary)[0].contains("--run_test=Suite1"));
    }

    #[tokio::test]
    async fn test_passing_suite_is_passed() {
        let f = fixture(FakeBoost::passing());
        f.exe.load_tests().await.unwrap();
        let run = RecordingRun::default();
        f.exe
            .run_tests(&run, &[TestItemRef::selected(f.exe.item().clone())])
            .await
            .unwrap();
        assert_eq!(run.state_of(f.exe.item().id()), Some("passed"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_without_results_errors_all_cases() {
        let f = fixture(FakeBoost::new().log("").stderr("boom: cannot load library").exit_code(127));
        f.exe.load_tests().await.unwrap();
        let run = RecordingRun::default();

        f.exe
            .run_tests(&run, &[TestItemRef::selected(f.exe.item().clone())])
            .await
            .unwrap();

        for case in f.exe.item().cases() {
            assert_eq!(run.state_of(case.id()), Some("errored"));
            assert!(run.messages_of(case.id()).iter().any(|m| m.contains("boom")));
        }
        assert_eq!(run.state_of(f.exe.item().id()), Some("errored"));
    }

    #[tokio::test]
    async fn test_crash_mid_case() {
        let log = r#"Running 3 test cases...
Entering test module "fake"
suite1.cpp(5): Entering test suite "Suite1"
suite1.cpp(7): Entering test case "caseA"
suite1.cpp(7): Leaving test case "caseA"; testing time: 10us
suite1.cpp(12): Entering test case "caseB"
unknown location(0): fatal error: in "Suite1/caseB": memory access violation at address: 0x00000000"#;
        let f = fixture(FakeBoost::new().log(log).exit_code(201));
        f.exe.load_tests().await.unwrap();
        let run = RecordingRun::default();

        f.exe
            .run_tests(&run, &[TestItemRef::selected(f.exe.item().clone())])
            .await
            .unwrap();

        assert_eq!(run.state_of(item(&f.exe, "Suite1/caseA").id()), Some("passed"));
        let case_b = item(&f.exe, "Suite1/caseB");
        assert_eq!(run.state_of(case_b.id()), Some("errored"));
        assert!(run.messages_of(case_b.id()).iter().any(|m| m.contains("memory access violation")));
        assert_eq!(run.state_of(item(&f.exe, "caseC").id()), Some("skipped"));
        assert_eq!(run.state_of(f.exe.item().id()), Some("errored"));
    }

    #[tokio::test]
    async fn test_unresolved_reference_loads_first() {
        let f = fixture(FakeBoost::passing());
        let run = RecordingRun::default();

        f.exe
            .run_tests(&run, &[TestItemRef::new(f.exe.item().clone(), false)])
            .await
            .unwrap();

        assert!(f.exe.is_loaded());
        let enqueued = run.enqueued();
        for descendant in f.exe.item().descendants() {
            assert!(enqueued.contains(&descendant.id().to_string()));
        }
        assert_eq!(run.state_of(item(&f.exe, "caseC").id()), Some("passed"));
    }

    #[tokio::test]
    async fn test_unresolved_reference_to_missing_binary_errors_executable() {
        let f = fixture(FakeBoost::new());
        fs::remove_file(&f.binary).unwrap();
        let run = RecordingRun::default();

        let result = f
            .exe
            .run_tests(&run, &[TestItemRef::new(f.exe.item().clone(), false)])
            .await;
        assert!(result.is_err());
        assert_eq!(run.state_of(f.exe.item().id()), Some("errored"));
    }

    #[tokio::test]
    async fn test_binary_removed_after_load_errors_cases() {
        let f = fixture(FakeBoost::new());
        f.exe.load_tests().await.unwrap();
        fs::remove_file(&f.binary).unwrap();
        let run = RecordingRun::default();
        let case_c = item(&f.exe, "caseC");

        let err = f
            .exe
            .run_tests(&run, &[TestItemRef::selected(case_c.clone())])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NotExecutable(_)));
        assert_eq!(run.state_of(case_c.id()), Some("errored"));
    }

    #[tokio::test]
    async fn test_cancel_kills_running_binary() {
        let f = fixture(FakeBoost::new().sleep(Duration::from_secs(20)));
        f.exe.load_tests().await.unwrap();
        f.exe.reset_cancellation();
        let run = RecordingRun::default();
        let started = Instant::now();

        let refs = [TestItemRef::selected(f.exe.item().clone())];
        let (result, _) = tokio::join!(f.exe.run_tests(&run, &refs), async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            f.exe.cancel_tests();
        });

        result.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(f.exe.is_cancelled());
        for case in f.exe.item().cases() {
            assert_eq!(run.state_of(case.id()), Some("skipped"));
        }
        assert_eq!(run.state_of(f.exe.item().id()), Some("skipped"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_without_spawning() {
        let f = fixture(FakeBoost::new());
        f.exe.load_tests().await.unwrap();
        f.exe.cancel_tests();
        f.exe.cancel_tests();
        let run = RecordingRun::default();

        f.exe
            .run_tests(&run, &[TestItemRef::selected(f.exe.item().clone())])
            .await
            .unwrap();

        assert!(run_calls(&f.binary).is_empty());
        for case in f.exe.item().cases() {
            assert_eq!(run.state_of(case.id()), Some("skipped"));
        }

        f.exe.reset_cancellation();
        assert!(!f.exe.is_cancelled());
    }
}

#[cfg(test)]
mod debug_tests {
    use super::*;

    #[tokio::test]
    async fn test_debug_session_for_case() {
        let f = fixture_with(FakeBoost::new(), |e| {
            e.debug_config = Some("Test Config".to_string());
            e.debugger_command = Some("gdb -q --args".to_string());
        });
        f.exe.load_tests().await.unwrap();
        let launcher = RecordingDebugLauncher::default();

        f.exe
            .debug_tests(&launcher, &[TestItemRef::selected(item(&f.exe, "Suite1/caseA"))])
            .await
            .unwrap();

        let sessions = launcher.sessions();
        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.program, f.binary);
        assert_eq!(session.args, vec!["--catch_system_errors=no", "--run_test=Suite1/caseA"]);
        assert_eq!(session.cwd, f.root);
        assert_eq!(session.name.as_deref(), Some("Test Config"));
        assert_eq!(session.debugger_command.as_deref(), Some("gdb -q --args"));
    }

    #[tokio::test]
    async fn test_debug_whole_executable_and_environment() {
        let ws_env = setup_workspace();
        let env_file = ws_env.path().join("test.env");
        fs::write(&env_file, "A=from_file\nB=from_file\n").unwrap();
        let cwd = ws_env.path().to_path_buf();

        let f = fixture_with(FakeBoost::new(), |e| {
            e.env_file = Some(env_file.clone());
            e.env.insert("B".to_string(), "from_entry".to_string());
            e.cwd = Some(cwd.clone());
        });
        let launcher = RecordingDebugLauncher::default();

        f.exe
            .debug_tests(&launcher, &[TestItemRef::selected(f.exe.item().clone())])
            .await
            .unwrap();

        let session = &launcher.sessions()[0];
        assert_eq!(session.args, vec!["--catch_system_errors=no"]);
        assert_eq!(session.cwd, cwd);
        assert_eq!(session.env.get("A").map(String::as_str), Some("from_file"));
        assert_eq!(session.env.get("B").map(String::as_str), Some("from_entry"));
    }

    #[tokio::test]
    async fn test_debug_missing_env_file_is_error() {
        let f = fixture_with(FakeBoost::new(), |e| {
            e.env_file = Some(PathBuf::from("/nonexistent/dir/.env"));
        });
        let launcher = RecordingDebugLauncher::default();
        let err = f
            .exe
            .debug_tests(&launcher, &[TestItemRef::selected(f.exe.item().clone())])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::EnvFile { .. }));
        assert!(launcher.sessions().is_empty());
    }
}
