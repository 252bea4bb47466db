//! # List Command Module / 列出命令模块
//!
//! Loads every workspace folder, resolves every executable, and prints the
//! resulting test tree (or its JSON snapshot).
//!
//! 加载所有工作区文件夹，解析所有可执行文件，并打印得到的测试树（或其 JSON 快照）。

use anyhow::{Context, Result};
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;

use crate::cli::session::{CliOptions, Session};
use crate::core::item::TestItemSnapshot;
use crate::infra::debug::CommandDebugLauncher;
use crate::infra::t;
use crate::reporting::{print_tree, ConsoleRunFactory};

pub async fn execute(options: &CliOptions, json: bool) -> Result<ExitCode> {
    let session = Session::new(
        options,
        Arc::new(ConsoleRunFactory::default()),
        Arc::new(CommandDebugLauncher::default()),
        false,
    );
    session.load_all().await;

    let roots = session.manager.items().all();
    if json {
        let snapshots: Vec<TestItemSnapshot> = roots.iter().map(|r| r.snapshot()).collect();
        let text = serde_json::to_string_pretty(&snapshots)
            .with_context(|| t!("list.json_failed").to_string())?;
        println!("{text}");
    } else {
        for root in &roots {
            print_tree(root, 0);
            if root.child_count() == 0 {
                println!("  {}", t!("list.no_executables").dimmed());
            }
        }
    }

    session.dispose();
    Ok(if session.notifier.error_count() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
