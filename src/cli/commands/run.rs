//! # Run Command Module / 运行命令模块
//!
//! Runs every test, or the label paths given on the command line, and
//! prints the results. Ctrl-C cancels the run and kills running binaries.
//!
//! 运行所有测试或命令行给出的标签路径所对应的测试，并打印结果。
//! Ctrl-C 会取消运行并终止正在运行的二进制文件。

use anyhow::Result;
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::cli::session::{CliOptions, Session};
use crate::core::models::TestRunRequest;
use crate::infra::debug::CommandDebugLauncher;
use crate::infra::t;
use crate::reporting::ConsoleRunFactory;

pub async fn execute(options: &CliOptions, paths: &[String], show_output: bool) -> Result<ExitCode> {
    let factory = Arc::new(ConsoleRunFactory::new(show_output));
    let session = Session::new(
        options,
        factory.clone(),
        Arc::new(CommandDebugLauncher::default()),
        false,
    );
    session.load_all().await;

    let include = if paths.is_empty() {
        None
    } else {
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            items.push(session.find(path)?);
        }
        Some(items)
    };

    let token = CancellationToken::new();
    let ctrl_c = {
        let token = token.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                println!("\n{}", t!("run.cancelling").yellow());
                token.cancel();
            }
        })
    };

    session
        .manager
        .run_handler(TestRunRequest::run(include), token.clone())
        .await;
    ctrl_c.abort();
    session.dispose();

    let summary = factory.summary();
    let ok = summary.is_success() && session.notifier.error_count() == 0 && !token.is_cancelled();
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
