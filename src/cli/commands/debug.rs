//! # Debug Command Module / 调试命令模块
//!
//! Starts one test executable under a debugger with the selected tests.
//!
//! 在调试器下启动一个测试可执行文件并运行所选测试。

use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cli::session::{CliOptions, Session};
use crate::core::models::TestRunRequest;
use crate::infra::debug::CommandDebugLauncher;
use crate::reporting::ConsoleRunFactory;

pub async fn execute(options: &CliOptions, path: &str, debugger: &str) -> Result<ExitCode> {
    let session = Session::new(
        options,
        Arc::new(ConsoleRunFactory::default()),
        Arc::new(CommandDebugLauncher::new(debugger)),
        false,
    );
    session.load_all().await;

    let item = session.find(path)?;
    session
        .manager
        .run_handler(TestRunRequest::debug(Some(vec![item])), CancellationToken::new())
        .await;
    session.dispose();

    Ok(if session.notifier.error_count() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
