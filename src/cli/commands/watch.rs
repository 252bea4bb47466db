//! # Watch Command Module / 监视命令模块
//!
//! Loads the workspace and reprints the test tree whenever an adapter
//! reloads or re-resolves an executable, until Ctrl-C.
//!
//! 加载工作区，并在适配器重新加载或重新解析可执行文件时重新打印测试树，直到按下 Ctrl-C。

use anyhow::Result;
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;

use crate::cli::session::{CliOptions, Session};
use crate::infra::debug::CommandDebugLauncher;
use crate::infra::t;
use crate::reporting::{print_tree, ConsoleRunFactory};

pub async fn execute(options: &CliOptions) -> Result<ExitCode> {
    let session = Session::new(
        options,
        Arc::new(ConsoleRunFactory::default()),
        Arc::new(CommandDebugLauncher::default()),
        true,
    );
    session.load_all().await;
    print_all(&session);

    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    for adapter in session.manager.adapters() {
        let mut changes = adapter.subscribe();
        let tx = tx.clone();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    println!("{}", t!("watch.started").cyan());
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            changed = rx.recv() => {
                if changed.is_none() {
                    break;
                }
                // Newly listed executables have not been resolved yet.
                session.load_unresolved().await;
                while rx.try_recv().is_ok() {}
                println!("\n{}", t!("watch.reloaded").cyan());
                print_all(&session);
            }
        }
    }

    println!("{}", t!("watch.stopping").yellow());
    session.dispose();
    Ok(ExitCode::SUCCESS)
}

fn print_all(session: &Session) {
    for root in session.manager.items().all() {
        print_tree(&root, 0);
    }
}
