//! # Init Command Module / 初始化命令模块
//!
//! Writes the default configuration file into the first workspace folder.
//! An existing file is only replaced with `--force` or after confirmation
//! on an interactive terminal.
//!
//! 将默认配置文件写入第一个工作区文件夹。
//! 只有在使用 `--force` 或在交互式终端中确认后才会替换已有文件。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::Confirm;
use std::fs;
use std::io::IsTerminal;
use std::process::ExitCode;

use crate::cli::session::CliOptions;
use crate::core::config::{config_path, DEFAULT_CONFIG};
use crate::infra::t;

pub fn execute(options: &CliOptions, force: bool) -> Result<ExitCode> {
    let Some(folder) = options.folders().into_iter().next() else {
        return Ok(ExitCode::FAILURE);
    };
    let output = config_path(&folder.path);

    if output.exists() && !force {
        let overwrite = std::io::stdin().is_terminal()
            && Confirm::new()
                .with_prompt(t!("init.confirm_overwrite", path = output.display()).to_string())
                .default(false)
                .interact()
                .unwrap_or(false);
        if !overwrite {
            println!("{}", t!("init.file_exists", path = output.display()).yellow());
            println!("{}", t!("init.use_force").yellow());
            return Ok(ExitCode::SUCCESS);
        }
    }

    fs::write(&output, DEFAULT_CONFIG)
        .with_context(|| t!("init.write_failed", path = output.display()).to_string())?;

    println!("{}", t!("init.success", path = output.display()).green());
    println!("{}", t!("init.next_steps"));
    Ok(ExitCode::SUCCESS)
}
