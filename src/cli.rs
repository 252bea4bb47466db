//! # CLI Module / 命令行模块
//!
//! A command-line host for the adapter. It plays the part of the IDE: it
//! opens workspace folders, lists the discovered tests, runs or debugs a
//! selection, and watches for changes.
//!
//! 适配器的命令行宿主，扮演 IDE 的角色：打开工作区文件夹、列出发现的测试、
//! 运行或调试所选测试，并监视变化。

pub mod commands;
pub mod session;

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::infra::debug::DEFAULT_DEBUGGER;
use crate::infra::t;
use session::CliOptions;

/// Finds `--lang <VALUE>` (or `--lang=VALUE`) before the full CLI is built,
/// so that help texts come out in the right language.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--lang") {
        return args.get(pos + 1).cloned();
    }
    args.iter()
        .find_map(|arg| arg.strip_prefix("--lang=").map(str::to_string))
}

pub fn build_cli() -> Command {
    Command::new("boost-test-adapter")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about").to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.lang").to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("workspace")
                .short('w')
                .long("workspace")
                .help(t!("cli.workspace").to_string())
                .value_name("DIR")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("file")
                .long("file")
                .help(t!("cli.file").to_string())
                .value_name("FILE")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help(t!("cli.verbose").to_string())
                .global(true)
                .action(ArgAction::Count),
        )
        .subcommand(
            Command::new("list")
                .about(t!("cmd.list_about").to_string())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help(t!("arg.json").to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cmd.run_about").to_string())
                .arg(
                    Arg::new("paths")
                        .help(t!("arg.paths").to_string())
                        .value_name("PATH")
                        .num_args(0..)
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("show-output")
                        .long("show-output")
                        .help(t!("arg.show_output").to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("debug")
                .about(t!("cmd.debug_about").to_string())
                .arg(
                    Arg::new("path")
                        .help(t!("arg.debug_path").to_string())
                        .value_name("PATH")
                        .required(true)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("debugger")
                        .long("debugger")
                        .help(t!("arg.debugger").to_string())
                        .value_name("COMMAND")
                        .default_value(DEFAULT_DEBUGGER)
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(Command::new("watch").about(t!("cmd.watch_about").to_string()))
        .subcommand(
            Command::new("init")
                .about(t!("cmd.init_about").to_string())
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help(t!("arg.force").to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn cli_options(matches: &ArgMatches) -> CliOptions {
    let workspaces: Vec<PathBuf> = matches
        .get_many::<PathBuf>("workspace")
        .map(|dirs| dirs.cloned().collect())
        .unwrap_or_else(|| vec![PathBuf::from(".")]);
    CliOptions {
        workspaces,
        active_file: matches.get_one::<PathBuf>("file").cloned(),
        verbose: matches.get_count("verbose"),
    }
}

/// Parses the command line and runs the chosen command.
pub async fn run() -> Result<ExitCode> {
    crate::init(pre_parse_language().as_deref());

    let matches = build_cli().get_matches();
    let options = cli_options(&matches);
    crate::init_logging(options.verbose);

    match matches.subcommand() {
        Some(("list", sub)) => commands::list::execute(&options, sub.get_flag("json")).await,
        Some(("run", sub)) => {
            let paths: Vec<String> = sub
                .get_many::<String>("paths")
                .map(|p| p.cloned().collect())
                .unwrap_or_default();
            commands::run::execute(&options, &paths, sub.get_flag("show-output")).await
        }
        Some(("debug", sub)) => {
            let path = sub.get_one::<String>("path").cloned().unwrap_or_default();
            let debugger = sub
                .get_one::<String>("debugger")
                .cloned()
                .unwrap_or_else(|| DEFAULT_DEBUGGER.to_string());
            commands::debug::execute(&options, &path, &debugger).await
        }
        Some(("watch", _)) => commands::watch::execute(&options).await,
        Some(("init", sub)) => commands::init::execute(&options, sub.get_flag("force")),
        _ => {
            build_cli().print_help()?;
            Ok(ExitCode::FAILURE)
        }
    }
}
