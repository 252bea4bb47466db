//! Debug sessions through an external debugger command such as `gdb --args`.

use async_trait::async_trait;
use std::process::Stdio;

use crate::core::error::DebugError;
use crate::core::host::{DebugLauncher, DebugSession};
use crate::infra::t;

/// Default debugger command line when neither the entry nor the CLI names one.
pub const DEFAULT_DEBUGGER: &str = "gdb --args";

/// Runs `<debugger...> <program> <args...>` with the terminal attached.
#[derive(Debug, Clone)]
pub struct CommandDebugLauncher {
    default_command: String,
}

impl CommandDebugLauncher {
    pub fn new(default_command: impl Into<String>) -> Self {
        Self {
            default_command: default_command.into(),
        }
    }

    /// The full argv for `session`.
    pub fn command_line(&self, session: &DebugSession) -> Result<Vec<String>, DebugError> {
        let debugger = session
            .debugger_command
            .as_deref()
            .unwrap_or(&self.default_command);
        let expanded = shellexpand::full(debugger)
            .map_err(|_| DebugError::InvalidCommand(debugger.to_string()))?;
        let mut argv = shlex::split(&expanded)
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| DebugError::InvalidCommand(debugger.to_string()))?;
        argv.push(session.program.to_string_lossy().into_owned());
        argv.extend(session.args.iter().cloned());
        Ok(argv)
    }
}

impl Default for CommandDebugLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_DEBUGGER)
    }
}

#[async_trait]
impl DebugLauncher for CommandDebugLauncher {
    async fn launch(&self, session: DebugSession) -> Result<(), DebugError> {
        let argv = self.command_line(&session)?;
        let Some((program, args)) = argv.split_first() else {
            return Err(DebugError::InvalidCommand(String::new()));
        };

        tracing::info!(
            "{}",
            t!("debug.launching", command = shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_default())
        );

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .current_dir(&session.cwd)
            .envs(&session.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let status = cmd
            .status()
            .await
            .map_err(|source| DebugError::Launch {
                program: program.clone(),
                source,
            })?;
        tracing::info!("{}", t!("debug.finished", status = status));
        Ok(())
    }
}
