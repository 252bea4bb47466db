//! # Variable Substitution Module / 变量替换模块
//!
//! Resolves `${...}` tokens in configuration values once, when the
//! configuration is loaded. Supported tokens:
//!
//! | Token                          | Value                                          |
//! |--------------------------------|------------------------------------------------|
//! | `${workspaceFolder}`           | path of the adapter's workspace folder         |
//! | `${workspaceFolderBasename}`   | name of that folder                            |
//! | `${file}`                      | active file                                    |
//! | `${fileWorkspaceFolder}`       | workspace folder containing the active file    |
//! | `${relativeFile}`              | active file relative to that folder            |
//! | `${relativeFileDirname}`       | directory part of `${relativeFile}`            |
//! | `${fileBasename}`              | file name of the active file                   |
//! | `${fileBasenameNoExtension}`   | file name without extension                    |
//! | `${fileExtname}`               | extension including the dot                    |
//! | `${fileDirname}`               | directory of the active file                   |
//! | `${cwd}`                       | current directory of this process              |
//! | `${pathSeparator}`             | platform path separator                        |
//! | `${env:NAME}`                  | environment variable `NAME`                    |
//! | `${command:CMD}`               | trimmed stdout of the shell command `CMD`      |
//!
//! File tokens become empty when there is no active file. Unknown tokens are
//! left untouched, and substituted text is never scanned again.
//!
//! 在加载配置时一次性解析配置值中的 `${...}` 标记。

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::core::error::ConfigError;
use crate::core::models::WorkspaceFolder;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").expect("token regex is valid"));

/// Everything the tokens can refer to.
#[derive(Debug, Clone)]
pub struct VariableContext {
    /// The folder the configuration belongs to.
    pub workspace_folder: WorkspaceFolder,
    /// All folders open in the host.
    pub workspace_folders: Vec<WorkspaceFolder>,
    /// The file currently active in the host, if any.
    pub active_file: Option<PathBuf>,
}

impl VariableContext {
    pub fn new(workspace_folder: WorkspaceFolder) -> Self {
        Self {
            workspace_folders: vec![workspace_folder.clone()],
            workspace_folder,
            active_file: None,
        }
    }

    pub fn with_active_file(mut self, file: Option<PathBuf>) -> Self {
        self.active_file = file;
        self
    }

    pub fn with_workspace_folders(mut self, folders: Vec<WorkspaceFolder>) -> Self {
        if !folders.is_empty() {
            self.workspace_folders = folders;
        }
        self
    }

    /// The folder holding the active file and the file's path relative to it.
    fn file_workspace(&self) -> (&WorkspaceFolder, Option<PathBuf>) {
        let Some(file) = &self.active_file else {
            return (&self.workspace_folder, None);
        };
        for folder in &self.workspace_folders {
            if let Ok(rel) = file.strip_prefix(&folder.path) {
                return (folder, Some(rel.to_path_buf()));
            }
        }
        (&self.workspace_folder, Some(file.clone()))
    }
}

/// Replaces every supported token in `raw`.
pub async fn detokenize(raw: &str, ctx: &VariableContext) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for caps in TOKEN_RE.captures_iter(raw) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&raw[last..whole.start()]);
        match resolve_token(name.as_str(), ctx).await? {
            Some(value) => out.push_str(&value),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&raw[last..]);

    if out.starts_with('~') {
        out = shellexpand::tilde(&out).into_owned();
    }
    Ok(out)
}

/// Convenience wrapper for path values.
pub async fn detokenize_path(raw: &str, ctx: &VariableContext) -> Result<PathBuf, ConfigError> {
    detokenize(raw, ctx).await.map(PathBuf::from)
}

async fn resolve_token(name: &str, ctx: &VariableContext) -> Result<Option<String>, ConfigError> {
    if let Some(var) = name.strip_prefix("env:") {
        return Ok(Some(std::env::var(var).unwrap_or_default()));
    }
    if let Some(command) = name.strip_prefix("command:") {
        return run_command(command, &ctx.workspace_folder.path).await.map(Some);
    }

    let file = ctx.active_file.as_deref();
    let value = match name {
        "workspaceFolder" => display(&ctx.workspace_folder.path),
        "workspaceFolderBasename" => ctx.workspace_folder.name.clone(),
        "cwd" => std::env::current_dir()
            .map(|d| display(&d))
            .unwrap_or_default(),
        "pathSeparator" => std::path::MAIN_SEPARATOR.to_string(),
        "file" => file.map(display).unwrap_or_default(),
        "fileWorkspaceFolder" => match file {
            Some(_) => display(&ctx.file_workspace().0.path),
            None => String::new(),
        },
        "relativeFile" => ctx
            .file_workspace()
            .1
            .map(|rel| display(&rel))
            .unwrap_or_default(),
        "relativeFileDirname" => ctx
            .file_workspace()
            .1
            .and_then(|rel| rel.parent().map(display))
            .unwrap_or_default(),
        "fileBasename" => file
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "fileBasenameNoExtension" => file
            .and_then(Path::file_stem)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "fileExtname" => file
            .and_then(Path::extension)
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default(),
        "fileDirname" => file.and_then(Path::parent).map(display).unwrap_or_default(),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Runs `command` the way a custom test command is run: shell expansion,
/// shell-style splitting, no shell process.
async fn run_command(command: &str, cwd: &Path) -> Result<String, ConfigError> {
    let variable_error = |reason: String| ConfigError::Variable {
        value: format!("${{command:{command}}}"),
        reason,
    };

    let expanded = shellexpand::full(command)
        .map_err(|e| variable_error(e.to_string()))?
        .to_string();
    let parts =
        shlex::split(&expanded).ok_or_else(|| variable_error(format!("cannot parse '{expanded}'")))?;
    let Some((program, args)) = parts.split_first() else {
        return Err(variable_error("empty command".to_string()));
    };

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args).current_dir(cwd).kill_on_drop(true);
    let output = cmd
        .output()
        .await
        .map_err(|e| variable_error(e.to_string()))?;

    if !output.status.success() {
        return Err(variable_error(format!(
            "exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
