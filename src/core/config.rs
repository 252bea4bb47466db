//! # Configuration Module / 配置模块
//!
//! Reads `boost-test-adapter.toml` from a workspace folder and validates it,
//! once, into [`TestConfig`]. Downstream code never re-checks field presence:
//! an executable entry is either a literal path or a glob.
//!
//! Any malformed entry fails the whole file. The adapter then runs with no
//! test executables at all rather than a partial set.
//!
//! 从工作区文件夹读取 `boost-test-adapter.toml` 并将其一次性验证为 [`TestConfig`]。
//! 任何格式错误的条目都会使整个文件失效。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::core::error::ConfigError;
use crate::core::variables::{detokenize, detokenize_path, VariableContext};
use crate::infra::logger::Logger;
use crate::infra::{fs as infra_fs, t};

/// Name of the configuration file at the root of a workspace folder.
pub const CONFIG_FILE_NAME: &str = "boost-test-adapter.toml";

/// Debug configuration name used by the default configuration.
pub const DEFAULT_DEBUG_CONFIG: &str = "Test Config";

/// Glob used by the default configuration.
pub const DEFAULT_GLOB: &str = "**/*{_test,_test.exe}";

/// Written once into workspaces that have C/C++ sources but no configuration.
pub const DEFAULT_CONFIG: &str = r#"# Boost.Test adapter configuration
# Every [[tests]] group lists test executables, either by path or by glob.

[[tests]]
debugConfig = "Test Config"

[[tests.testExecutables]]
glob = "**/*{_test,_test.exe}"

# Debugger command lines, keyed by the name used in `debugConfig`.
[debugConfigurations]
"Test Config" = "gdb -q --args"
"#;

/// Settings shared by a test group and its executables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<RawEnvVar>>,
}

impl RawSettings {
    /// Field-wise override: values set in `self` win over `group`.
    fn merged_over(&self, group: &RawSettings) -> RawSettings {
        RawSettings {
            debug_config: self.debug_config.clone().or_else(|| group.debug_config.clone()),
            cwd: self.cwd.clone().or_else(|| group.cwd.clone()),
            source_prefix: self
                .source_prefix
                .clone()
                .or_else(|| group.source_prefix.clone()),
            env_file: self.env_file.clone().or_else(|| group.env_file.clone()),
            env: match (&group.env, &self.env) {
                (None, None) => None,
                (g, e) => Some(
                    g.iter()
                        .flatten()
                        .chain(e.iter().flatten())
                        .cloned()
                        .collect(),
                ),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawEnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTestExe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub settings: RawSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTestGroup {
    pub test_executables: Vec<RawTestExe>,
    #[serde(flatten)]
    pub settings: RawSettings,
}

/// The file as written by the user.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<RawTestGroup>>,
    /// Debugger command lines by debug configuration name.
    #[serde(default)]
    pub debug_configurations: BTreeMap<String, String>,
}

impl RawConfig {
    /// Whether at least one test group is configured.
    pub fn has_tests(&self) -> bool {
        self.tests.as_ref().is_some_and(|tests| !tests.is_empty())
    }
}

/// Where the binaries of an entry come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestExeSource {
    /// One binary. Relative paths are already resolved against the workspace.
    Path(PathBuf),
    /// Zero or more binaries, matched relative to the workspace folder.
    Glob(String),
}

/// One validated test executable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestExeEntry {
    pub source: TestExeSource,
    pub label: Option<String>,
    pub debug_config: Option<String>,
    /// Command line of the named debug configuration, if it is defined.
    pub debugger_command: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub env_file: Option<PathBuf>,
    pub source_prefix: PathBuf,
}

impl TestExeEntry {
    /// Copy of a glob entry bound to one of the binaries it matched.
    pub fn for_binary(&self, path: PathBuf) -> TestExeEntry {
        TestExeEntry {
            source: TestExeSource::Path(path),
            ..self.clone()
        }
    }

    /// The literal binary path, if this entry has one.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            TestExeSource::Path(p) => Some(p),
            TestExeSource::Glob(_) => None,
        }
    }
}

/// The validated configuration of one workspace folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestConfig {
    pub entries: Vec<TestExeEntry>,
}

impl TestConfig {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Path of the configuration file of `workspace`.
pub fn config_path(workspace: &Path) -> PathBuf {
    workspace.join(CONFIG_FILE_NAME)
}

/// Reads and validates the configuration of the context's workspace folder.
///
/// A missing file or an empty `tests` list yields an empty configuration.
pub async fn load_config(ctx: &VariableContext, log: &Logger) -> Result<TestConfig, ConfigError> {
    let path = config_path(&ctx.workspace_folder.path);
    let Some(raw) = read_raw_config(&path).await? else {
        log.warn(t!("config.not_found", path = path.display()));
        return Ok(TestConfig::default());
    };
    if !raw.has_tests() {
        log.info(t!("config.empty", path = path.display()));
        return Ok(TestConfig::default());
    }
    resolve_config(&raw, ctx).await
}

/// Reads and parses the file at `path`; `None` when it does not exist.
async fn read_raw_config(path: &Path) -> Result<Option<RawConfig>, ConfigError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Validates `raw` and substitutes variables in every path-like field.
pub async fn resolve_config(raw: &RawConfig, ctx: &VariableContext) -> Result<TestConfig, ConfigError> {
    let workspace = &ctx.workspace_folder.path;
    let mut entries = Vec::new();

    for (group_index, group) in raw.tests.iter().flatten().enumerate() {
        for (exe_index, exe) in group.test_executables.iter().enumerate() {
            let source = match (&exe.glob, &exe.path) {
                (Some(glob), _) => {
                    infra_fs::compile_glob(glob)?;
                    TestExeSource::Glob(glob.clone())
                }
                (None, Some(path)) => {
                    let path = detokenize_path(path, ctx).await?;
                    TestExeSource::Path(absolutize(workspace, path))
                }
                (None, None) => {
                    return Err(ConfigError::MissingSource {
                        group: group_index,
                        index: exe_index,
                    });
                }
            };

            let settings = exe.settings.merged_over(&group.settings);

            let cwd = match &settings.cwd {
                Some(cwd) => Some(absolutize(workspace, detokenize_path(cwd, ctx).await?)),
                None => None,
            };
            let source_prefix = match &settings.source_prefix {
                Some(prefix) => absolutize(workspace, detokenize_path(prefix, ctx).await?),
                None => workspace.clone(),
            };
            let env_file = match &settings.env_file {
                Some(file) => Some(absolutize(workspace, detokenize_path(file, ctx).await?)),
                None => None,
            };
            let mut env = BTreeMap::new();
            for var in settings.env.iter().flatten() {
                env.insert(var.name.clone(), detokenize(&var.value, ctx).await?);
            }
            let debugger_command = settings
                .debug_config
                .as_ref()
                .and_then(|name| raw.debug_configurations.get(name).cloned());

            entries.push(TestExeEntry {
                source,
                label: exe.label.clone(),
                debug_config: settings.debug_config.clone(),
                debugger_command,
                cwd,
                env,
                env_file,
                source_prefix,
            });
        }
    }

    Ok(TestConfig { entries })
}

fn absolutize(workspace: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        workspace.join(path)
    }
}

/// Writes [`DEFAULT_CONFIG`] into `workspace` when it contains C/C++ sources
/// and its configuration file is missing or holds nothing: no tests and no
/// debug configurations. A file that does not parse is left alone. Returns
/// whether the file was written.
pub async fn create_default_config(workspace: &Path, log: &Logger) -> Result<bool, ConfigError> {
    let path = config_path(workspace);
    let replaceable = match read_raw_config(&path).await {
        Ok(None) => true,
        Ok(Some(raw)) => !raw.has_tests() && raw.debug_configurations.is_empty(),
        Err(_) => false,
    };
    if !replaceable || !infra_fs::contains_sources_in_background(workspace.to_path_buf()).await {
        return Ok(false);
    }
    log.info(t!("config.writing_default", path = path.display()));
    fs::write(&path, DEFAULT_CONFIG)
        .await
        .map_err(|source| ConfigError::Write { path, source })?;
    Ok(true)
}
