//! # Boost Test Adapter Library / Boost 测试适配器库
//!
//! Discovers, runs and debugs the tests of Boost.Test executables across the
//! folders of a workspace, reporting into a host's test explorer.
//!
//! 在工作区的各个文件夹中发现、运行和调试 Boost.Test 可执行文件中的测试，
//! 并将结果报告给宿主的测试资源管理器。
//!
//! ## Modules / 模块
//!
//! - `core` - Identities, test items, configuration and the adapter hierarchy
//! - `infra` - Process capture, file watching, logging and debugger launching
//! - `reporting` - Console test run and tree output
//! - `cli` - Command-line host
//!
//! - `core` - 标识、测试项、配置和适配器层次结构
//! - `infra` - 进程捕获、文件监视、日志和调试器启动
//! - `reporting` - 控制台测试运行与树形输出
//! - `cli` - 命令行宿主

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::{AdapterManager, HostServices, WorkspaceAdapter};
pub use core::models;

use tracing_subscriber::EnvFilter;

/// Sets the user interface language.
///
/// `requested` (from `--lang`) wins over the system locale. The full locale
/// (e.g. "zh-CN") is tried first, then the language part, then "en".
pub fn init(requested: Option<&str>) {
    let locale = requested
        .map(str::to_string)
        .or_else(sys_locale::get_locale)
        .unwrap_or_else(|| "en".to_string());
    let available_locales = rust_i18n::available_locales!();

    let lang = if available_locales.contains(&locale.as_str()) {
        locale.as_str()
    } else {
        locale
            .split('-')
            .next()
            .filter(|lang_code| available_locales.contains(lang_code))
            .unwrap_or("en")
    };

    rust_i18n::set_locale(lang);
}

/// Installs the `tracing` subscriber. `RUST_LOG` wins over `verbosity`
/// (0 = warn, 1 = info, 2 = debug, 3+ = trace).
pub fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("boost_test_adapter={default_level}")));
    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
