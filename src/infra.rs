//! # Infrastructure Module / 基础设施模块
//!
//! Process capture, file system helpers, file watching, logging and the
//! debugger launcher.
//!
//! 进程输出捕获、文件系统辅助、文件监视、日志以及调试器启动器。

pub mod command;
pub mod debug;
pub mod fs;
pub mod logger;
pub mod watch;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
