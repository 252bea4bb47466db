//! # Reporting Module / 报告模块
//!
//! Console output for test runs and test trees.
//!
//! 测试运行和测试树的控制台输出。

pub mod console;

pub use console::{print_tree, ConsoleRunFactory, ConsoleTestRun, RunSummary};
