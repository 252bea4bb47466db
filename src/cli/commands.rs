//! # Commands Module / 命令模块
//!
//! One module per subcommand.
//!
//! 每个子命令一个模块。

pub mod debug;
pub mod init;
pub mod list;
pub mod run;
pub mod watch;
