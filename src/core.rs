//! # Core Module / 核心模块
//!
//! The orchestration core of the adapter: identities, the test item tree,
//! configuration, the Boost.Test protocol, and the three owners
//! (executable controller, workspace adapter, adapter manager).
//!
//! 适配器的编排核心：标识、测试项树、配置、Boost.Test 协议，
//! 以及三层所有者（可执行文件控制器、工作区适配器、适配器管理器）。

pub mod adapter;
pub mod boost;
pub mod config;
pub mod error;
pub mod executable;
pub mod host;
pub mod id;
pub mod item;
pub mod manager;
pub mod models;
pub mod selection;
pub mod variables;

// Re-exports
pub use adapter::{AdapterEvent, AdapterOptions, AdapterStatus, WorkspaceAdapter};
pub use executable::TestExecutable;
pub use manager::{AdapterManager, HostServices};
