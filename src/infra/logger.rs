//! # Logging Module / 日志模块
//!
//! The single channel for everything the adapter reports. Messages are
//! emitted as `tracing` events; user-facing errors are also pushed to a
//! [`Notifier`], which in the CLI prints them in red.
//!
//! Severities: informational, warning, error (optionally user-facing) and
//! bug, the latter marking an internal invariant violation.
//!
//! 适配器报告所有内容的唯一通道。消息以 `tracing` 事件发出；
//! 面向用户的错误还会推送到 [`Notifier`]。

use colored::*;
use std::fmt::Display;
use std::sync::Arc;

/// Receives errors that must be shown to the user.
pub trait Notifier: Send + Sync {
    fn show_error(&self, message: &str);
}

/// Prints user-facing errors to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show_error(&self, message: &str) {
        eprintln!("{}", message.red().bold());
    }
}

#[derive(Clone)]
pub struct Logger {
    notifier: Arc<dyn Notifier>,
    scope: Arc<str>,
}

impl Logger {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            scope: Arc::from(""),
        }
    }

    pub fn console() -> Self {
        Self::new(Arc::new(ConsoleNotifier))
    }

    /// Same sink, with `scope` attached to every event (e.g. the workspace).
    pub fn scoped(&self, scope: impl Display) -> Self {
        Self {
            notifier: Arc::clone(&self.notifier),
            scope: Arc::from(scope.to_string()),
        }
    }

    pub fn info(&self, message: impl Display) {
        tracing::info!(scope = %self.scope, "{message}");
    }

    pub fn warn(&self, message: impl Display) {
        tracing::warn!(scope = %self.scope, "{message}");
    }

    pub fn debug(&self, message: impl Display) {
        tracing::debug!(scope = %self.scope, "{message}");
    }

    pub fn error(&self, message: impl Display, show_to_user: bool) {
        let message = message.to_string();
        tracing::error!(scope = %self.scope, "{message}");
        if show_to_user {
            self.notifier.show_error(&message);
        }
    }

    /// An internal invariant was violated. Never shown as a user error.
    pub fn bug(&self, message: impl Display) {
        tracing::error!(target: "boost_test_adapter::bug", scope = %self.scope, "[BUG] {message}");
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("scope", &self.scope).finish_non_exhaustive()
    }
}
