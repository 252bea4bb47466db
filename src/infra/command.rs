//! # Command Execution Module / 命令执行模块
//!
//! Spawns a test binary, captures stdout and stderr separately, and kills the
//! process when its cancellation token fires.
//!
//! 启动测试二进制文件，分别捕获 stdout 和 stderr，并在取消令牌触发时终止进程。

use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything a finished (or killed) process left behind.
#[derive(Debug)]
pub struct CapturedOutput {
    /// Exit status, or the error that prevented waiting on the process.
    pub status: std::io::Result<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    /// `true` if the process was killed because the token was cancelled.
    pub was_cancelled: bool,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        matches!(&self.status, Ok(status) if status.success())
    }

    /// Human readable exit status, for messages.
    pub fn status_string(&self) -> String {
        match &self.status {
            Ok(status) => status.to_string(),
            Err(e) => e.to_string(),
        }
    }

    /// stdout followed by stderr, for output panes.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

fn read_all<R>(stream: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            // A read error only truncates the captured text.
            let _ = stream.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Spawns `cmd` and waits for it, reading both output streams concurrently.
///
/// If `stop_token` is cancelled first the process is killed and
/// `was_cancelled` is set. A spawn failure is returned as `Err` so callers can
/// tell "could not start" apart from "ran and failed".
pub async fn spawn_and_capture(
    mut cmd: tokio::process::Command,
    stop_token: Option<CancellationToken>,
) -> std::io::Result<CapturedOutput> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout_handle = read_all(child.stdout.take());
    let stderr_handle = read_all(child.stderr.take());

    let token = stop_token.unwrap_or_default();
    let mut was_cancelled = false;
    let status = tokio::select! {
        status = child.wait() => status,
        _ = token.cancelled() => {
            was_cancelled = true;
            // The process may have exited on its own in the meantime.
            let _ = child.start_kill();
            child.wait().await
        }
    };

    let stdout = stdout_handle.await.unwrap_or_default();
    let stderr = stderr_handle.await.unwrap_or_default();

    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
        was_cancelled,
    })
}
