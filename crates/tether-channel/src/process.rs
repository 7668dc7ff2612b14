//! Helper process lifecycle.
//!
//! One task owns the child process: it spawns the helper, streams stdout
//! to the supervisor in raw chunks, mirrors stderr into the log, and
//! reaps the child on exit or cancellation. With `retry` set the task
//! respawns the helper after a short backoff until cancelled.
//!
//! Stdout is forwarded as chunks rather than lines so multi-line blocks
//! written in a single `write` (key announcements in particular) arrive
//! in one piece.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tether_core::Environment;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;
use crate::hooks::{ErrorHook, ExitHook};

const RESPAWN_BACKOFF: Duration = Duration::from_millis(500);
const STDOUT_CHUNK: usize = 4096;

/// What to launch and whether to relaunch it.
#[derive(Debug, Clone)]
pub(crate) struct HelperSpec {
    pub bin: PathBuf,
    pub args: Vec<String>,
    pub retry: bool,
}

/// Runs the helper until it exits for good or the cycle is cancelled.
///
/// `exit` fires after every helper exit with `None` for a clean exit and
/// the exit failure otherwise. `fatal` fires when the helper cannot be
/// spawned at all, which ends the task immediately.
pub(crate) async fn run_helper<E: Environment>(
    env: E,
    spec: HelperSpec,
    stdout: mpsc::Sender<String>,
    exit: ExitHook,
    fatal: ErrorHook,
    cancel: CancellationToken,
) {
    loop {
        let mut command = Command::new(&spec.bin);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                tracing::error!(bin = %spec.bin.display(), %error, "failed to spawn helper");
                (fatal)(ChannelError::Spawn { reason: error.to_string() });
                return;
            }
        };
        tracing::info!(bin = %spec.bin.display(), pid = child.id(), "helper spawned");

        let Some(child_stdout) = child.stdout.take() else {
            (fatal)(ChannelError::Spawn { reason: "helper stdout not captured".to_string() });
            return;
        };
        let Some(child_stderr) = child.stderr.take() else {
            (fatal)(ChannelError::Spawn { reason: "helper stderr not captured".to_string() });
            return;
        };
        tokio::spawn(forward_stderr(child_stderr));
        let stdout_task = tokio::spawn(forward_stdout(child_stdout, stdout.clone()));

        let status = tokio::select! {
            () = cancel.cancelled() => {
                if let Err(error) = child.kill().await {
                    tracing::warn!(%error, "failed to kill helper");
                }
                let _ = child.wait().await;
                stdout_task.abort();
                return;
            }
            status = child.wait() => status,
        };
        // Let buffered stdout drain before announcing the exit.
        let _ = stdout_task.await;

        match status {
            Ok(status) => {
                tracing::info!(%status, "helper exited");
                let notice = if status.success() {
                    None
                } else {
                    Some(ChannelError::HelperExit { status: status.code() })
                };
                (exit)(notice);
            }
            Err(error) => {
                tracing::warn!(%error, "failed to reap helper");
                (exit)(Some(ChannelError::Spawn { reason: error.to_string() }));
            }
        }

        if !spec.retry || cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = env.sleep(RESPAWN_BACKOFF) => {}
        }
    }
}

async fn forward_stdout(stdout: ChildStdout, tx: mpsc::Sender<String>) {
    let mut stdout = stdout;
    let mut buf = vec![0u8; STDOUT_CHUNK];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            Err(error) => {
                tracing::debug!(%error, "helper stdout read failed");
                return;
            }
        }
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::warn!(%line, "helper stderr"),
            Ok(None) | Err(_) => return,
        }
    }
}
