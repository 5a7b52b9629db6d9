//! `rollcall start`: run the recognition daemon and relay its status lines.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::time::Instant;

/// How long the daemon gets to exit after a stop request before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Tallies of the status lines seen during one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayCounts {
    pub marked: u64,
    pub already_marked: u64,
    pub unknown: u64,
    pub camera_lost: u64,
    pub errors: u64,
}

impl RelayCounts {
    pub fn observe(&mut self, line: &str) {
        if line.starts_with("Marked: ") {
            self.marked += 1;
        } else if line.starts_with("Already marked: ") {
            self.already_marked += 1;
        } else if line == "Unknown face seen" {
            self.unknown += 1;
        } else if line.starts_with("Camera lost") {
            self.camera_lost += 1;
        } else if line.starts_with("Storage error: ") || line.starts_with("Rejected: ") {
            self.errors += 1;
        }
    }

    /// Closing line printed when the daemon exits.
    pub fn summary_line(&self) -> String {
        format!(
            "Session ended: {} marked, {} already marked, {} unknown sightings, {} camera drops, {} errors",
            self.marked, self.already_marked, self.unknown, self.camera_lost, self.errors
        )
    }
}

/// Resolve the daemon binary: `ROLLCALL_DAEMON`, then a `rollcalld` next
/// to this executable, then `rollcalld` on `PATH`.
pub fn locate_daemon() -> PathBuf {
    if let Ok(path) = std::env::var("ROLLCALL_DAEMON") {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("rollcalld")))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from("rollcalld"))
}

/// Spawn the daemon and echo its status lines until it exits.
///
/// Ctrl-C writes `stop` to the daemon's stdin; if it is still running
/// after [`STOP_GRACE`] it is killed.
pub async fn run(daemon: &Path) -> Result<RelayCounts> {
    relay(Command::new(daemon))
        .await
        .with_context(|| format!("rollcall daemon {} failed", daemon.display()))
}

async fn relay(mut command: Command) -> Result<RelayCounts> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn")?;
    tracing::info!(pid = ?child.id(), "daemon started");

    let stdout = child.stdout.take().context("daemon stdout not captured")?;
    let mut stdin = child.stdin.take();
    let mut lines = BufReader::new(stdout).lines();

    let mut counts = RelayCounts::default();
    let mut kill_at: Option<Instant> = None;
    let mut killed = false;

    loop {
        let deadline = kill_at.unwrap_or_else(Instant::now);
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    counts.observe(&line);
                    println!("{line}");
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if kill_at.is_none() => {
                eprintln!("Stopping...");
                request_stop(&mut stdin).await;
                kill_at = Some(Instant::now() + STOP_GRACE);
            }
            _ = tokio::time::sleep_until(deadline), if kill_at.is_some() && !killed => {
                tracing::warn!("daemon did not stop in time; killing it");
                child.start_kill().context("failed to kill daemon")?;
                killed = true;
            }
        }
    }

    let status = child.wait().await.context("failed to wait for daemon")?;
    if !status.success() && !killed {
        anyhow::bail!("exited with {status}");
    }
    Ok(counts)
}

async fn request_stop(stdin: &mut Option<ChildStdin>) {
    let Some(pipe) = stdin.as_mut() else { return };
    if let Err(e) = pipe.write_all(b"stop\n").await {
        tracing::debug!(error = %e, "daemon stdin closed");
    }
    let _ = pipe.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_status_lines() {
        let mut counts = RelayCounts::default();
        for line in [
            "Camera started",
            "Marked: ada (Present)",
            "Already marked: alan",
            "Unknown face seen",
            "Unknown face seen",
            "Camera lost, reconnecting...",
            "Storage error: database is locked",
            "Marked: grace (Late)",
            "Stopped: recognized=2 unknown=2",
        ] {
            counts.observe(line);
        }
        assert_eq!(
            counts,
            RelayCounts {
                marked: 2,
                already_marked: 1,
                unknown: 2,
                camera_lost: 1,
                errors: 1,
            }
        );
        assert_eq!(
            counts.summary_line(),
            "Session ended: 2 marked, 1 already marked, 2 unknown sightings, 1 camera drops, 1 errors"
        );
    }

    #[tokio::test]
    async fn test_relays_child_output() {
        let mut command = Command::new("sh");
        command.arg("-c").arg(
            "echo 'Camera started'; echo 'Marked: ada (Present)'; echo 'Unknown face seen'",
        );
        let counts = relay(command).await.unwrap();
        assert_eq!(counts.marked, 1);
        assert_eq!(counts.unknown, 1);
    }

    #[tokio::test]
    async fn test_failed_exit_is_an_error() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("echo 'Waiting for camera...'; exit 3");
        assert!(relay(command).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_daemon_is_an_error() {
        assert!(run(Path::new("/nonexistent/rollcalld")).await.is_err());
    }
}
