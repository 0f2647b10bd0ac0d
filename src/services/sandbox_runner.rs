//! Spawns an external process attached to a pseudo-terminal inside an
//! isolated workspace, streams its output into the `OverlayBroker`,
//! enforces resource caps, and returns a structured outcome.
//!
//! The PTY plumbing is grounded in the `portable-pty`/`native_pty_system`
//! pattern used by the pack's terminal-harness code: open a pty pair, spawn
//! the child on the slave side, read the master side on a blocking OS
//! thread (the crate is not `Send`-friendly across an async read loop), and
//! funnel chunks back through an mpsc channel into async code.

use crate::domain::models::{MetaRecord, PolicyProfile, Stream};
use crate::services::overlay_broker::OverlayBroker;
use crate::services::policy_guard::{PolicyError, PolicyGuard};
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to open pty: {0}")]
    PtyOpen(String),
    #[error("failed to spawn command: {0}")]
    Spawn(String),
    #[error("policy check failed: {0}")]
    PolicyCheckFailed(#[from] PolicyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Normal,
    Timeout,
    KilledOverRss,
    OutputCapExceeded,
    Cancelled,
    Crashed,
    PolicyBlocked,
}

/// Reads `VmRSS` out of `/proc/<pid>/status`; returns `None` off Linux or
/// if the process has already exited.
#[cfg(target_os = "linux")]
fn sample_rss_bytes(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn sample_rss_bytes(_pid: u32) -> Option<u64> {
    None
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub exit_code: Option<i32>,
    pub signaled: bool,
    pub duration: Duration,
    pub max_rss: Option<u64>,
    pub output_bytes: u64,
    pub truncated: bool,
    pub exit_reason: ExitReason,
}

impl Outcome {
    pub fn policy_blocked() -> Self {
        Self {
            exit_code: None,
            signaled: false,
            duration: Duration::ZERO,
            max_rss: None,
            output_bytes: 0,
            truncated: false,
            exit_reason: ExitReason::PolicyBlocked,
        }
    }
}

/// Resource caps for one sandbox tier: low/medium/high advisory isolation
/// strength.
#[derive(Debug, Clone, Copy)]
pub struct ResourceCaps {
    pub wall_time: Duration,
    pub max_rss_bytes: u64,
    pub max_output_bytes: u64,
}

impl ResourceCaps {
    pub fn for_tier(tier: crate::domain::models::SandboxTier) -> Self {
        use crate::domain::models::SandboxTier::*;
        match tier {
            Low => Self { wall_time: Duration::from_secs(60), max_rss_bytes: 512 * 1024 * 1024, max_output_bytes: 8 * 1024 * 1024 },
            Medium => Self { wall_time: Duration::from_secs(300), max_rss_bytes: 1024 * 1024 * 1024, max_output_bytes: 32 * 1024 * 1024 },
            High => Self { wall_time: Duration::from_secs(900), max_rss_bytes: 2048 * 1024 * 1024, max_output_bytes: 128 * 1024 * 1024 },
        }
    }
}

const CHUNK_SIZE: usize = 8 * 1024;
const RSS_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Handle to a running sandboxed process; `wait` blocks the caller until
/// the process exits, is cancelled, or a resource cap trips.
pub struct RunHandle {
    cancel_tx: Option<oneshot::Sender<Duration>>,
    result_rx: oneshot::Receiver<Outcome>,
}

impl RunHandle {
    pub async fn wait(mut self, timeout: Duration) -> Outcome {
        match tokio::time::timeout(timeout, &mut self.result_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Outcome {
                exit_code: None,
                signaled: false,
                duration: timeout,
                max_rss: None,
                output_bytes: 0,
                truncated: false,
                exit_reason: ExitReason::Crashed,
            },
            Err(_) => Outcome {
                exit_code: None,
                signaled: false,
                duration: timeout,
                max_rss: None,
                output_bytes: 0,
                truncated: true,
                exit_reason: ExitReason::Timeout,
            },
        }
    }

    /// Sends a soft-stop request; the run loop waits `grace` then forces
    /// termination if the child hasn't exited.
    pub fn cancel(&mut self, grace: Duration) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(grace);
        }
    }
}

pub struct SandboxRunner {
    overlay: Arc<OverlayBroker>,
}

impl SandboxRunner {
    pub fn new(overlay: Arc<OverlayBroker>) -> Self {
        Self { overlay }
    }

    /// Spawns `argv` with a PTY inside `workspace_root`, after confirming
    /// `policy.check_command` allows it on `profile`. A denial never opens
    /// a pty or touches the filesystem; it resolves the returned handle
    /// immediately with `Outcome::policy_blocked()`. `env` is the
    /// already-filtered allow-listed environment; stdin, if provided, is
    /// written then the write side is dropped so the child observes EOF.
    pub async fn run(
        &self,
        task_id: &str,
        workspace_root: &std::path::Path,
        argv: &[String],
        env: &[(String, String)],
        stdin_script: Option<Vec<u8>>,
        caps: ResourceCaps,
        policy: &PolicyGuard,
        profile: &PolicyProfile,
    ) -> Result<RunHandle, SandboxError> {
        let decision = policy.check_command(task_id, profile, argv).await?;
        if !decision.is_allowed() {
            let (result_tx, result_rx) = oneshot::channel();
            let _ = result_tx.send(Outcome::policy_blocked());
            return Ok(RunHandle { cancel_tx: None, result_rx });
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: 40, cols: 120, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| SandboxError::PtyOpen(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd.cwd(workspace_root);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SandboxError::Spawn(e.to_string()))?;
        drop(pair.slave);

        let mut writer = pair.master.take_writer().map_err(|e| SandboxError::PtyOpen(e.to_string()))?;
        if let Some(script) = stdin_script {
            use std::io::Write;
            let _ = writer.write_all(&script);
        }
        drop(writer);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SandboxError::PtyOpen(e.to_string()))?;

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<Vec<u8>>(256);
        std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = [0u8; CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if chunk_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<Duration>();
        let (result_tx, result_rx) = oneshot::channel::<Outcome>();

        let overlay = self.overlay.clone();
        let task_id = task_id.to_string();
        overlay
            .publish_meta(&task_id, &MetaRecord::ProcessStart { argv: argv.to_vec() })
            .await;

        let pid = child.process_id();

        tokio::spawn(async move {
            let start = Instant::now();
            let mut output_bytes = 0u64;
            let mut truncated = false;
            let mut exit_reason = ExitReason::Normal;
            let mut max_rss_seen: Option<u64> = None;
            let mut rss_interval = tokio::time::interval(RSS_POLL_INTERVAL);

            loop {
                tokio::select! {
                    maybe_chunk = chunk_rx.recv() => {
                        match maybe_chunk {
                            Some(chunk) => {
                                output_bytes += chunk.len() as u64;
                                if output_bytes > caps.max_output_bytes {
                                    truncated = true;
                                    exit_reason = ExitReason::OutputCapExceeded;
                                    let _ = child.kill();
                                    break;
                                }
                                overlay.publish_chunk(&task_id, Stream::Stdout, chunk).await;
                            }
                            None => break,
                        }
                    }
                    _ = rss_interval.tick() => {
                        if let Some(pid) = pid {
                            if let Some(rss) = sample_rss_bytes(pid) {
                                max_rss_seen = Some(max_rss_seen.map_or(rss, |prev| prev.max(rss)));
                                if rss > caps.max_rss_bytes {
                                    exit_reason = ExitReason::KilledOverRss;
                                    let _ = child.kill();
                                    break;
                                }
                            }
                        }
                    }
                    _ = tokio::time::sleep(caps.wall_time), if exit_reason == ExitReason::Normal => {
                        exit_reason = ExitReason::Timeout;
                        let _ = child.kill();
                        break;
                    }
                    grace = &mut cancel_rx => {
                        if let Ok(grace) = grace {
                            exit_reason = ExitReason::Cancelled;
                            tokio::time::sleep(grace).await;
                            let _ = child.kill();
                        }
                        break;
                    }
                }
            }

            let exit_status = child.wait().ok();
            let exit_code = exit_status.as_ref().and_then(|s| s.exit_code().try_into().ok());
            overlay
                .publish_meta(&task_id, &MetaRecord::ProcessExit { exit_code })
                .await;

            let outcome = Outcome {
                exit_code,
                signaled: exit_code.is_none(),
                duration: start.elapsed(),
                max_rss: max_rss_seen,
                output_bytes,
                truncated,
                exit_reason,
            };
            let _ = result_tx.send(outcome);
        });

        Ok(RunHandle {
            cancel_tx: Some(cancel_tx),
            result_rx,
        })
    }
}
