//! Process host: the seam between the supervisor and the actual site
//! generator process.
//!
//! The supervisor never spawns or signals processes itself; it drives a
//! [`ProcessHost`]. The production implementation here, [`CommandHost`], runs
//! a configured shell command per site (the build-and-serve process), forwards
//! its output as `server-log` events, and stops it with SIGTERM then SIGKILL.
//! Tests substitute their own hosts to simulate slow, flaky, or hung servers.

use crate::error::{Error, Result};
use crate::events::{EventBus, LogLevel, ServerEvent};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Interval between readiness probes while a server is coming up.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Handle to a started server process.
///
/// Carries the `tokio` child handle when the process was spawned by this
/// supervisor, or just a PID when reattached/simulated. Mock hosts in tests
/// construct handles via [`ProcessHandle::detached`] or
/// [`ProcessHandle::external`].
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    child: Option<Child>,
}

impl ProcessHandle {
    /// Wrap a freshly spawned child process.
    pub fn from_child(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
        }
    }

    /// Handle for a process known only by PID (no child handle held).
    pub fn detached(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            child: None,
        }
    }

    /// Handle for a server with no observable OS process (used by test hosts).
    pub fn external() -> Self {
        Self {
            pid: None,
            child: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take ownership of the child handle, leaving the PID in place.
    pub fn take_child(&mut self) -> Option<Child> {
        self.child.take()
    }
}

/// Collaborator that launches and terminates the underlying server process.
///
/// `start` must resolve only once the server is accepting connections on
/// `port` (or fail); the supervisor wraps it in its retry and timeout guards.
/// `stop` consumes the handle; implementations must make a best effort to
/// terminate the process even if graceful shutdown fails.
#[async_trait]
pub trait ProcessHost: Send + Sync {
    async fn start(&self, name: &str, root: &Path, port: u16) -> Result<ProcessHandle>;

    async fn stop(&self, name: &str, handle: ProcessHandle) -> Result<()>;
}

/// Check whether a PID refers to a live process.
#[cfg(unix)]
pub fn is_pid_alive(pid: u32) -> bool {
    let Some(pid) = checked_pid(pid) else {
        return false;
    };
    nix::sys::signal::kill(pid, None).is_ok()
}

#[cfg(not(unix))]
pub fn is_pid_alive(_pid: u32) -> bool {
    false
}

/// Convert a u32 PID for signal operations, rejecting 0, 1, and overflow.
#[cfg(unix)]
fn checked_pid(pid: u32) -> Option<nix::unistd::Pid> {
    if pid <= 1 || pid > i32::MAX as u32 {
        return None;
    }
    Some(nix::unistd::Pid::from_raw(pid as i32))
}

/// Production host that runs one shell command per site.
///
/// The command is executed with `bash -c` in the site root, in its own
/// process group, with `SITEHERD_SITE`, `SITEHERD_ROOT`, and `PORT` in the
/// environment. Stdout and stderr lines are forwarded as
/// [`ServerEvent::Log`] events (stderr at warn level).
pub struct CommandHost {
    command: String,
    grace_period: Duration,
    events: EventBus,
}

impl CommandHost {
    pub fn new(command: String, grace_period: Duration, events: EventBus) -> Self {
        Self {
            command,
            grace_period,
            events,
        }
    }

    fn spawn(&self, name: &str, root: &Path, port: u16) -> Result<Child> {
        let mut cmd = Command::new("/bin/bash");
        // `exec` replaces the shell so signals reach the server directly.
        // The command string comes from siteherd.yaml, which is the trust
        // boundary; it is intentionally not shell-escaped.
        cmd.arg("-c")
            .arg(format!("exec {}", self.command))
            .current_dir(root)
            .env("SITEHERD_SITE", name)
            .env("SITEHERD_ROOT", root)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn().map_err(|e| {
            Error::Process(format!(
                "Failed to spawn server command for '{}': {}",
                name, e
            ))
        })
    }

    fn forward_output(&self, name: &str, child: &mut Child) {
        if let Some(stdout) = child.stdout.take() {
            let bus = self.events.clone();
            let server = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    bus.publish(ServerEvent::Log {
                        name: server.clone(),
                        message: line,
                        level: LogLevel::Info,
                    });
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let bus = self.events.clone();
            let server = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    bus.publish(ServerEvent::Log {
                        name: server.clone(),
                        message: line,
                        level: LogLevel::Warn,
                    });
                }
            });
        }
    }

    /// Wait until the server accepts connections on its port.
    ///
    /// Loops forever between connect probes; the supervisor's timeout guard
    /// bounds the wait. Resolves early with `StartFailed` if the child exits
    /// before ever becoming ready.
    async fn wait_ready(&self, name: &str, port: u16, child: &mut Child) -> Result<()> {
        loop {
            if let Some(status) = child.try_wait().map_err(Error::Io)? {
                return Err(Error::StartFailed(
                    name.to_string(),
                    format!("process exited before becoming ready ({})", status),
                ));
            }

            if tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .is_ok()
            {
                return Ok(());
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    #[cfg(unix)]
    async fn stop_child(&self, name: &str, mut child: Child) -> Result<()> {
        use nix::sys::signal::{self, killpg, Signal};

        let Some(raw_pid) = child.id() else {
            // Already reaped.
            return Ok(());
        };
        let pid = checked_pid(raw_pid).ok_or_else(|| {
            Error::Process(format!("Server '{}' has unusable PID {}", name, raw_pid))
        })?;

        // SIGTERM the whole process group, falling back to the single process.
        let signalled =
            killpg(pid, Signal::SIGTERM).or_else(|_| signal::kill(pid, Signal::SIGTERM));
        if signalled.is_err() {
            // Process already gone; reap and move on.
            let _ = child.wait().await;
            return Ok(());
        }

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(Ok(_)) => {
                tracing::debug!("Server process for '{}' exited gracefully", name);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = killpg(pid, Signal::SIGKILL).or_else(|_| signal::kill(pid, Signal::SIGKILL));
                let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
                Err(Error::StopFailed(
                    name.to_string(),
                    format!("error waiting for exit: {}", e),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    "Server '{}' did not exit within {:?} after SIGTERM, sending SIGKILL",
                    name,
                    self.grace_period
                );
                let _ = killpg(pid, Signal::SIGKILL).or_else(|_| signal::kill(pid, Signal::SIGKILL));
                let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
                Ok(())
            }
        }
    }

    #[cfg(not(unix))]
    async fn stop_child(&self, name: &str, mut child: Child) -> Result<()> {
        child
            .kill()
            .await
            .map_err(|e| Error::StopFailed(name.to_string(), e.to_string()))?;
        let _ = child.wait().await;
        Ok(())
    }

    #[cfg(unix)]
    async fn stop_detached(&self, name: &str, raw_pid: u32) -> Result<()> {
        use nix::sys::signal::{self, Signal};

        let Some(pid) = checked_pid(raw_pid) else {
            return Ok(());
        };
        if signal::kill(pid, Signal::SIGTERM).is_err() {
            // Not running anymore.
            return Ok(());
        }

        tokio::time::sleep(self.grace_period).await;
        if signal::kill(pid, None).is_ok() {
            tracing::warn!(
                "Detached server '{}' (PID {}) survived SIGTERM, sending SIGKILL",
                name,
                raw_pid
            );
            let _ = signal::kill(pid, Signal::SIGKILL);
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn stop_detached(&self, _name: &str, _raw_pid: u32) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ProcessHost for CommandHost {
    async fn start(&self, name: &str, root: &Path, port: u16) -> Result<ProcessHandle> {
        let root: PathBuf = root.to_path_buf();
        tracing::debug!(
            "Spawning server for '{}' in {:?} on port {}",
            name,
            root,
            port
        );

        let mut child = self.spawn(name, &root, port)?;
        self.forward_output(name, &mut child);
        self.wait_ready(name, port, &mut child).await?;

        Ok(ProcessHandle::from_child(child))
    }

    async fn stop(&self, name: &str, mut handle: ProcessHandle) -> Result<()> {
        if let Some(child) = handle.take_child() {
            self.stop_child(name, child).await
        } else if let Some(pid) = handle.pid() {
            self.stop_detached(name, pid).await
        } else {
            Ok(())
        }
    }
}
