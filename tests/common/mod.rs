//! Shared test fixtures: scripted process hosts and supervisor builders.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use siteherd::{Error, ProcessHandle, ProcessHost, Result, RetryPolicy, Supervisor};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-server start behavior for [`ScriptedHost`].
#[derive(Debug, Clone, Copy)]
pub enum StartBehavior {
    /// Resolve successfully right away.
    Succeed,
    /// Fail the first `n` attempts, then succeed.
    FailTimes(u32),
    /// Fail every attempt.
    AlwaysFail,
    /// Never resolve; the supervisor's timeout guard must fire.
    Hang,
}

/// Process host driven entirely by a per-server script.
pub struct ScriptedHost {
    behaviors: Mutex<HashMap<String, StartBehavior>>,
    failing_stops: Mutex<HashSet<String>>,
    start_attempts: Mutex<HashMap<String, u32>>,
    stop_calls: AtomicU32,
    start_delay: Option<Duration>,
    next_pid: AtomicU32,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            failing_stops: Mutex::new(HashSet::new()),
            start_attempts: Mutex::new(HashMap::new()),
            stop_calls: AtomicU32::new(0),
            start_delay: None,
            next_pid: AtomicU32::new(10_000),
        }
    }

    /// Every start suspends for `delay` before resolving, so tests can
    /// observe the `Starting` window.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn set_behavior(&self, name: &str, behavior: StartBehavior) {
        self.behaviors.lock().insert(name.to_string(), behavior);
    }

    pub fn fail_stops_for(&self, name: &str) {
        self.failing_stops.lock().insert(name.to_string());
    }

    pub fn start_attempts(&self, name: &str) -> u32 {
        self.start_attempts.lock().get(name).copied().unwrap_or(0)
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessHost for ScriptedHost {
    async fn start(&self, name: &str, _root: &Path, _port: u16) -> Result<ProcessHandle> {
        let attempt = {
            let mut attempts = self.start_attempts.lock();
            let counter = attempts.entry(name.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }

        let behavior = self
            .behaviors
            .lock()
            .get(name)
            .copied()
            .unwrap_or(StartBehavior::Succeed);
        match behavior {
            StartBehavior::Succeed => {}
            StartBehavior::FailTimes(n) if attempt > n => {}
            StartBehavior::FailTimes(_) | StartBehavior::AlwaysFail => {
                return Err(Error::StartFailed(
                    name.to_string(),
                    format!("scripted failure on attempt {}", attempt),
                ));
            }
            StartBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
        Ok(ProcessHandle::detached(
            self.next_pid.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn stop(&self, name: &str, _handle: ProcessHandle) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_stops.lock().contains(name) {
            return Err(Error::StopFailed(
                name.to_string(),
                "scripted stop failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Supervisor with fast timeouts and backoff, suitable for scripted hosts.
///
/// `start_port` must be unique per test so parallel tests never contend for
/// the same OS ports during allocation probes.
pub fn test_supervisor(host: Arc<ScriptedHost>, start_port: u16) -> Supervisor {
    Supervisor::builder(host)
        .start_port(start_port)
        .retry_policy(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        })
        .startup_timeout(Duration::from_millis(250))
        .stop_timeout(Duration::from_millis(250))
        .build()
}
