//! The supervisor: a registry of named website servers with lifecycle
//! orchestration.
//!
//! One [`Supervisor`] owns the port allocator, the retry and timeout policy,
//! the event bus, and a registry of managed servers. All public operations
//! are safe to call concurrently; operations on different servers interleave
//! freely, while a second start or stop racing an in-flight one on the *same*
//! server fails fast with [`Error::AlreadyInProgress`] instead of queueing.
//!
//! Lock discipline: registry and per-server locks are synchronous
//! (`parking_lot`) and held only for short critical sections, never across an
//! `.await`. State flips that must be visible to racing callers happen under
//! the per-server lock before the first suspension point.

use crate::error::{Error, Result};
use crate::events::{EventBus, ServerEvent};
use crate::host::{ProcessHandle, ProcessHost};
use crate::port::{PortAllocator, DEFAULT_MAX_SCAN_RANGE};
use crate::retry::RetryPolicy;
use crate::state::{ServerInfo, ServerState};
use crate::timeout::with_timeout;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default hard deadline for one start attempt.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default hard deadline for a stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default first port tried by the allocator.
pub const DEFAULT_START_PORT: u16 = 8081;

/// Internal record for one managed server.
struct ManagedServer {
    name: String,
    root: PathBuf,
    state: ServerState,
    port: Option<u16>,
    url: Option<String>,
    pid: Option<u32>,
    handle: Option<ProcessHandle>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    retry_count: u32,
}

impl ManagedServer {
    fn new(name: &str, root: &Path) -> Self {
        Self {
            name: name.to_string(),
            root: root.to_path_buf(),
            state: ServerState::Stopped,
            port: None,
            url: None,
            pid: None,
            handle: None,
            started_at: None,
            last_error: None,
            retry_count: 0,
        }
    }

    fn transition(&mut self, to: ServerState) {
        debug_assert!(
            self.state.is_valid_transition(to),
            "invalid transition {} -> {} for '{}'",
            self.state,
            to,
            self.name
        );
        self.state = to;
    }

    fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            state: self.state,
            port: self.port,
            url: self.url.clone(),
            pid: self.pid,
            started_at: self.started_at,
            error: self.last_error.clone(),
            retry_count: self.retry_count,
        }
    }
}

type ServerEntry = Arc<RwLock<ManagedServer>>;

/// Builder for [`Supervisor`]. The process host is the only required input.
pub struct SupervisorBuilder {
    host: Arc<dyn ProcessHost>,
    start_port: u16,
    max_port_scan: u16,
    retry: RetryPolicy,
    startup_timeout: Duration,
    stop_timeout: Duration,
    layout_marker: Option<String>,
    events: Option<EventBus>,
}

impl SupervisorBuilder {
    pub fn new(host: Arc<dyn ProcessHost>) -> Self {
        Self {
            host,
            start_port: DEFAULT_START_PORT,
            max_port_scan: DEFAULT_MAX_SCAN_RANGE,
            retry: RetryPolicy::default(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            layout_marker: None,
            events: None,
        }
    }

    pub fn start_port(mut self, port: u16) -> Self {
        self.start_port = port;
        self
    }

    pub fn max_port_scan(mut self, range: u16) -> Self {
        self.max_port_scan = range;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Relative path that must exist under each site root (e.g. `index.html`).
    pub fn layout_marker(mut self, marker: impl Into<String>) -> Self {
        self.layout_marker = Some(marker.into());
        self
    }

    /// Share an existing event bus instead of creating a fresh one.
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Supervisor {
        Supervisor {
            host: self.host,
            ports: PortAllocator::new(self.start_port, self.max_port_scan),
            retry: self.retry,
            startup_timeout: self.startup_timeout,
            stop_timeout: self.stop_timeout,
            layout_marker: self.layout_marker,
            events: self.events.unwrap_or_default(),
            servers: RwLock::new(HashMap::new()),
        }
    }
}

/// Lifecycle supervisor for a set of named website dev servers.
pub struct Supervisor {
    host: Arc<dyn ProcessHost>,
    ports: PortAllocator,
    retry: RetryPolicy,
    startup_timeout: Duration,
    stop_timeout: Duration,
    layout_marker: Option<String>,
    events: EventBus,
    servers: RwLock<HashMap<String, ServerEntry>>,
}

impl Supervisor {
    pub fn builder(host: Arc<dyn ProcessHost>) -> SupervisorBuilder {
        SupervisorBuilder::new(host)
    }

    /// The event bus carrying lifecycle notifications for this supervisor.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The port allocator backing this supervisor.
    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    /// Start the named server, registering it if unseen.
    ///
    /// Returns the server's info snapshot once it is `Running`. Calling this
    /// on an already running server returns its current info without touching
    /// the process. A start or stop already in flight for the same name fails
    /// with [`Error::AlreadyInProgress`].
    pub async fn start_server(&self, name: &str, root: &Path) -> Result<ServerInfo> {
        self.validate_root(name, root)?;

        let entry = self.entry_for(name, root);

        // Admission check and the flip to Starting happen synchronously, so
        // a racing second start observes AlreadyInProgress.
        {
            let mut server = entry.write();
            match server.state {
                ServerState::Running => {
                    tracing::debug!("Server '{}' already running", name);
                    return Ok(server.info());
                }
                ServerState::Starting | ServerState::Stopping => {
                    return Err(Error::AlreadyInProgress(name.to_string()));
                }
                ServerState::Stopped | ServerState::Error => {
                    server.transition(ServerState::Starting);
                    server.root = root.to_path_buf();
                    server.last_error = None;
                    server.retry_count = 0;
                }
            }
        }
        self.events.publish(ServerEvent::Starting {
            name: name.to_string(),
        });

        let port = match self.ports.allocate() {
            Ok(port) => port,
            Err(err) => return Err(self.fail_start(&entry, name, None, err)),
        };
        entry.write().port = Some(port);
        self.events.publish(ServerEvent::PortAllocated {
            name: name.to_string(),
            port,
        });

        let host = Arc::clone(&self.host);
        let start_result = self
            .retry
            .run(name, |attempt| {
                entry.write().retry_count = attempt;
                with_timeout(name, self.startup_timeout, host.start(name, root, port))
            })
            .await;

        match start_result {
            Ok((handle, failures)) => {
                let info = {
                    let mut server = entry.write();
                    server.pid = handle.pid();
                    server.handle = Some(handle);
                    server.url = Some(format!("http://localhost:{}", port));
                    server.started_at = Some(Utc::now());
                    server.retry_count = failures;
                    server.transition(ServerState::Running);
                    server.info()
                };
                self.events.publish(ServerEvent::Started {
                    name: name.to_string(),
                    info: info.clone(),
                });
                Ok(info)
            }
            Err(err) => Err(self.fail_start(&entry, name, Some(port), err)),
        }
    }

    /// Stop the named server.
    ///
    /// Stopping an unknown, already stopped, or currently stopping server is
    /// a silent no-op. Stopping a server whose start is still in flight fails
    /// with [`Error::AlreadyInProgress`]. Cleanup (port release, process
    /// handle cleared) runs whether or not the process terminated cleanly;
    /// a termination failure leaves the server in `Error` and is returned to
    /// the caller.
    pub async fn stop_server(&self, name: &str) -> Result<()> {
        let Some(entry) = self.get_entry(name) else {
            return Ok(());
        };

        let (handle, port) = {
            let mut server = entry.write();
            match server.state {
                ServerState::Stopped | ServerState::Stopping => return Ok(()),
                ServerState::Starting => {
                    return Err(Error::AlreadyInProgress(name.to_string()));
                }
                ServerState::Running | ServerState::Error => {
                    server.transition(ServerState::Stopping);
                    (server.handle.take(), server.port)
                }
            }
        };
        self.events.publish(ServerEvent::Stopping {
            name: name.to_string(),
        });

        let stop_result = match handle {
            Some(handle) => {
                with_timeout(name, self.stop_timeout, self.host.stop(name, handle)).await
            }
            // No process was ever handed to us (start failed before spawn).
            None => Ok(()),
        };

        // Clear the record before releasing the port: a concurrent start may
        // win the freed port immediately, and no snapshot may ever show it
        // attached to two live entries.
        {
            let mut server = entry.write();
            server.port = None;
            server.url = None;
            server.pid = None;
            server.started_at = None;
            match &stop_result {
                Ok(()) => {
                    server.transition(ServerState::Stopped);
                    server.last_error = None;
                }
                Err(err) => {
                    server.transition(ServerState::Error);
                    server.last_error = Some(err.to_string());
                }
            }
        }
        if let Some(port) = port {
            self.ports.release(port);
            self.events.publish(ServerEvent::PortReleased {
                name: name.to_string(),
                port,
            });
        }

        match stop_result {
            Ok(()) => {
                self.events.publish(ServerEvent::Stopped {
                    name: name.to_string(),
                });
                Ok(())
            }
            Err(err) => {
                self.events.publish(ServerEvent::Error {
                    name: name.to_string(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Stop and start the named server, reusing its registered root.
    ///
    /// A stop failure is logged but does not abort the restart: stop cleanup
    /// has already released the port and cleared the handle, so a fresh start
    /// is legal from the resulting `Error` state.
    pub async fn restart_server(&self, name: &str) -> Result<ServerInfo> {
        let root = {
            let servers = self.servers.read();
            match servers.get(name) {
                Some(entry) => entry.read().root.clone(),
                None => return Err(Error::NotFound(name.to_string())),
            }
        };

        if let Err(err) = self.stop_server(name).await {
            tracing::warn!("Restart of '{}': stop failed, continuing: {}", name, err);
        }
        self.start_server(name, &root).await
    }

    /// Snapshot of one server, if registered. Never blocks on in-flight
    /// starts or stops.
    pub fn get_server_info(&self, name: &str) -> Option<ServerInfo> {
        self.get_entry(name).map(|entry| entry.read().info())
    }

    /// Snapshots of all registered servers, sorted by name.
    pub fn get_all_servers(&self) -> Vec<ServerInfo> {
        let mut infos: Vec<ServerInfo> = self
            .servers
            .read()
            .values()
            .map(|entry| entry.read().info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn is_server_running(&self, name: &str) -> bool {
        self.get_entry(name)
            .map(|entry| entry.read().state == ServerState::Running)
            .unwrap_or(false)
    }

    /// Stop every registered server concurrently, best-effort.
    ///
    /// Every server is attempted regardless of individual failures; failures
    /// are logged and swallowed so a shutdown drain always runs to
    /// completion. A server whose stop failed is left in `Error` with its
    /// port already released. Servers mid-start are skipped (their stop
    /// reports `AlreadyInProgress`).
    pub async fn stop_all_servers(&self) {
        let names: Vec<String> = self.servers.read().keys().cloned().collect();
        tracing::info!("Stopping all servers ({} registered)", names.len());

        let results =
            futures::future::join_all(names.iter().map(|name| self.stop_server(name))).await;

        for (name, result) in names.iter().zip(results) {
            if let Err(err) = result {
                tracing::warn!("Failed to stop '{}': {}", name, err);
            }
        }
    }

    /// Stop every server stuck in `Error` state to reclaim leaked ports and
    /// processes. Returns the number of servers successfully reclaimed.
    pub async fn cleanup_orphaned_servers(&self) -> usize {
        let orphans: Vec<String> = self
            .servers
            .read()
            .iter()
            .filter(|(_, entry)| entry.read().state == ServerState::Error)
            .map(|(name, _)| name.clone())
            .collect();

        if orphans.is_empty() {
            return 0;
        }
        tracing::info!("Cleaning up {} orphaned server(s)", orphans.len());

        let mut reclaimed = 0;
        for name in &orphans {
            match self.stop_server(name).await {
                Ok(()) => reclaimed += 1,
                Err(err) => {
                    tracing::warn!("Orphan cleanup for '{}' failed: {}", name, err);
                }
            }
        }
        reclaimed
    }

    /// Record a failed start: flip to `Error`, clear and release the port,
    /// emit the events, and hand the original error back unchanged.
    ///
    /// The registry entry is cleared under its lock *before* the allocator
    /// releases the port, so a concurrent start that wins the freed port can
    /// never appear in a snapshot alongside this entry still holding it.
    fn fail_start(&self, entry: &ServerEntry, name: &str, port: Option<u16>, err: Error) -> Error {
        {
            let mut server = entry.write();
            server.transition(ServerState::Error);
            server.last_error = Some(err.to_string());
            server.port = None;
            server.url = None;
        }
        if let Some(port) = port {
            self.ports.release(port);
            self.events.publish(ServerEvent::PortReleased {
                name: name.to_string(),
                port,
            });
        }
        self.events.publish(ServerEvent::Error {
            name: name.to_string(),
            message: err.to_string(),
        });
        err
    }

    fn validate_root(&self, name: &str, root: &Path) -> Result<()> {
        if !root.is_dir() {
            return Err(Error::InvalidPath {
                name: name.to_string(),
                reason: format!("{} is not a directory", root.display()),
            });
        }
        if let Some(marker) = &self.layout_marker {
            if !root.join(marker).exists() {
                return Err(Error::InvalidPath {
                    name: name.to_string(),
                    reason: format!("missing '{}' under {}", marker, root.display()),
                });
            }
        }
        Ok(())
    }

    /// Get or register the entry for `name`. Re-registering with a new root
    /// is allowed while stopped; the root is refreshed on the next start.
    fn entry_for(&self, name: &str, root: &Path) -> ServerEntry {
        let mut servers = self.servers.write();
        Arc::clone(
            servers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(ManagedServer::new(name, root)))),
        )
    }

    fn get_entry(&self, name: &str) -> Option<ServerEntry> {
        self.servers.read().get(name).map(Arc::clone)
    }
}
