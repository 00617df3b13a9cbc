//! Lifecycle event stream for external consumers (CLI, GUI, telemetry).
//!
//! [`EventBus`] is a thin wrapper around [`tokio::sync::broadcast`]: publishing
//! never blocks, every subscriber receives its own clone of each event, and
//! events published while no subscriber exists are dropped. Slow subscribers
//! observe `RecvError::Lagged` and skip the oldest items.

use crate::state::ServerInfo;
use std::fmt;
use tokio::sync::broadcast;

/// Default ring-buffer capacity shared by all receivers.
const DEFAULT_BUS_CAPACITY: usize = 256;

/// Severity of a forwarded server log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Lifecycle notification emitted by the supervisor.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A start request was accepted and the server entered `Starting`.
    Starting { name: String },
    /// The server reached `Running`; carries the full info snapshot.
    Started { name: String, info: ServerInfo },
    /// A stop request was accepted and the server entered `Stopping`.
    Stopping { name: String },
    /// The server reached `Stopped` and its port was released.
    Stopped { name: String },
    /// The server entered `Error` during start, run, or stop.
    Error { name: String, message: String },
    /// A port was claimed for the named server.
    PortAllocated { name: String, port: u16 },
    /// A previously claimed port was returned to the pool.
    PortReleased { name: String, port: u16 },
    /// One line of output from the underlying server process.
    Log {
        name: String,
        message: String,
        level: LogLevel,
    },
}

impl ServerEvent {
    /// Name of the server this event concerns.
    pub fn server_name(&self) -> &str {
        match self {
            ServerEvent::Starting { name }
            | ServerEvent::Started { name, .. }
            | ServerEvent::Stopping { name }
            | ServerEvent::Stopped { name }
            | ServerEvent::Error { name, .. }
            | ServerEvent::PortAllocated { name, .. }
            | ServerEvent::PortReleased { name, .. }
            | ServerEvent::Log { name, .. } => name,
        }
    }
}

/// Broadcast channel for supervisor lifecycle events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender). Multiple
/// publishers may publish concurrently; each subscriber gets an independent
/// receiver that only observes events sent after it subscribed.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all active subscribers.
    ///
    /// Never blocks; if there are no receivers the event is dropped.
    pub fn publish(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    /// Create a new independent receiver for subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// Spawn a background task that mirrors every event into `tracing`.
///
/// Intended for consumers that only want structured logs out of the event
/// stream. The task exits when the bus (all senders) is dropped.
pub fn spawn_event_logger(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger lagged, skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &ServerEvent) {
    match event {
        ServerEvent::Starting { name } => {
            tracing::info!("Server '{}' starting", name);
        }
        ServerEvent::Started { name, info } => {
            tracing::info!(
                "Server '{}' running at {}",
                name,
                info.url.as_deref().unwrap_or("<unknown>")
            );
        }
        ServerEvent::Stopping { name } => {
            tracing::info!("Server '{}' stopping", name);
        }
        ServerEvent::Stopped { name } => {
            tracing::info!("Server '{}' stopped", name);
        }
        ServerEvent::Error { name, message } => {
            tracing::error!("Server '{}' error: {}", name, message);
        }
        ServerEvent::PortAllocated { name, port } => {
            tracing::debug!("Port {} allocated for '{}'", port, name);
        }
        ServerEvent::PortReleased { name, port } => {
            tracing::debug!("Port {} released for '{}'", port, name);
        }
        ServerEvent::Log {
            name,
            message,
            level,
        } => match level {
            LogLevel::Debug => tracing::debug!("[{}] {}", name, message),
            LogLevel::Info => tracing::info!("[{}] {}", name, message),
            LogLevel::Warn => tracing::warn!("[{}] {}", name, message),
            LogLevel::Error => tracing::error!("[{}] {}", name, message),
        },
    }
}
