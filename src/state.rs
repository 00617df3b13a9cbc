use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current lifecycle state of a managed server.
///
/// Each server moves through these states as it is started, supervised, and
/// stopped. The normal cycle is `Stopped` → `Starting` → `Running` →
/// `Stopping` → `Stopped`; `Error` is reachable from any of the three live
/// states and is terminal until an explicit re-start.
///
/// # State Transitions
///
/// ```text
/// Stopped ──► Starting ──► Running ──► Stopping ──► Stopped
///                │            │            │
///                ▼            ▼            ▼
///              Error ◄──── Error ◄────── Error
///                │
///                └──── start ────► Starting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    /// Server is not running
    Stopped,
    /// Server is in the process of starting
    Starting,
    /// Server process is running and serving
    Running,
    /// Server is in the process of stopping
    Stopping,
    /// Server failed during start, run, or stop; terminal until re-started
    Error,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::Stopped => write!(f, "stopped"),
            ServerState::Starting => write!(f, "starting"),
            ServerState::Running => write!(f, "running"),
            ServerState::Stopping => write!(f, "stopping"),
            ServerState::Error => write!(f, "error"),
        }
    }
}

impl ServerState {
    /// Check if a state transition is valid according to the state machine.
    ///
    /// # Examples
    ///
    /// ```
    /// use siteherd::state::ServerState;
    ///
    /// assert!(ServerState::Stopped.is_valid_transition(ServerState::Starting));
    /// assert!(ServerState::Starting.is_valid_transition(ServerState::Running));
    /// assert!(!ServerState::Stopped.is_valid_transition(ServerState::Running)); // Must go through Starting
    /// ```
    pub fn is_valid_transition(&self, to: ServerState) -> bool {
        use ServerState::*;
        match (self, to) {
            // Stopped can only begin a new start cycle
            (Stopped, Starting) => true,

            // Starting resolves to Running or fails
            (Starting, Running) => true,
            (Starting, Error) => true,

            // Running can begin stopping or fail (process died)
            (Running, Stopping) => true,
            (Running, Error) => true,

            // Stopping resolves to Stopped or fails
            (Stopping, Stopped) => true,
            (Stopping, Error) => true,

            // Error is re-entered via a fresh start, or stopped to reclaim
            // its port (orphan cleanup)
            (Error, Starting) => true,
            (Error, Stopping) => true,

            // Same state is always valid (no-op transition)
            (s1, s2) if *s1 == s2 => true,

            _ => false,
        }
    }

    /// States in which the server owns its allocated port.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ServerState::Starting | ServerState::Running | ServerState::Stopping
        )
    }
}

/// Read-only snapshot of one managed server, as exposed to external callers.
///
/// Produced by [`Supervisor::get_server_info`](crate::Supervisor::get_server_info)
/// and [`Supervisor::get_all_servers`](crate::Supervisor::get_all_servers), and
/// carried inside the `server-started` event.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub state: ServerState,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    /// Message of the last error, if the server is (or was) in `Error` state.
    pub error: Option<String>,
    /// Retry attempts consumed during the most recent start sequence.
    pub retry_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_to_starting_is_valid() {
        assert!(ServerState::Stopped.is_valid_transition(ServerState::Starting));
    }

    #[test]
    fn starting_resolves_to_running_or_error() {
        assert!(ServerState::Starting.is_valid_transition(ServerState::Running));
        assert!(ServerState::Starting.is_valid_transition(ServerState::Error));
    }

    #[test]
    fn running_to_stopping_is_valid() {
        assert!(ServerState::Running.is_valid_transition(ServerState::Stopping));
    }

    #[test]
    fn stopping_resolves_to_stopped_or_error() {
        assert!(ServerState::Stopping.is_valid_transition(ServerState::Stopped));
        assert!(ServerState::Stopping.is_valid_transition(ServerState::Error));
    }

    #[test]
    fn error_reenters_via_start() {
        assert!(ServerState::Error.is_valid_transition(ServerState::Starting));
    }

    #[test]
    fn error_can_be_stopped_for_cleanup() {
        assert!(ServerState::Error.is_valid_transition(ServerState::Stopping));
    }

    #[test]
    fn same_state_is_noop() {
        for s in [
            ServerState::Stopped,
            ServerState::Starting,
            ServerState::Running,
            ServerState::Stopping,
            ServerState::Error,
        ] {
            assert!(s.is_valid_transition(s));
        }
    }

    #[test]
    fn running_not_reachable_without_starting() {
        assert!(!ServerState::Stopped.is_valid_transition(ServerState::Running));
        assert!(!ServerState::Error.is_valid_transition(ServerState::Running));
    }

    #[test]
    fn stopped_not_reachable_without_stopping() {
        assert!(!ServerState::Running.is_valid_transition(ServerState::Stopped));
        assert!(!ServerState::Starting.is_valid_transition(ServerState::Stopped));
    }

    #[test]
    fn starting_cannot_jump_to_stopping() {
        assert!(!ServerState::Starting.is_valid_transition(ServerState::Stopping));
    }

    #[test]
    fn live_states_hold_ports() {
        assert!(ServerState::Starting.is_live());
        assert!(ServerState::Running.is_live());
        assert!(ServerState::Stopping.is_live());
        assert!(!ServerState::Stopped.is_live());
        assert!(!ServerState::Error.is_live());
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(ServerState::Running.to_string(), "running");
        assert_eq!(ServerState::Error.to_string(), "error");
    }
}
