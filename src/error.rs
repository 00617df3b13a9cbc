use miette::Diagnostic;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Invalid site root for '{name}': {reason}")]
    #[diagnostic(
        code(siteherd::site::invalid_path),
        help("Check that the path exists and contains the expected site layout")
    )]
    InvalidPath { name: String, reason: String },

    #[error("Operation already in progress for server '{0}'")]
    #[diagnostic(
        code(siteherd::server::in_progress),
        help("Wait for the current start/stop to settle, then retry")
    )]
    AlreadyInProgress(String),

    #[error("No free port found in {scan_range} ports starting at {start_port}")]
    #[diagnostic(
        code(siteherd::port::exhausted),
        help("Stop unused servers or raise `max_port_scan` in siteherd.yaml")
    )]
    PortExhaustion { start_port: u16, scan_range: u16 },

    #[error("Operation for '{name}' timed out after {duration:?}")]
    #[diagnostic(
        code(siteherd::server::timeout),
        help("The server may be slow to start. Increase the timeout or check its logs")
    )]
    Timeout { name: String, duration: Duration },

    #[error("Server '{0}' failed to start: {1}")]
    #[diagnostic(
        code(siteherd::server::start_failed),
        help("Check that the configured command exists and is executable")
    )]
    StartFailed(String, String),

    #[error("Server '{0}' failed to stop: {1}")]
    #[diagnostic(code(siteherd::server::stop_failed))]
    StopFailed(String, String),

    #[error("Server not found: {0}")]
    #[diagnostic(
        code(siteherd::server::not_found),
        help("Check registered servers with `siteherd status`")
    )]
    NotFound(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(siteherd::config::error),
        help("Run `siteherd validate` for detailed validation errors")
    )]
    Config(String),

    #[error("Process error: {0}")]
    #[diagnostic(code(siteherd::process::error))]
    Process(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::InvalidPath { name, .. } => Some(format!(
                "Verify the `root` configured for site '{}' points at the website source directory.",
                name
            )),
            Error::AlreadyInProgress(name) => Some(format!(
                "Server '{}' has a start or stop in flight. Retry once it settles.",
                name
            )),
            Error::PortExhaustion { start_port, .. } => Some(format!(
                "No free port was found scanning upward from {}. Stop stale servers or pick a different `start_port`.",
                start_port
            )),
            Error::Timeout { name, duration } => Some(format!(
                "Server '{}' did not respond within {:?}. The underlying process may still complete in the background.",
                name, duration
            )),
            Error::StartFailed(name, _) => Some(format!(
                "Check the command configured for '{}' and the server-log events for its output.",
                name
            )),
            Error::NotFound(name) => Some(format!(
                "Server '{}' is not registered. Start it first with `siteherd serve {}`.",
                name, name
            )),
            Error::Config(_) => Some("Validate your config with: siteherd validate".to_string()),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_includes_name_and_duration() {
        let err = Error::Timeout {
            name: "site1".to_string(),
            duration: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("site1"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn suggestion_present_for_user_facing_errors() {
        assert!(Error::NotFound("blog".to_string()).suggestion().is_some());
        assert!(Error::AlreadyInProgress("blog".to_string())
            .suggestion()
            .is_some());
        assert!(Error::PortExhaustion {
            start_port: 8081,
            scan_range: 1000
        }
        .suggestion()
        .is_some());
    }

    #[test]
    fn suggestion_absent_for_io() {
        let err = Error::Io(io::Error::other("boom"));
        assert!(err.suggestion().is_none());
    }

    #[test]
    fn with_suggestion_appends_hint() {
        let err = Error::NotFound("blog".to_string());
        let rendered = err.with_suggestion();
        assert!(rendered.contains("Hint:"));
    }
}
