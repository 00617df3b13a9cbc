//! Configuration loading for the `siteherd` binary.
//!
//! Configuration lives in a `siteherd.yaml` file: a `settings` block tuning
//! the supervisor (ports, timeouts, retry policy, serve command) and a `sites`
//! list naming the websites to manage. Every field in `settings` has a
//! default, so a minimal config is just the site list.

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Candidate config file names, checked in order.
const CONFIG_FILE_NAMES: &[&str] = &["siteherd.yaml", "siteherd.yml"];

fn default_start_port() -> u16 {
    8081
}
fn default_max_port_scan() -> u16 {
    crate::port::DEFAULT_MAX_SCAN_RANGE
}
fn default_startup_timeout_secs() -> u64 {
    30
}
fn default_stop_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_retry_multiplier() -> f64 {
    2.0
}
fn default_retry_max_delay_ms() -> u64 {
    30_000
}
fn default_grace_period_secs() -> u64 {
    5
}
fn default_command() -> String {
    // The command runs in the site root with $PORT exported.
    "python3 -m http.server \"$PORT\"".to_string()
}

/// Supervisor tuning knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// First port tried when allocating; the scan moves upward from here.
    #[serde(default = "default_start_port")]
    pub start_port: u16,

    /// How many ports above `start_port` are scanned before giving up.
    #[serde(default = "default_max_port_scan")]
    pub max_port_scan: u16,

    /// Hard deadline for one server start attempt, in seconds.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Hard deadline for a server stop, in seconds.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Start retries after the initial attempt (total tries = retries + 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff delay before the first retry, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Multiplicative backoff growth per retry.
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    /// Cap on the backoff delay, in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Grace period between SIGTERM and SIGKILL when stopping, in seconds.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Path that must exist under each site root (e.g. `index.html` or
    /// `src`). When unset, only the root directory itself is required.
    #[serde(default)]
    pub layout_marker: Option<String>,

    /// Shell command that builds and serves one site. Runs in the site root
    /// with `SITEHERD_SITE`, `SITEHERD_ROOT`, and `PORT` in the environment.
    #[serde(default = "default_command")]
    pub command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_port: default_start_port(),
            max_port_scan: default_max_port_scan(),
            startup_timeout_secs: default_startup_timeout_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_multiplier: default_retry_multiplier(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            grace_period_secs: default_grace_period_secs(),
            layout_marker: None,
            command: default_command(),
        }
    }
}

impl Settings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: self.retry_multiplier,
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// One website to manage.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    pub name: String,
    /// Filesystem root of the website source.
    pub root: PathBuf,
}

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Could not read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find `siteherd.yaml` (or `.yml`) in the given directory.
    pub fn find_config_file(dir: &Path) -> Result<PathBuf> {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(Error::Config(format!(
            "Could not find siteherd.yaml in {}",
            dir.display()
        )))
    }

    /// Settings with defaults applied when the `settings` block is absent.
    pub fn settings(&self) -> Settings {
        self.settings.clone().unwrap_or_default()
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for site in &self.sites {
            if site.name.trim().is_empty() {
                return Err(Error::Config("Site name cannot be empty".to_string()));
            }
            if !seen.insert(site.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate site name: '{}'",
                    site.name
                )));
            }
        }
        if let Some(settings) = &self.settings {
            if settings.command.trim().is_empty() {
                return Err(Error::Config(
                    "`settings.command` cannot be empty".to_string(),
                ));
            }
            if settings.retry_multiplier < 1.0 {
                return Err(Error::Config(
                    "`settings.retry_multiplier` must be >= 1.0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
sites:
  - name: blog
    root: /srv/sites/blog
"#,
        )
        .unwrap();
        config.validate().unwrap();

        let settings = config.settings();
        assert_eq!(settings.start_port, 8081);
        assert_eq!(settings.max_port_scan, 1000);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_policy().multiplier, 2.0);
        assert_eq!(config.sites.len(), 1);
    }

    #[test]
    fn settings_block_overrides_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
settings:
  start_port: 9000
  startup_timeout_secs: 5
  max_retries: 1
  layout_marker: index.html
sites: []
"#,
        )
        .unwrap();
        let settings = config.settings();
        assert_eq!(settings.start_port, 9000);
        assert_eq!(settings.startup_timeout(), Duration::from_secs(5));
        assert_eq!(settings.max_retries, 1);
        assert_eq!(settings.layout_marker.as_deref(), Some("index.html"));
        // Untouched fields keep defaults
        assert_eq!(settings.stop_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn duplicate_site_names_rejected() {
        let config: Config = serde_yaml::from_str(
            r#"
sites:
  - name: blog
    root: /a
  - name: blog
    root: /b
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate site name"));
    }

    #[test]
    fn empty_site_name_rejected() {
        let config: Config = serde_yaml::from_str(
            r#"
sites:
  - name: ""
    root: /a
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: std::result::Result<Config, _> = serde_yaml::from_str(
            r#"
sites: []
bogus: true
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = Config::load(Path::new("/nonexistent/siteherd.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn find_config_file_prefers_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("siteherd.yaml"), "sites: []\n").unwrap();
        std::fs::write(dir.path().join("siteherd.yml"), "sites: []\n").unwrap();
        let found = Config::find_config_file(dir.path()).unwrap();
        assert!(found.ends_with("siteherd.yaml"));
    }
}
