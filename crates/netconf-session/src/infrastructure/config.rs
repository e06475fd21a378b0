//! TOML-based configuration for the `netconf-rpc` binary.
//!
//! # File layout (for beginners)
//!
//! ```toml
//! [ssh]
//! host = "router.example.net"
//! port = 830
//! user = "admin"
//!
//! [session]
//! operation_timeout_ms = 10000
//! ```
//!
//! Only `ssh.host` is required.  Every other field falls back to the value
//! returned by its `default_*` helper, and the whole `[session]` table may be
//! omitted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::config::SessionConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub ssh: SshConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// How to reach the NETCONF server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshConfig {
    /// Host name or address of the server.
    pub host: String,
    /// SSH port; NETCONF's well-known port is 830.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name; the ssh client's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// The ssh client executable.
    #[serde(default = "default_program")]
    pub program: String,
    /// Extra arguments placed before the host, e.g. `["-i", "key.pem"]`.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl SshConfig {
    /// Settings for `host` with every other field at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: None,
            program: default_program(),
            extra_args: Vec::new(),
        }
    }
}

fn default_port() -> u16 {
    830
}
fn default_program() -> String {
    "ssh".to_string()
}

// ── Load / save ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed or `ssh.host`
    /// is missing.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Loads `AppConfig` from `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    AppConfig::from_toml_str(&content)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = config.to_toml_string()?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_minimal_file_uses_defaults() {
        // Arrange
        let text = "[ssh]\nhost = \"10.0.0.1\"\n";

        // Act
        let cfg = AppConfig::from_toml_str(text).unwrap();

        // Assert
        assert_eq!(cfg.ssh, SshConfig::new("10.0.0.1"));
        assert_eq!(cfg.ssh.port, 830);
        assert_eq!(cfg.ssh.program, "ssh");
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn test_session_table_overrides_timeout() {
        let text = "[ssh]\nhost = \"r1\"\nuser = \"admin\"\n\n[session]\noperation_timeout_ms = 1500\n";

        let cfg = AppConfig::from_toml_str(text).unwrap();

        assert_eq!(cfg.ssh.user.as_deref(), Some("admin"));
        assert_eq!(cfg.session.operation_timeout(), Duration::from_millis(1500));
        assert_eq!(cfg.session.subsystem, "netconf");
    }

    #[test]
    fn test_missing_host_is_a_parse_error() {
        let result = AppConfig::from_toml_str("[ssh]\nport = 22\n");

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        // Arrange
        let mut cfg = AppConfig {
            ssh: SshConfig::new("router"),
            session: SessionConfig::default(),
        };
        cfg.ssh.extra_args = vec!["-i".to_string(), "id_netconf".to_string()];

        // Act
        let text = cfg.to_toml_string().unwrap();
        let parsed = AppConfig::from_toml_str(&text).unwrap();

        // Assert
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn test_save_then_load_from_disk() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("netconf-config-test-{}", std::process::id()));
        let path = dir.join("nested").join("netconf.toml");
        let cfg = AppConfig {
            ssh: SshConfig::new("127.0.0.1"),
            session: SessionConfig::default().with_operation_timeout(Duration::from_secs(3)),
        };

        // Act
        save_config(&path, &cfg).unwrap();
        let loaded = load_config(&path).unwrap();
        let _ = std::fs::remove_dir_all(&dir);

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let path = Path::new("/definitely/not/here/netconf.toml");

        match load_config(path) {
            Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
