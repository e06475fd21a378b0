//! Session settings.
//!
//! Fields annotated with `#[serde(default = "some_fn")]` fall back to the
//! value of `some_fn()` when absent, so an empty `[session]` table is a
//! valid configuration.  Loading the settings from disk is handled by
//! [`crate::infrastructure::config`].

use std::time::Duration;

use netconf_core::protocol::DEFAULT_MAX_MESSAGE_SIZE;
use netconf_core::{BASE_1_0, BASE_1_1};
use serde::{Deserialize, Serialize};

/// Settings for one NETCONF session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// SSH subsystem to open.
    #[serde(default = "default_subsystem")]
    pub subsystem: String,
    /// How long to wait for the server hello and for each RPC reply.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Capability URIs advertised in the client hello.
    #[serde(default = "default_client_capabilities")]
    pub client_capabilities: Vec<String>,
    /// Largest message accepted from the server, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl SessionConfig {
    /// The operation timeout as a [`Duration`].
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Returns the config with a different operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subsystem: default_subsystem(),
            operation_timeout_ms: default_operation_timeout_ms(),
            client_capabilities: default_client_capabilities(),
            max_message_size: default_max_message_size(),
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_subsystem() -> String {
    "netconf".to_string()
}
fn default_operation_timeout_ms() -> u64 {
    30_000
}
fn default_client_capabilities() -> Vec<String> {
    vec![BASE_1_0.to_string(), BASE_1_1.to_string()]
}
fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}
