//! Infrastructure layer: configuration files and channel transports.

/// TOML configuration for the binary.
pub mod config;

/// `ssh` client process transport.
pub mod ssh_process;

/// Transport over any Tokio byte stream.
pub mod stream;
