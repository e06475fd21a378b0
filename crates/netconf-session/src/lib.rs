//! netconf-session library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does netconf-session do? (for beginners)
//!
//! A NETCONF client talks to a network device (router, switch, firewall)
//! by exchanging XML documents over an SSH subsystem channel named
//! `netconf`.  This crate owns that conversation:
//!
//! 1. Opens the subsystem channel through a [`ChannelOpener`].
//! 2. Sends the client `<hello>` and waits for the server's, which decides
//!    whether later messages use `]]>]]>` or chunked framing.
//! 3. Sends `<rpc>` requests, stamps them with a `message-id`, waits for
//!    the `<rpc-reply>` and checks that it answers the request just sent.
//!
//! The byte-level work (framing, reassembly, XML checks) lives in
//! `netconf-core`; this crate adds the channel, the waiting and the
//! configuration.

/// Application layer: the session and the channel ports it runs on.
pub mod application;

/// Infrastructure layer: transports and configuration files.
pub mod infrastructure;

pub use application::channel::{ChannelError, ChannelOpener, DataReceiver, SubsystemChannel};
pub use application::config::SessionConfig;
pub use application::inbox::SessionState;
pub use application::session::{NetconfSession, SessionError};
