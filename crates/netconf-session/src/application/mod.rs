//! Application layer: the session use case and the ports it depends on.
//!
//! Nothing here touches sockets or processes; adapters for those live in
//! `crate::infrastructure`.

pub mod channel;
pub mod config;
pub mod inbox;
pub mod session;
