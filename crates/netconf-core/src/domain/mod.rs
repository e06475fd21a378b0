//! Domain module: capability sets and hello documents.
//!
//! Contains pure logic with no I/O.  The session layer feeds it the bytes of
//! the peer's hello and gets back the capability set and the framing dialect
//! to use for the rest of the session.

pub mod capabilities;

pub use capabilities::{CapabilitySet, Hello, HelloError, BASE_1_0, BASE_1_1};
