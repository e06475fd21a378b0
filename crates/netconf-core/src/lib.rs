//! # netconf-core
//!
//! Shared library for the NETCONF session layer containing the framing
//! codecs, the hello/capability documents, and the message-id counter.
//!
//! This crate has no dependencies on sockets, SSH, or an async runtime; it
//! only turns bytes into messages and messages into bytes.  The
//! `netconf-session` crate drives it from a live channel.
//!
//! # Architecture overview (for beginners)
//!
//! NETCONF is a request/reply protocol that exchanges XML documents over an
//! SSH subsystem channel.  SSH delivers an ordered stream of bytes with no
//! message boundaries, so NETCONF adds its own framing on top:
//!
//! - **`protocol`** – The two framing dialects (legacy `]]>]]>` sentinel and
//!   length-prefixed chunks), streaming decoders that reassemble messages
//!   from arbitrarily split input, and the `message-id` counter.
//!
//! - **`domain`** – Capability sets and the `<hello>` document each side
//!   sends first.  The server's capabilities decide which framing dialect is
//!   used for the rest of the session.
//!
//! - **`xml`** – A thin well-formedness layer over `quick-xml` that can read
//!   and rewrite attributes on a document's root element.

pub mod domain;
pub mod protocol;
pub mod xml;

// Re-export the most-used types at the crate root so callers can write
// `netconf_core::Hello` instead of `netconf_core::domain::capabilities::Hello`.
pub use domain::capabilities::{CapabilitySet, Hello, HelloError, BASE_1_0, BASE_1_1};
pub use protocol::framing::{encode_message, FramingError, MessageDecoder, ProtocolMode};
pub use protocol::message_id::MessageIdCounter;
pub use xml::document::{XmlDocument, XmlError, NETCONF_BASE_NS};
