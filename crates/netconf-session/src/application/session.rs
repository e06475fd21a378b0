//! The NETCONF session: hello exchange and request/reply correlation.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! connect()
//!   ├─ open subsystem channel, register the inbox as its receiver
//!   ├─ send client hello + "]]>]]>"          (dialect not known yet)
//!   └─ wait for server hello ──▶ mode = Chunked if base:1.1 else Legacy
//!
//! send_receive_rpc(rpc, automatic_message_id)
//!   ├─ stamp message-id = next counter value (automatic only)
//!   ├─ arm reply slot, send framed request
//!   ├─ wait for reply (operation timeout)
//!   └─ compare reply message-id (automatic only)
//!
//! close() / drop
//!   └─ inbox closed, channel closed; later calls fail with SessionClosed
//! ```
//!
//! `send_receive_rpc` takes `&mut self`, so the borrow checker guarantees
//! that at most one request is in flight per session.  Callers that share a
//! session between tasks wrap it in a `tokio::sync::Mutex`.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use netconf_core::protocol::encode_legacy;
use netconf_core::{
    encode_message, CapabilitySet, Hello, HelloError, MessageIdCounter, ProtocolMode, XmlDocument,
    XmlError,
};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn};

use super::channel::{ChannelError, ChannelOpener, DataReceiver, SubsystemChannel};
use super::config::SessionConfig;
use super::inbox::{SessionInbox, SessionState};

const MESSAGE_ID: &str = "message-id";

/// Errors returned by [`NetconfSession`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server hello is not a well-formed hello with a base capability.
    #[error("malformed server capabilities: {0}")]
    MalformedCapabilities(String),

    /// The reply is not well-formed XML.
    #[error("malformed rpc reply: {0}")]
    MalformedReply(#[source] XmlError),

    /// The peer broke the framing rules; the session is closed.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The reply carries a different message-id than the request.
    #[error("message id mismatch: sent {expected}, received {}", .actual.as_deref().unwrap_or("none"))]
    MessageIdMismatch {
        expected: String,
        actual: Option<String>,
    },

    /// The wait for the server hello or a reply elapsed.
    #[error("timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The session was closed locally, by the peer, or after a violation.
    #[error("session closed")]
    SessionClosed,

    /// A request was attempted before the server hello arrived.
    #[error("server capabilities have not been negotiated")]
    NotNegotiated,

    /// Automatic message-id handling needs an `<rpc>` root in the base namespace.
    #[error("invalid rpc request: {0}")]
    InvalidRequest(#[source] XmlError),

    /// The configured client capabilities cannot form a hello.
    #[error("invalid client hello: {0}")]
    InvalidClientHello(#[source] HelloError),

    /// The underlying channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// An open, negotiated NETCONF session.
pub struct NetconfSession {
    config: SessionConfig,
    channel: Box<dyn SubsystemChannel>,
    inbox: Arc<SessionInbox>,
    client_hello: Hello,
    server_hello: Hello,
    message_ids: MessageIdCounter,
}

impl NetconfSession {
    /// Opens a session advertising `config.client_capabilities`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidClientHello`] if no base capability is configured.
    /// - [`SessionError::Channel`] if the channel cannot be opened or written.
    /// - [`SessionError::MalformedCapabilities`] for a bad server hello.
    /// - [`SessionError::Timeout`] if no server hello arrives in time.
    pub async fn connect(
        opener: &dyn ChannelOpener,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let client_hello = Hello::new(config.client_capabilities.iter().map(String::as_str))
            .map_err(SessionError::InvalidClientHello)?;
        Self::connect_with_hello(opener, config, client_hello).await
    }

    /// Opens a session sending a caller-supplied client hello.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect), except that the client hello is
    /// not rebuilt from the configuration.
    #[instrument(skip_all, fields(subsystem = %config.subsystem))]
    pub async fn connect_with_hello(
        opener: &dyn ChannelOpener,
        config: SessionConfig,
        client_hello: Hello,
    ) -> Result<Self, SessionError> {
        let (inbox, capabilities) = SessionInbox::new(config.max_message_size);
        let receiver: Arc<dyn DataReceiver> = inbox.clone();

        let channel = opener.open(&config.subsystem, receiver).await?;
        info!("subsystem channel open");

        let hello_bytes = encode_legacy(client_hello.document().as_str().as_bytes());
        trace!(hello = client_hello.document().as_str(), "sending client hello");
        if let Err(e) = channel.send(&hello_bytes).await {
            inbox.close();
            let _ = channel.close().await;
            return Err(e.into());
        }

        let wait = config.operation_timeout();
        let outcome = match timeout(wait, capabilities).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::SessionClosed),
            Err(_) => Err(SessionError::Timeout {
                operation: "server hello",
                after: wait,
            }),
        };

        let server_hello = match outcome {
            Ok(hello) => hello,
            Err(e) => {
                warn!("capability exchange failed: {e}");
                inbox.close();
                if let Err(close_err) = channel.close().await {
                    debug!("closing channel after failed exchange: {close_err}");
                }
                return Err(e);
            }
        };

        Ok(Self {
            config,
            channel,
            inbox,
            client_hello,
            server_hello,
            message_ids: MessageIdCounter::new(),
        })
    }

    /// Sends `rpc` and waits for its reply.
    ///
    /// With `automatic_message_id`, the next counter value is written into
    /// the request's `message-id` attribute (inserting it if absent) and the
    /// reply must echo it.  Otherwise the request is sent unchanged and the
    /// reply is returned whatever its id.
    ///
    /// On timeout the session stays usable; a reply that arrives later is
    /// discarded.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionClosed`] once the session is closed.
    /// - [`SessionError::InvalidRequest`] if automatic ids are requested and
    ///   the root is not a NETCONF `<rpc>`.
    /// - [`SessionError::Timeout`] if no reply arrives in time.
    /// - [`SessionError::MalformedReply`] if the reply is not well-formed.
    /// - [`SessionError::MessageIdMismatch`] if the reply id differs.
    /// - [`SessionError::ProtocolViolation`] if the peer breaks framing.
    /// - [`SessionError::Channel`] if the request cannot be written.
    pub async fn send_receive_rpc(
        &mut self,
        rpc: &XmlDocument,
        automatic_message_id: bool,
    ) -> Result<XmlDocument, SessionError> {
        if self.inbox.state() == SessionState::Closed {
            return Err(SessionError::SessionClosed);
        }

        let (request, expected_id) = if automatic_message_id {
            rpc.expect_netconf_root("rpc")
                .map_err(SessionError::InvalidRequest)?;
            let id = self.message_ids.next().to_string();
            let stamped = rpc
                .with_root_attribute(MESSAGE_ID, &id)
                .map_err(SessionError::InvalidRequest)?;
            (Cow::Owned(stamped), Some(id))
        } else {
            (Cow::Borrowed(rpc), None)
        };

        let mode = self.inbox.mode();
        let wire = encode_message(mode, request.as_str().as_bytes())
            .map_err(|e| SessionError::ProtocolViolation(e.to_string()))?;

        let reply_slot = self.inbox.arm_reply()?;
        debug!(message_id = ?expected_id, %mode, len = wire.len(), "sending rpc");
        trace!(rpc = request.as_str(), "rpc body");
        if let Err(e) = self.channel.send(&wire).await {
            self.inbox.disarm_reply();
            return Err(e.into());
        }

        let wait = self.config.operation_timeout();
        let reply = match timeout(wait, reply_slot).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(SessionError::SessionClosed),
            Err(_) => {
                self.inbox.disarm_reply();
                warn!(message_id = ?expected_id, "no reply within {wait:?}");
                return Err(SessionError::Timeout {
                    operation: "rpc reply",
                    after: wait,
                });
            }
        };

        let reply = XmlDocument::from_utf8(&reply).map_err(SessionError::MalformedReply)?;

        if let Some(expected) = expected_id {
            let actual = reply.root_attribute(MESSAGE_ID);
            if actual != Some(expected.as_str()) {
                return Err(SessionError::MessageIdMismatch {
                    expected,
                    actual: actual.map(str::to_string),
                });
            }
        }

        debug!(message_id = ?reply.root_attribute(MESSAGE_ID), "rpc reply received");
        Ok(reply)
    }

    /// Closes the session and its channel.
    ///
    /// Closing an already closed session is a no-op.
    ///
    /// # Errors
    ///
    /// [`SessionError::Channel`] if the channel reports a failure while
    /// closing; the session is closed regardless.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        if !self.inbox.close() {
            return Ok(());
        }
        info!(session_id = ?self.session_id(), "closing session");
        match self.channel.close().await {
            Ok(()) | Err(ChannelError::Closed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The hello the server sent.
    pub fn server_hello(&self) -> &Hello {
        &self.server_hello
    }

    pub fn server_capabilities(&self) -> &CapabilitySet {
        self.server_hello.capabilities()
    }

    /// The hello this client sent.
    pub fn client_hello(&self) -> &Hello {
        &self.client_hello
    }

    /// The negotiated framing dialect; never `Unknown` on an open session.
    pub fn protocol_mode(&self) -> ProtocolMode {
        self.inbox.mode()
    }

    pub fn state(&self) -> SessionState {
        self.inbox.state()
    }

    /// The most recent automatic message-id, or 0 before the first one.
    pub fn last_message_id(&self) -> u64 {
        self.message_ids.current()
    }

    /// The server-assigned session id, if the server sent one.
    pub fn session_id(&self) -> Option<u32> {
        self.server_hello.session_id()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Drop for NetconfSession {
    fn drop(&mut self) {
        // The channel itself is torn down by its own Drop.
        if self.inbox.close() {
            debug!("session dropped without close()");
        }
    }
}

impl std::fmt::Debug for NetconfSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetconfSession")
            .field("subsystem", &self.config.subsystem)
            .field("state", &self.state())
            .field("mode", &self.protocol_mode())
            .field("session_id", &self.session_id())
            .finish()
    }
}
