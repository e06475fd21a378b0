//! Receive-side state of a session: the delivery context's half.
//!
//! # Two contexts, one inbox (for beginners)
//!
//! Bytes from the server arrive on the transport's reader task (the
//! *delivery context*) while the caller of
//! [`NetconfSession::send_receive_rpc`](super::session::NetconfSession::send_receive_rpc)
//! waits on its own task (the *caller context*).  The [`SessionInbox`] is the
//! only state they share:
//!
//! ```text
//! delivery context                      caller context
//! ────────────────                      ──────────────
//! on_data(bytes)                        arm_reply()  → oneshot::Receiver
//!   ├─ phase AwaitingCapabilities         send request
//!   │    └─ hello complete → slot  ────▶  await receiver (with timeout)
//!   └─ phase Idle/AwaitingReply
//!        └─ message complete → slot ───▶  reply bytes
//! ```
//!
//! Each wait is a single-slot rendezvous: the caller parks a
//! `oneshot::Sender` in the inbox and awaits the matching receiver.  "Reply
//! not yet arrived" is simply an empty receiver, so no separate ready flag
//! has to be set and reset.
//!
//! The lock around [`Inbox`] is only ever held for the duration of one
//! synchronous callback or one slot update; it is never held across an
//! `.await`, so a plain `std::sync::Mutex` is used.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use bytes::Bytes;
use netconf_core::protocol::LegacyDecoder;
use netconf_core::{Hello, HelloError, MessageDecoder, ProtocolMode, XmlDocument};
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use super::channel::DataReceiver;
use super::session::SessionError;

/// Observable lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Client hello sent; waiting for the server hello.
    AwaitingCapabilities,
    /// Negotiated, no request outstanding.
    Idle,
    /// A request was sent and its reply has not arrived yet.
    AwaitingReply,
    /// Closed locally, by the peer, or after a framing violation.  Terminal.
    Closed,
}

type Slot<T> = oneshot::Sender<Result<T, SessionError>>;

/// State owned by the delivery context, guarded by the inbox lock.
struct Inbox {
    state: SessionState,
    /// Accumulates the server hello; always sentinel-framed.
    hello: LegacyDecoder,
    /// Decoder for the negotiated dialect, created once the hello is parsed.
    decoder: Option<MessageDecoder>,
    capabilities_slot: Option<Slot<Hello>>,
    reply_slot: Option<Slot<Bytes>>,
}

impl Inbox {
    /// Hands a completed message to the waiting caller, if any.
    fn deliver(&mut self, message: Bytes) {
        trace!(reply = %String::from_utf8_lossy(&message), "message received");
        match self.reply_slot.take() {
            Some(slot) => {
                self.state = SessionState::Idle;
                if slot.send(Ok(message)).is_err() {
                    warn!("reply arrived after the caller stopped waiting; discarded");
                }
            }
            None => warn!(len = message.len(), "no request is waiting; discarding message"),
        }
    }

    /// Moves to `Closed` and fails every parked waiter with `make_error()`.
    fn close_with(&mut self, make_error: impl Fn() -> SessionError) {
        self.state = SessionState::Closed;
        self.decoder = None;
        if let Some(slot) = self.capabilities_slot.take() {
            let _ = slot.send(Err(make_error()));
        }
        if let Some(slot) = self.reply_slot.take() {
            let _ = slot.send(Err(make_error()));
        }
    }
}

/// The shared receive state of one session.
///
/// Registered with the transport as its [`DataReceiver`].
pub struct SessionInbox {
    /// Written once by the hello path, read lock-free afterwards.
    mode: OnceLock<ProtocolMode>,
    max_message_size: usize,
    inner: Mutex<Inbox>,
}

impl SessionInbox {
    /// Creates an inbox waiting for the server hello.
    ///
    /// Returns the inbox and the receiving half of the capabilities
    /// rendezvous.
    pub fn new(max_message_size: usize) -> (Arc<Self>, oneshot::Receiver<Result<Hello, SessionError>>) {
        let (tx, rx) = oneshot::channel();
        let inbox = Self {
            mode: OnceLock::new(),
            max_message_size,
            inner: Mutex::new(Inbox {
                state: SessionState::AwaitingCapabilities,
                hello: LegacyDecoder::with_max_message_size(max_message_size),
                decoder: None,
                capabilities_slot: Some(tx),
                reply_slot: None,
            }),
        };
        (Arc::new(inbox), rx)
    }

    fn lock(&self) -> MutexGuard<'_, Inbox> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The negotiated dialect, or [`ProtocolMode::Unknown`] before the hello.
    pub fn mode(&self) -> ProtocolMode {
        self.mode.get().copied().unwrap_or_default()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Parks a fresh reply slot and moves to `AwaitingReply`.
    ///
    /// Any slot left over from an abandoned request is dropped first, so a
    /// stale reply can never satisfy the new wait.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionClosed`] once closed, and
    /// [`SessionError::NotNegotiated`] before the server hello.
    pub fn arm_reply(&self) -> Result<oneshot::Receiver<Result<Bytes, SessionError>>, SessionError> {
        let mut inbox = self.lock();
        match inbox.state {
            SessionState::Closed => return Err(SessionError::SessionClosed),
            SessionState::AwaitingCapabilities => return Err(SessionError::NotNegotiated),
            SessionState::Idle | SessionState::AwaitingReply => {}
        }
        let (tx, rx) = oneshot::channel();
        inbox.reply_slot = Some(tx);
        inbox.state = SessionState::AwaitingReply;
        Ok(rx)
    }

    /// Abandons the outstanding wait after a timeout or a failed send.
    pub fn disarm_reply(&self) {
        let mut inbox = self.lock();
        inbox.reply_slot = None;
        if inbox.state == SessionState::AwaitingReply {
            inbox.state = SessionState::Idle;
        }
    }

    /// Closes the inbox.  Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut inbox = self.lock();
        if inbox.state == SessionState::Closed {
            return false;
        }
        inbox.close_with(|| SessionError::SessionClosed);
        true
    }

    fn negotiate(&self, inbox: &mut Inbox, data: &[u8]) {
        let message = match inbox.hello.push_one(data) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                warn!("server hello could not be framed: {e}");
                let reason = e.to_string();
                inbox.close_with(|| SessionError::MalformedCapabilities(reason.clone()));
                return;
            }
        };

        let hello = match XmlDocument::from_utf8(&message)
            .map_err(HelloError::from)
            .and_then(Hello::from_document)
        {
            Ok(hello) => hello,
            Err(e) => {
                warn!("server hello rejected: {e}");
                let reason = e.to_string();
                inbox.close_with(|| SessionError::MalformedCapabilities(reason.clone()));
                return;
            }
        };

        let mode = hello.protocol_mode();
        let decoder = match MessageDecoder::for_mode(mode, self.max_message_size) {
            Ok(decoder) => decoder,
            Err(e) => {
                let reason = e.to_string();
                inbox.close_with(|| SessionError::ProtocolViolation(reason.clone()));
                return;
            }
        };
        if self.mode.set(mode).is_err() {
            error!("protocol mode was already set; ignoring second hello");
            return;
        }

        info!(%mode, session_id = ?hello.session_id(), "server capabilities received");
        inbox.decoder = Some(decoder);
        inbox.state = SessionState::Idle;
        let trailing = inbox.hello.take_remaining();

        match inbox.capabilities_slot.take() {
            Some(slot) => {
                if slot.send(Ok(hello)).is_err() {
                    warn!("server hello arrived after the caller stopped waiting");
                }
            }
            None => warn!("server hello arrived with nobody waiting for it"),
        }

        if !trailing.is_empty() {
            debug!(len = trailing.len(), "bytes received behind the server hello");
            self.decode(inbox, &trailing);
        }
    }

    fn decode(&self, inbox: &mut Inbox, data: &[u8]) {
        let Some(decoder) = inbox.decoder.as_mut() else {
            return;
        };
        match decoder.push(data) {
            Ok(messages) => {
                for message in messages {
                    inbox.deliver(message);
                }
            }
            Err(e) => {
                error!("framing violation, closing session: {e}");
                let reason = e.to_string();
                inbox.close_with(|| SessionError::ProtocolViolation(reason.clone()));
            }
        }
    }
}

impl DataReceiver for SessionInbox {
    fn on_data(&self, data: &[u8]) {
        let mut inbox = self.lock();
        match inbox.state {
            SessionState::Closed => {
                debug!(len = data.len(), "dropping bytes received after close");
            }
            SessionState::AwaitingCapabilities => self.negotiate(&mut inbox, data),
            SessionState::Idle | SessionState::AwaitingReply => self.decode(&mut inbox, data),
        }
    }

    fn on_closed(&self) {
        let mut inbox = self.lock();
        if inbox.state != SessionState::Closed {
            info!("subsystem channel closed by peer");
            inbox.close_with(|| SessionError::SessionClosed);
        }
    }
}
