//! The channel abstraction a NETCONF session runs on.
//!
//! # Why traits here? (for beginners)
//!
//! The session does not care *how* bytes reach the NETCONF server.  In
//! production they travel through an SSH subsystem channel; in tests they
//! travel through an in-memory pipe or a mock.  The session only needs four
//! operations, which map one-to-one onto what an SSH library offers:
//!
//! | Operation               | Trait method                     |
//! |-------------------------|----------------------------------|
//! | open subsystem channel  | [`ChannelOpener::open`]          |
//! | send raw bytes          | [`SubsystemChannel::send`]       |
//! | deliver received bytes  | [`DataReceiver::on_data`]        |
//! | close channel           | [`SubsystemChannel::close`]      |
//!
//! Received bytes are *pushed* into a [`DataReceiver`] by whatever task or
//! thread the transport uses for reading.  The transport must call
//! `on_data` in arrival order and must not call it concurrently for the same
//! channel.
//!
//! **Dependency rule**: implementations live in `crate::infrastructure`;
//! this module must not import from there.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a channel transport.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The subsystem channel could not be opened.
    #[error("failed to open subsystem {subsystem:?}: {reason}")]
    OpenFailed { subsystem: String, reason: String },

    /// An I/O error occurred on the open channel.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel was already closed.
    #[error("channel is closed")]
    Closed,
}

/// Callback interface through which a transport delivers received bytes.
pub trait DataReceiver: Send + Sync {
    /// Called with each chunk of bytes read from the channel, in order.
    fn on_data(&self, data: &[u8]);

    /// Called once when the channel is closed by the peer or fails.
    fn on_closed(&self);
}

/// An open subsystem channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubsystemChannel: Send + Sync {
    /// Writes `data` to the channel.
    async fn send(&self, data: &[u8]) -> Result<(), ChannelError>;

    /// Closes the channel.  Later sends fail with [`ChannelError::Closed`].
    async fn close(&self) -> Result<(), ChannelError>;
}

/// Opens subsystem channels on an already authenticated connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelOpener: Send + Sync {
    /// Opens a channel for `subsystem` and starts delivering received bytes
    /// to `receiver`.
    async fn open(
        &self,
        subsystem: &str,
        receiver: Arc<dyn DataReceiver>,
    ) -> Result<Box<dyn SubsystemChannel>, ChannelError>;
}
