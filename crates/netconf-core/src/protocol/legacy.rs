//! Decoder for the legacy `]]>]]>`-delimited dialect.
//!
//! # How the decoder works (for beginners)
//!
//! The transport hands us bytes in whatever pieces the network produced.  A
//! single piece may hold half a message, exactly one message, or the end of
//! one message followed by the start of the next.  The decoder therefore
//! keeps every byte it has not yet returned in an internal buffer and, after
//! each push, looks for the six-byte sentinel:
//!
//! ```text
//! push("<rpc-reply>..")          buffer: "<rpc-reply>.."             → nothing
//! push("..</rpc-reply>]]>]]><h") buffer: "<rpc-reply>....]]>]]><h"  → one message
//!                                buffer: "<h"                        (kept)
//! ```
//!
//! Everything before the first sentinel is the message payload.  Bytes after
//! the sentinel stay buffered and become the start of the next message.
//!
//! To avoid rescanning a large buffer on every push, the decoder remembers how
//! far it has already searched.  Only the last five bytes of the previous scan
//! are searched again, because a sentinel may straddle two pushes.

use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

use super::framing::{FramingError, DEFAULT_MAX_MESSAGE_SIZE, SENTINEL};

/// Accumulates bytes and splits them into sentinel-terminated messages.
#[derive(Debug)]
pub struct LegacyDecoder {
    /// Bytes received but not yet returned as part of a message.
    buffer: BytesMut,
    /// Offset up to which `buffer` is known not to start a sentinel.
    scanned: usize,
    /// Upper bound for a single message payload.
    max_message_size: usize,
}

impl LegacyDecoder {
    /// Creates a decoder with the default message size limit.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates a decoder that rejects messages larger than `max_message_size`.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            scanned: 0,
            max_message_size,
        }
    }

    /// Pushes received bytes and returns every message they complete.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::MessageTooLarge`] when the buffered, still
    /// unterminated message grows past the configured limit.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>, FramingError> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one()? {
            messages.push(message);
        }
        self.check_pending_size()?;
        Ok(messages)
    }

    /// Pushes received bytes and returns at most one completed message.
    ///
    /// Bytes after the first sentinel stay buffered; callers that switch
    /// dialects afterwards collect them with [`take_remaining`](Self::take_remaining).
    ///
    /// # Errors
    ///
    /// Same as [`push`](Self::push).
    pub fn push_one(&mut self, data: &[u8]) -> Result<Option<Bytes>, FramingError> {
        self.buffer.extend_from_slice(data);

        let message = self.try_extract_one()?;
        if message.is_none() {
            self.check_pending_size()?;
        }
        Ok(message)
    }

    fn check_pending_size(&self) -> Result<(), FramingError> {
        if self.buffer.len() > self.max_message_size + SENTINEL.len() {
            return Err(FramingError::MessageTooLarge {
                size: self.buffer.len(),
                limit: self.max_message_size,
            });
        }
        Ok(())
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>, FramingError> {
        let Some(position) = find_sentinel(&self.buffer, self.scanned) else {
            // A sentinel can start at most SENTINEL.len() - 1 bytes before the end.
            self.scanned = self.buffer.len().saturating_sub(SENTINEL.len() - 1);
            return Ok(None);
        };

        if position > self.max_message_size {
            return Err(FramingError::MessageTooLarge {
                size: position,
                limit: self.max_message_size,
            });
        }

        let message = self.buffer.split_to(position).freeze();
        self.buffer.advance(SENTINEL.len());
        self.scanned = 0;

        debug!(
            len = message.len(),
            remaining = self.buffer.len(),
            "legacy message complete"
        );
        Ok(Some(message))
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Removes and returns every buffered byte, resetting the decoder.
    ///
    /// Used when the dialect changes after the hello: bytes that arrived
    /// behind the hello belong to the next decoder.
    pub fn take_remaining(&mut self) -> Bytes {
        self.scanned = 0;
        self.buffer.split().freeze()
    }
}

impl Default for LegacyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the offset of the first sentinel at or after `from`.
fn find_sentinel(haystack: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(SENTINEL.len())
        .position(|window| window == SENTINEL)
        .map(|offset| from + offset)
}
