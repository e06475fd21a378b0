//! Framing dialects, the negotiated protocol mode, and message encoders.
//!
//! NETCONF runs over a plain byte stream, so message boundaries have to be
//! marked in-band.  Two dialects exist:
//!
//! ```text
//! legacy (base:1.0):   <payload>]]>]]>
//! chunked (base:1.1):  \n#<len>\n<len bytes> [\n#<len>\n<len bytes> ...] \n##\n
//! ```
//!
//! The legacy sentinel is never escaped, so a payload must not contain it.
//! Chunked framing has no such restriction because every chunk carries its
//! own length.
//!
//! Which dialect governs a session is decided once, from the peer's hello
//! (see [`crate::domain::capabilities`]).  The hello itself is always sent
//! with the legacy sentinel because neither side knows the dialect yet.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::chunked::ChunkedDecoder;
use super::legacy::LegacyDecoder;

/// End-of-message sentinel of the legacy dialect.
pub const SENTINEL: &[u8] = b"]]>]]>";

/// Marker that terminates a chunked message.
pub const END_OF_CHUNKS: &[u8] = b"\n##\n";

/// Largest chunk size allowed by the chunked dialect (`4294967295`).
pub const MAX_CHUNK_SIZE: u64 = u32::MAX as u64;

/// Number of decimal digits needed to write [`MAX_CHUNK_SIZE`].
pub(crate) const MAX_CHUNK_SIZE_DIGITS: usize = 10;

/// Default upper bound for one reassembled message: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Framing-level protocol violations.
///
/// Every variant means the byte stream can no longer be trusted: once a
/// decoder has reported one of these, the bytes after it cannot be
/// re-synchronised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// A chunk header length was empty or contained a non-digit character.
    #[error("invalid chunk length {0:?}")]
    InvalidChunkLength(String),

    /// A chunk header declared a size above [`MAX_CHUNK_SIZE`].
    #[error("chunk size {0} exceeds the maximum of {MAX_CHUNK_SIZE}")]
    ChunkTooLarge(u64),

    /// A byte other than the expected header character was found where a
    /// chunk header or end-of-chunks marker must start.
    #[error("expected {expected} at a chunk boundary, found byte 0x{found:02X}")]
    UnexpectedByte { expected: &'static str, found: u8 },

    /// The message being assembled grew past the configured limit.
    #[error("message of {size} bytes exceeds the limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    /// Encoding or decoding was requested before the dialect was negotiated.
    #[error("framing dialect has not been negotiated yet")]
    ModeNotNegotiated,
}

/// The framing dialect in force on a session.
///
/// Starts as [`ProtocolMode::Unknown`] and moves to exactly one of the other
/// two values once the server hello has been parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProtocolMode {
    /// No hello received yet.
    #[default]
    Unknown,
    /// `]]>]]>`-terminated messages (base:1.0).
    LegacyDelimited,
    /// Length-prefixed chunks terminated by `\n##\n` (base:1.1).
    Chunked,
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolMode::Unknown => write!(f, "unknown"),
            ProtocolMode::LegacyDelimited => write!(f, "legacy-delimited"),
            ProtocolMode::Chunked => write!(f, "chunked"),
        }
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Appends the legacy sentinel to `body`.
///
/// # Examples
///
/// ```rust
/// use netconf_core::protocol::encode_legacy;
///
/// assert_eq!(&encode_legacy(b"<ok/>")[..], b"<ok/>]]>]]>");
/// ```
pub fn encode_legacy(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + SENTINEL.len());
    buf.put_slice(body);
    buf.put_slice(SENTINEL);
    buf.freeze()
}

/// Wraps `body` in a single chunk followed by the end-of-chunks marker.
///
/// The chunk length is the byte length of `body`.  An empty body produces the
/// end-of-chunks marker alone, since zero-sized chunks are not sent.
///
/// # Examples
///
/// ```rust
/// use netconf_core::protocol::encode_chunked;
///
/// assert_eq!(&encode_chunked(b"<ab>")[..], b"\n#4\n<ab>\n##\n");
/// ```
pub fn encode_chunked(body: &[u8]) -> Bytes {
    let header = format!("\n#{}\n", body.len());
    let mut buf = BytesMut::with_capacity(header.len() + body.len() + END_OF_CHUNKS.len());
    if !body.is_empty() {
        buf.put_slice(header.as_bytes());
        buf.put_slice(body);
    }
    buf.put_slice(END_OF_CHUNKS);
    buf.freeze()
}

/// Frames `body` according to `mode`.
///
/// # Errors
///
/// Returns [`FramingError::ModeNotNegotiated`] for [`ProtocolMode::Unknown`].
pub fn encode_message(mode: ProtocolMode, body: &[u8]) -> Result<Bytes, FramingError> {
    match mode {
        ProtocolMode::LegacyDelimited => Ok(encode_legacy(body)),
        ProtocolMode::Chunked => Ok(encode_chunked(body)),
        ProtocolMode::Unknown => Err(FramingError::ModeNotNegotiated),
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// A streaming decoder for whichever dialect was negotiated.
///
/// Feed it the byte chunks exactly as the transport delivers them; it returns
/// every message completed by that chunk, in order.
#[derive(Debug)]
pub enum MessageDecoder {
    Legacy(LegacyDecoder),
    Chunked(ChunkedDecoder),
}

impl MessageDecoder {
    /// Creates the decoder matching `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::ModeNotNegotiated`] for [`ProtocolMode::Unknown`].
    pub fn for_mode(mode: ProtocolMode, max_message_size: usize) -> Result<Self, FramingError> {
        match mode {
            ProtocolMode::LegacyDelimited => Ok(Self::Legacy(LegacyDecoder::with_max_message_size(
                max_message_size,
            ))),
            ProtocolMode::Chunked => Ok(Self::Chunked(ChunkedDecoder::with_max_message_size(
                max_message_size,
            ))),
            ProtocolMode::Unknown => Err(FramingError::ModeNotNegotiated),
        }
    }

    /// The dialect this decoder understands.
    pub fn mode(&self) -> ProtocolMode {
        match self {
            Self::Legacy(_) => ProtocolMode::LegacyDelimited,
            Self::Chunked(_) => ProtocolMode::Chunked,
        }
    }

    /// Pushes received bytes and returns all messages they complete.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] if the stream violates the dialect.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>, FramingError> {
        match self {
            Self::Legacy(decoder) => decoder.push(data),
            Self::Chunked(decoder) => decoder.push(data),
        }
    }

    /// Number of received bytes not yet part of a completed message.
    pub fn buffered_len(&self) -> usize {
        match self {
            Self::Legacy(decoder) => decoder.len(),
            Self::Chunked(decoder) => decoder.buffered_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_legacy_appends_sentinel() {
        let framed = encode_legacy(b"<rpc/>");
        assert_eq!(&framed[..], b"<rpc/>]]>]]>");
    }

    #[test]
    fn test_encode_chunked_uses_byte_length() {
        // Arrange – "é" is two bytes in UTF-8, so the length must be 3, not 2.
        let body = "é!".as_bytes();

        // Act
        let framed = encode_chunked(body);

        // Assert
        let mut expected = b"\n#3\n".to_vec();
        expected.extend_from_slice(body);
        expected.extend_from_slice(b"\n##\n");
        assert_eq!(&framed[..], &expected[..]);
    }

    #[test]
    fn test_encode_chunked_empty_body_is_end_marker_only() {
        assert_eq!(&encode_chunked(b"")[..], END_OF_CHUNKS);
    }

    #[test]
    fn test_encode_message_rejects_unknown_mode() {
        let result = encode_message(ProtocolMode::Unknown, b"<rpc/>");
        assert_eq!(result, Err(FramingError::ModeNotNegotiated));
    }

    #[test]
    fn test_decoder_for_unknown_mode_is_an_error() {
        let result = MessageDecoder::for_mode(ProtocolMode::Unknown, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(matches!(result, Err(FramingError::ModeNotNegotiated)));
    }

    #[test]
    fn test_decoder_decodes_what_the_matching_encoder_produced() {
        for mode in [ProtocolMode::LegacyDelimited, ProtocolMode::Chunked] {
            // Arrange
            let mut decoder = MessageDecoder::for_mode(mode, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
            let framed = encode_message(mode, b"<rpc-reply/>").unwrap();

            // Act
            let messages = decoder.push(&framed).unwrap();

            // Assert
            assert_eq!(decoder.mode(), mode);
            assert_eq!(messages.len(), 1, "mode {mode}");
            assert_eq!(&messages[0][..], b"<rpc-reply/>");
            assert_eq!(decoder.buffered_len(), 0);
        }
    }

    #[test]
    fn test_protocol_mode_defaults_to_unknown() {
        assert_eq!(ProtocolMode::default(), ProtocolMode::Unknown);
        assert_eq!(ProtocolMode::Chunked.to_string(), "chunked");
    }
}
