//! Decoder for the chunked (base:1.1) dialect.
//!
//! # Wire format
//!
//! ```text
//! message = 1*chunk end-of-chunks
//! chunk   = "\n#" <decimal length> "\n" <length bytes>
//! end     = "\n##\n"
//! ```
//!
//! # State machine
//!
//! The decoder alternates between two states:
//!
//! - `Header`: waiting for either a chunk header or the end-of-chunks marker.
//!   Headers are short (at most 14 bytes), so the decoder simply waits until
//!   the whole header is buffered before interpreting it.
//! - `Payload { remaining }`: copying chunk payload bytes into the message
//!   under assembly.  Payload bytes are moved as soon as they arrive, so a
//!   large chunk split over many pushes is never rescanned.
//!
//! A chunk header split over two pushes, a payload split over two pushes, or
//! several chunks and messages in one push are all handled by the same loop.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use super::framing::{
    FramingError, DEFAULT_MAX_MESSAGE_SIZE, END_OF_CHUNKS, MAX_CHUNK_SIZE, MAX_CHUNK_SIZE_DIGITS,
};

/// Parsing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Payload { remaining: usize },
}

/// What a complete header turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkHeader {
    Chunk(usize),
    EndOfChunks,
}

/// Outcome of one decoding step.
enum Step {
    NeedMore,
    Progress,
    Message(Bytes),
}

/// Reassembles chunked messages from arbitrarily split input.
#[derive(Debug)]
pub struct ChunkedDecoder {
    /// Received bytes not yet interpreted.
    buffer: BytesMut,
    /// Payload of the message under assembly.
    message: BytesMut,
    /// Chunks contributing to `message` so far.
    chunks: usize,
    state: State,
    max_message_size: usize,
}

impl ChunkedDecoder {
    /// Creates a decoder with the default message size limit.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates a decoder that rejects messages larger than `max_message_size`.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            message: BytesMut::new(),
            chunks: 0,
            state: State::Header,
            max_message_size,
        }
    }

    /// Pushes received bytes and returns every message they complete.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] for a malformed header, a chunk size that
    /// is not a base-10 number or is too large, or a message that exceeds the
    /// size limit.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>, FramingError> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        loop {
            match self.step()? {
                Step::NeedMore => break,
                Step::Progress => continue,
                Step::Message(message) => messages.push(message),
            }
        }
        Ok(messages)
    }

    fn step(&mut self) -> Result<Step, FramingError> {
        match self.state {
            State::Header => {
                let Some((header, consumed)) = parse_header(&self.buffer)? else {
                    return Ok(Step::NeedMore);
                };
                let _ = self.buffer.split_to(consumed);

                match header {
                    ChunkHeader::EndOfChunks => {
                        let message = self.message.split().freeze();
                        debug!(len = message.len(), chunks = self.chunks, "chunked message complete");
                        self.chunks = 0;
                        Ok(Step::Message(message))
                    }
                    ChunkHeader::Chunk(len) => {
                        let size = self.message.len().saturating_add(len);
                        if size > self.max_message_size {
                            return Err(FramingError::MessageTooLarge {
                                size,
                                limit: self.max_message_size,
                            });
                        }
                        self.message.reserve(len);
                        self.chunks += 1;
                        self.state = State::Payload { remaining: len };
                        Ok(Step::Progress)
                    }
                }
            }

            State::Payload { remaining } => {
                if remaining == 0 {
                    self.state = State::Header;
                    return Ok(Step::Progress);
                }
                if self.buffer.is_empty() {
                    return Ok(Step::NeedMore);
                }

                let take = remaining.min(self.buffer.len());
                let payload = self.buffer.split_to(take);
                self.message.extend_from_slice(&payload);
                self.state = State::Payload {
                    remaining: remaining - take,
                };
                Ok(Step::Progress)
            }
        }
    }

    /// Bytes held by the decoder that are not yet part of a returned message.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.message.len()
    }

    /// Whether the decoder is between messages with nothing buffered.
    pub fn is_idle(&self) -> bool {
        self.state == State::Header && self.buffer.is_empty() && self.message.is_empty()
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Interprets the header at the start of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, or the header and the number
/// of bytes it occupies.
fn parse_header(buf: &[u8]) -> Result<Option<(ChunkHeader, usize)>, FramingError> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != b'\n' {
        return Err(FramingError::UnexpectedByte {
            expected: "'\\n'",
            found: buf[0],
        });
    }
    if buf.len() < 2 {
        return Ok(None);
    }
    if buf[1] != b'#' {
        return Err(FramingError::UnexpectedByte {
            expected: "'#'",
            found: buf[1],
        });
    }
    if buf.len() < 3 {
        return Ok(None);
    }

    if buf[2] == b'#' {
        if buf.len() < END_OF_CHUNKS.len() {
            return Ok(None);
        }
        if buf[3] != b'\n' {
            return Err(FramingError::UnexpectedByte {
                expected: "'\\n'",
                found: buf[3],
            });
        }
        return Ok(Some((ChunkHeader::EndOfChunks, END_OF_CHUNKS.len())));
    }

    for (index, &byte) in buf.iter().enumerate().skip(2) {
        let digits = &buf[2..index];
        if byte == b'\n' {
            let len = parse_chunk_size(digits)?;
            return Ok(Some((ChunkHeader::Chunk(len), index + 1)));
        }
        if !byte.is_ascii_digit() || digits.len() >= MAX_CHUNK_SIZE_DIGITS {
            return Err(FramingError::InvalidChunkLength(
                String::from_utf8_lossy(&buf[2..=index]).into_owned(),
            ));
        }
    }
    Ok(None)
}

fn parse_chunk_size(digits: &[u8]) -> Result<usize, FramingError> {
    let text = std::str::from_utf8(digits)
        .map_err(|_| FramingError::InvalidChunkLength(String::from_utf8_lossy(digits).into_owned()))?;
    let size: u64 = text
        .parse()
        .map_err(|_| FramingError::InvalidChunkLength(text.to_string()))?;
    if size > MAX_CHUNK_SIZE {
        return Err(FramingError::ChunkTooLarge(size));
    }
    usize::try_from(size).map_err(|_| FramingError::ChunkTooLarge(size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(pieces: &[&[u8]]) -> Vec<Bytes> {
        let mut decoder = ChunkedDecoder::new();
        pieces
            .iter()
            .flat_map(|piece| decoder.push(piece).unwrap())
            .collect()
    }

    #[test]
    fn test_single_chunk_message() {
        // Arrange
        let mut decoder = ChunkedDecoder::new();

        // Act
        let messages = decoder.push(b"\n#4\n<ab>\n##\n").unwrap();

        // Assert
        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"<ab>");
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_payload_split_across_two_pushes() {
        let messages = decode_all(&[b"\n#4\n<a", b"b>\n##\n"]);

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"<ab>");
    }

    #[test]
    fn test_multiple_chunks_are_concatenated_in_order() {
        let messages = decode_all(&[b"\n#4\n<rpc\n#18\n-reply><ok/></rpc-\n#6\nreply>\n##\n"]);

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"<rpc-reply><ok/></rpc-reply>");
    }

    #[test]
    fn test_header_split_inside_the_length_digits() {
        let messages = decode_all(&[b"\n#1", b"2\nhello world!", b"\n#", b"#\n"]);

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"hello world!");
    }

    #[test]
    fn test_two_messages_in_one_push() {
        let messages = decode_all(&[b"\n#3\none\n##\n\n#3\ntwo\n##\n"]);

        assert_eq!(messages.len(), 2);
        assert_eq!(&messages[0][..], b"one");
        assert_eq!(&messages[1][..], b"two");
    }

    #[test]
    fn test_every_split_point_yields_the_same_payload() {
        let wire: &[u8] = b"\n#6\n<data>\n#8\nx</data>\n##\n";
        let whole = decode_all(&[wire]);

        for split in 1..wire.len() {
            let (head, tail) = wire.split_at(split);
            assert_eq!(decode_all(&[head, tail]), whole, "split at {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let wire: &[u8] = b"\n#5\nhello\n##\n";
        let pieces: Vec<&[u8]> = wire.chunks(1).collect();

        let messages = decode_all(&pieces);

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"hello");
    }

    #[test]
    fn test_non_numeric_length_is_a_violation() {
        let mut decoder = ChunkedDecoder::new();

        let result = decoder.push(b"\n#4x\n<ab>\n##\n");

        assert_eq!(result, Err(FramingError::InvalidChunkLength("4x".to_string())));
    }

    #[test]
    fn test_negative_length_is_a_violation() {
        let mut decoder = ChunkedDecoder::new();

        let result = decoder.push(b"\n#-4\n<ab>");

        assert_eq!(result, Err(FramingError::InvalidChunkLength("-".to_string())));
    }

    #[test]
    fn test_empty_length_is_a_violation() {
        let mut decoder = ChunkedDecoder::new();

        let result = decoder.push(b"\n#\n");

        assert!(matches!(result, Err(FramingError::InvalidChunkLength(_))));
    }

    #[test]
    fn test_chunk_size_above_the_maximum_is_rejected() {
        let mut decoder = ChunkedDecoder::new();

        let result = decoder.push(b"\n#4294967296\n");

        assert_eq!(result, Err(FramingError::ChunkTooLarge(4_294_967_296)));
    }

    #[test]
    fn test_too_many_length_digits_is_rejected() {
        let mut decoder = ChunkedDecoder::new();

        let result = decoder.push(b"\n#12345678901");

        assert!(matches!(result, Err(FramingError::InvalidChunkLength(_))));
    }

    #[test]
    fn test_garbage_between_chunks_is_a_violation() {
        let mut decoder = ChunkedDecoder::new();

        let result = decoder.push(b"\n#2\nokjunk");

        assert_eq!(
            result,
            Err(FramingError::UnexpectedByte {
                expected: "'\\n'",
                found: b'j'
            })
        );
    }

    #[test]
    fn test_message_size_limit_applies_across_chunks() {
        let mut decoder = ChunkedDecoder::with_max_message_size(6);

        let result = decoder.push(b"\n#4\nabcd\n#4\nefgh\n##\n");

        assert_eq!(result, Err(FramingError::MessageTooLarge { size: 8, limit: 6 }));
    }

    #[test]
    fn test_partial_message_is_counted_as_buffered() {
        let mut decoder = ChunkedDecoder::new();

        decoder.push(b"\n#10\nabc").unwrap();

        assert_eq!(decoder.buffered_len(), 3);
        assert!(!decoder.is_idle());
    }
}
