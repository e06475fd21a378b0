//! Protocol module: framing dialects, streaming decoders and message ids.

pub mod chunked;
pub mod framing;
pub mod legacy;
pub mod message_id;

pub use chunked::ChunkedDecoder;
pub use framing::{
    encode_chunked, encode_legacy, encode_message, FramingError, MessageDecoder, ProtocolMode,
    DEFAULT_MAX_MESSAGE_SIZE, END_OF_CHUNKS, MAX_CHUNK_SIZE, SENTINEL,
};
pub use legacy::LegacyDecoder;
pub use message_id::MessageIdCounter;
