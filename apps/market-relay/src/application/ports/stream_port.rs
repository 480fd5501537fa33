//! Stream Port (Driver Port)
//!
//! Input from the flow reassembler: ordered chunks for one connection and
//! direction. Chunk boundaries carry no meaning.

use bytes::Bytes;

/// One item from the flow reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Next bytes of the stream.
    Data(Bytes),
    /// The connection closed; no more bytes follow.
    End,
}

impl StreamChunk {
    /// Wrap a byte slice.
    #[must_use]
    pub fn data(bytes: impl Into<Bytes>) -> Self {
        Self::Data(bytes.into())
    }
}
