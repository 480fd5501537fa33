//! Frame decode errors.
//!
//! Every variant is local to one command or one reassembly; the decoder
//! reports it and keeps going with the rest of the stream.

use thiserror::Error;

/// A structural problem with one command or message payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Command length below the minimum for its type or above the limit.
    #[error("invalid command length {length} for type {command_type}")]
    InvalidLength {
        /// Command type byte.
        command_type: u8,
        /// Declared length.
        length: u32,
    },

    /// Command type outside the known set.
    #[error("unknown command type {command_type} ({length} bytes skipped)")]
    UnknownCommand {
        /// Command type byte.
        command_type: u8,
        /// Bytes skipped.
        length: u32,
    },

    /// Message payload does not start with the protocol signature.
    #[error("invalid message signature 0x{0:02x}")]
    InvalidSignature(u8),

    /// Message type byte outside request/response/event.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// Message payload is encrypted and cannot be decoded passively.
    #[error("encrypted message")]
    Encrypted,

    /// Value type tag outside the known set.
    #[error("unknown value type tag {0}")]
    UnknownValueType(u8),

    /// Payload ended before a value was complete.
    #[error("payload truncated: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes required by the next read.
        needed: usize,
        /// Bytes left in the payload.
        remaining: usize,
    },

    /// String bytes are not valid UTF-8.
    #[error("invalid utf-8 in string value")]
    InvalidUtf8,

    /// Nested containers exceed the depth limit.
    #[error("value nesting exceeds depth {0}")]
    DepthExceeded(usize),

    /// Fragment header is inconsistent with itself or its siblings.
    #[error("invalid fragment for message {start_sequence}: {reason}")]
    InvalidFragment {
        /// Reassembly key.
        start_sequence: u32,
        /// What failed validation.
        reason: &'static str,
    },

    /// Reassembled message would exceed the size limit.
    #[error("message of {length} bytes exceeds limit {max}")]
    MessageTooLarge {
        /// Declared total length.
        length: u32,
        /// Configured limit.
        max: usize,
    },

    /// Oldest pending reassembly dropped to make room.
    #[error("fragmented message {start_sequence} evicted before completion")]
    FragmentEvicted {
        /// Reassembly key of the dropped message.
        start_sequence: u32,
    },

    /// Stream ended inside a command.
    #[error("stream ended with {buffered} bytes of a partial command")]
    Truncated {
        /// Bytes discarded.
        buffered: usize,
    },

    /// Stream ended with reassemblies still waiting for fragments.
    #[error("stream ended with {pending} incomplete fragmented messages")]
    IncompleteFragments {
        /// Reassemblies discarded.
        pending: usize,
    },
}

impl FrameError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidLength { .. } => "invalid_length",
            Self::UnknownCommand { .. } => "unknown_command",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::UnknownMessageType(_) => "unknown_message_type",
            Self::Encrypted => "encrypted",
            Self::UnknownValueType(_) => "unknown_value_type",
            Self::UnexpectedEnd { .. } => "unexpected_end",
            Self::InvalidUtf8 => "invalid_utf8",
            Self::DepthExceeded(_) => "depth_exceeded",
            Self::InvalidFragment { .. } => "invalid_fragment",
            Self::MessageTooLarge { .. } => "message_too_large",
            Self::FragmentEvicted { .. } => "fragment_evicted",
            Self::Truncated { .. } => "truncated",
            Self::IncompleteFragments { .. } => "incomplete_fragments",
        }
    }
}
