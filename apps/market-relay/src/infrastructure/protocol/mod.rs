//! Wire Protocol Decoding
//!
//! Command framing, fragment reassembly, and typed parameter decoding for
//! the game's binary RPC protocol.
//!
//! ```text
//! bytes ─▶ command header ─┬─▶ reliable / unreliable ─▶ payload ─▶ ProtocolMessage
//!                          └─▶ fragment ─▶ reassembly ─┘
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod params;
#[cfg(any(test, feature = "test-util"))]
pub mod writer;

pub use error::FrameError;
pub use frame::{DecoderConfig, Frame, FrameDecoder};
pub use params::DuplicateKeyPolicy;
#[cfg(any(test, feature = "test-util"))]
pub use writer::CommandWriter;
