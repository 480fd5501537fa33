//! Frame Decoder
//!
//! Turns the ordered byte stream of one connection/direction into protocol
//! messages. Implements [`tokio_util::codec::Decoder`] so it can sit behind a
//! `FramedRead`, or be driven chunk by chunk by the stream processor.
//!
//! # Error Handling
//!
//! Decode errors are yielded as items (`Some(Err(..))`) rather than codec
//! errors, so one bad command never ends the stream:
//!
//! - Implausible header: one `InvalidLength`, then a byte scan for the next
//!   plausible header.
//! - Unknown command type: one `UnknownCommand`, then exactly `length` bytes
//!   are skipped.
//! - Bad payload: one error, the command is consumed.
//! - Header claiming more bytes than remain at end of stream: one
//!   `Truncated`, then a byte scan over what is left.

use std::collections::VecDeque;
use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use super::command::{
    CommandHeader, CommandType, FragmentAssembler, FragmentHeader, HEADER_LEN,
    UNRELIABLE_HEADER_LEN,
};
use super::error::FrameError;
use super::params::{DuplicateKeyPolicy, PayloadReader};
use crate::domain::protocol::{MessageKind, ProtocolMessage, Value};

/// First byte of every message payload.
pub const MESSAGE_SIGNATURE: u8 = 0xF3;

/// Message type bit marking an encrypted payload.
pub const ENCRYPTED_FLAG: u8 = 0x80;

/// Parameter carrying the real operation code.
pub const DEFAULT_OPERATION_CODE_KEY: u8 = 253;

/// Parameter carrying the real event code.
pub const DEFAULT_EVENT_CODE_KEY: u8 = 252;

/// Decoder limits and policy points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Largest accepted command, header included.
    pub max_command_length: usize,
    /// Largest accepted reassembled message.
    pub max_message_length: usize,
    /// Reassemblies retained before the oldest is evicted.
    pub max_pending_fragments: usize,
    /// Handling of repeated parameter keys.
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Parameter overriding the header code on requests and responses.
    pub operation_code_key: u8,
    /// Parameter overriding the header code on events.
    pub event_code_key: u8,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_command_length: 64 * 1024,
            max_message_length: 1024 * 1024,
            max_pending_fragments: 64,
            duplicate_keys: DuplicateKeyPolicy::LastWins,
            operation_code_key: DEFAULT_OPERATION_CODE_KEY,
            event_code_key: DEFAULT_EVENT_CODE_KEY,
        }
    }
}

/// One decoded unit of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A request, response, or event.
    Message(ProtocolMessage),
    /// The peer disconnected.
    Disconnect,
    /// A connection handshake was seen; earlier session state is stale.
    Reconnect,
}

enum HeaderCheck {
    Plausible(CommandType, usize),
    UnknownType(u32),
    BadLength,
}

/// Stateful per-stream decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    config: DecoderConfig,
    fragments: FragmentAssembler,
    ready: VecDeque<Result<Frame, FrameError>>,
    skip_remaining: usize,
    scanning: bool,
}

impl FrameDecoder {
    /// Create a decoder.
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        let fragments =
            FragmentAssembler::new(config.max_pending_fragments, config.max_message_length);
        Self {
            config,
            fragments,
            ready: VecDeque::new(),
            skip_remaining: 0,
            scanning: false,
        }
    }

    /// Decoder configuration.
    #[must_use]
    pub const fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Incomplete fragmented messages held.
    #[must_use]
    pub fn pending_fragments(&self) -> usize {
        self.fragments.pending()
    }

    fn check_header(&self, header: &CommandHeader) -> HeaderCheck {
        let length = header.length as usize;
        let length_ok = |min: usize| length >= min && length <= self.config.max_command_length;
        match CommandType::from_u8(header.command_type) {
            Some(kind) if length_ok(kind.min_length()) => HeaderCheck::Plausible(kind, length),
            Some(_) => HeaderCheck::BadLength,
            None if length_ok(HEADER_LEN) => HeaderCheck::UnknownType(header.length),
            None => HeaderCheck::BadLength,
        }
    }

    /// Handle one complete command, queueing whatever it produced.
    fn process_command(&mut self, kind: CommandType, mut command: BytesMut) {
        command.advance(HEADER_LEN);
        match kind {
            CommandType::Acknowledge | CommandType::Ping => {}
            CommandType::Connect | CommandType::VerifyConnect => {
                self.fragments.clear();
                self.ready.push_back(Ok(Frame::Reconnect));
            }
            CommandType::Disconnect => {
                self.fragments.clear();
                self.ready.push_back(Ok(Frame::Disconnect));
            }
            CommandType::SendReliable => self.queue_payload(&command),
            CommandType::SendUnreliable => {
                command.advance(UNRELIABLE_HEADER_LEN);
                self.queue_payload(&command);
            }
            CommandType::SendFragment => {
                let Some(header) = FragmentHeader::read(&mut command) else {
                    return;
                };
                match self.fragments.accept(header, &command) {
                    Ok(outcome) => {
                        if let Some(start_sequence) = outcome.evicted {
                            self.ready
                                .push_back(Err(FrameError::FragmentEvicted { start_sequence }));
                        }
                        if let Some(message) = outcome.complete {
                            self.queue_payload(&message);
                        }
                    }
                    Err(e) => self.ready.push_back(Err(e)),
                }
            }
        }
    }

    fn queue_payload(&mut self, payload: &[u8]) {
        let item = self.decode_payload(payload).map(Frame::Message);
        self.ready.push_back(item);
    }

    /// Decode one message payload.
    pub fn decode_payload(&self, payload: &[u8]) -> Result<ProtocolMessage, FrameError> {
        let mut reader = PayloadReader::new(payload);

        let signature = reader.read_u8()?;
        if signature != MESSAGE_SIGNATURE {
            return Err(FrameError::InvalidSignature(signature));
        }

        let message_type = reader.read_u8()?;
        if message_type & ENCRYPTED_FLAG != 0 {
            return Err(FrameError::Encrypted);
        }

        let kind = match message_type {
            2 | 6 => MessageKind::Request,
            3 | 7 => MessageKind::Response,
            4 => MessageKind::Event,
            other => return Err(FrameError::UnknownMessageType(other)),
        };

        let header_code = reader.read_u8()?;
        let (return_code, debug_message) = if kind == MessageKind::Response {
            let return_code = reader.read_i16()?;
            let debug = match reader.read_tagged(0)? {
                Value::String(s) => Some(s),
                _ => None,
            };
            (Some(return_code), debug)
        } else {
            (None, None)
        };

        let parameters = reader.read_parameters(self.config.duplicate_keys)?;

        let code_key = match kind {
            MessageKind::Event => self.config.event_code_key,
            MessageKind::Request | MessageKind::Response => self.config.operation_code_key,
        };
        let code = parameters
            .get(&code_key)
            .and_then(Value::as_i64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or_else(|| u16::from(header_code));

        Ok(ProtocolMessage {
            kind,
            code,
            return_code,
            debug_message,
            parameters,
        })
    }

    fn reset_stream_state(&mut self) {
        self.skip_remaining = 0;
        self.scanning = false;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl Decoder for FrameDecoder {
    type Item = Result<Frame, FrameError>;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Ok(Some(item));
            }

            if self.skip_remaining > 0 {
                let n = self.skip_remaining.min(buf.len());
                buf.advance(n);
                self.skip_remaining -= n;
                if self.skip_remaining > 0 {
                    return Ok(None);
                }
            }

            let Some(header) = CommandHeader::peek(&buf[..]) else {
                return Ok(None);
            };

            let (kind, length) = match self.check_header(&header) {
                HeaderCheck::Plausible(kind, length) => (kind, length),
                HeaderCheck::UnknownType(length) if !self.scanning => {
                    self.skip_remaining = length as usize;
                    return Ok(Some(Err(FrameError::UnknownCommand {
                        command_type: header.command_type,
                        length,
                    })));
                }
                HeaderCheck::UnknownType(_) | HeaderCheck::BadLength => {
                    buf.advance(1);
                    if self.scanning {
                        continue;
                    }
                    self.scanning = true;
                    return Ok(Some(Err(FrameError::InvalidLength {
                        command_type: header.command_type,
                        length: header.length,
                    })));
                }
            };

            if buf.len() < length {
                buf.reserve(length - buf.len());
                return Ok(None);
            }

            self.scanning = false;
            let command = buf.split_to(length);
            self.process_command(kind, command);
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some(item) = self.decode(buf)? {
                return Ok(Some(item));
            }
            if buf.is_empty() {
                break;
            }

            let buffered = buf.len();
            let was_scanning = self.scanning;
            if CommandHeader::peek(&buf[..]).is_none() {
                // Tail shorter than a header.
                buf.clear();
                self.reset_stream_state();
                if was_scanning {
                    break;
                }
                return Ok(Some(Err(FrameError::Truncated { buffered })));
            }

            // A plausible header claims more than the stream holds; drop
            // only that header and look for commands behind it.
            buf.advance(1);
            self.scanning = true;
            if !was_scanning {
                return Ok(Some(Err(FrameError::Truncated { buffered })));
            }
        }
        self.reset_stream_state();

        let pending = self.fragments.pending();
        if pending > 0 {
            self.fragments.clear();
            return Ok(Some(Err(FrameError::IncompleteFragments { pending })));
        }

        Ok(None)
    }
}
