//! Command headers and fragment reassembly.

use std::collections::{HashMap, VecDeque};

use bytes::{Buf, BytesMut};

use super::error::FrameError;

/// Size of the fixed command header.
pub const HEADER_LEN: usize = 12;

/// Size of the extra header on unreliable sends.
pub const UNRELIABLE_HEADER_LEN: usize = 4;

/// Size of the extra header on fragments.
pub const FRAGMENT_HEADER_LEN: usize = 20;

/// Transport command types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    /// Acknowledgement.
    Acknowledge = 1,
    /// Connection request.
    Connect = 2,
    /// Connection confirmation.
    VerifyConnect = 3,
    /// Peer disconnected.
    Disconnect = 4,
    /// Keep-alive.
    Ping = 5,
    /// Reliable message.
    SendReliable = 6,
    /// Unreliable message.
    SendUnreliable = 7,
    /// One fragment of a large reliable message.
    SendFragment = 8,
}

impl CommandType {
    /// Map a wire byte to a command type.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Acknowledge),
            2 => Some(Self::Connect),
            3 => Some(Self::VerifyConnect),
            4 => Some(Self::Disconnect),
            5 => Some(Self::Ping),
            6 => Some(Self::SendReliable),
            7 => Some(Self::SendUnreliable),
            8 => Some(Self::SendFragment),
            _ => None,
        }
    }

    /// Smallest valid total length for this command type.
    #[must_use]
    pub const fn min_length(self) -> usize {
        match self {
            Self::SendUnreliable => HEADER_LEN + UNRELIABLE_HEADER_LEN,
            Self::SendFragment => HEADER_LEN + FRAGMENT_HEADER_LEN,
            _ => HEADER_LEN,
        }
    }
}

/// Fixed command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Raw command type byte.
    pub command_type: u8,
    /// Channel id.
    pub channel: u8,
    /// Command flags.
    pub flags: u8,
    /// Total command length including this header.
    pub length: u32,
    /// Reliable sequence number.
    pub reliable_sequence: u32,
}

impl CommandHeader {
    /// Parse a header from the first [`HEADER_LEN`] bytes without consuming them.
    #[must_use]
    pub fn peek(bytes: &[u8]) -> Option<Self> {
        let mut buf = bytes.get(..HEADER_LEN)?;
        let command_type = buf.get_u8();
        let channel = buf.get_u8();
        let flags = buf.get_u8();
        let _reserved = buf.get_u8();
        let length = buf.get_u32();
        let reliable_sequence = buf.get_u32();
        Some(Self {
            command_type,
            channel,
            flags,
            length,
            reliable_sequence,
        })
    }
}

/// Extra header carried by a fragment command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Sequence of the first fragment; identifies the message.
    pub start_sequence: u32,
    /// Number of fragments in the message.
    pub fragment_count: u32,
    /// Index of this fragment.
    pub fragment_number: u32,
    /// Length of the reassembled message.
    pub total_length: u32,
    /// Byte offset of this fragment in the message.
    pub fragment_offset: u32,
}

impl FragmentHeader {
    /// Read the fragment header from the front of a command body.
    pub fn read(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < FRAGMENT_HEADER_LEN {
            return None;
        }
        Some(Self {
            start_sequence: buf.get_u32(),
            fragment_count: buf.get_u32(),
            fragment_number: buf.get_u32(),
            total_length: buf.get_u32(),
            fragment_offset: buf.get_u32(),
        })
    }
}

#[derive(Debug)]
struct PendingMessage {
    fragment_count: u32,
    total_length: u32,
    received: Vec<bool>,
    received_count: u32,
    bytes_received: usize,
    data: BytesMut,
}

/// What one fragment produced.
#[derive(Debug, Default)]
pub struct FragmentOutcome {
    /// Reassembly dropped to make room for this fragment's message.
    pub evicted: Option<u32>,
    /// Fully reassembled message bytes.
    pub complete: Option<BytesMut>,
}

/// Reassembles fragmented messages keyed by their start sequence.
#[derive(Debug)]
pub struct FragmentAssembler {
    pending: HashMap<u32, PendingMessage>,
    order: VecDeque<u32>,
    max_pending: usize,
    max_message_length: usize,
}

impl FragmentAssembler {
    /// Create an assembler with the given limits.
    #[must_use]
    pub fn new(max_pending: usize, max_message_length: usize) -> Self {
        Self {
            pending: HashMap::new(),
            order: VecDeque::new(),
            max_pending: max_pending.max(1),
            max_message_length,
        }
    }

    /// Number of incomplete messages held.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop all reassembly state.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.order.clear();
    }

    /// Accept one fragment.
    ///
    /// Invalid fragments are rejected without disturbing the message they
    /// claim to belong to. Duplicates are ignored.
    pub fn accept(
        &mut self,
        header: FragmentHeader,
        data: &[u8],
    ) -> Result<FragmentOutcome, FrameError> {
        let key = header.start_sequence;
        let invalid = |reason| FrameError::InvalidFragment {
            start_sequence: key,
            reason,
        };

        if header.total_length as usize > self.max_message_length {
            return Err(FrameError::MessageTooLarge {
                length: header.total_length,
                max: self.max_message_length,
            });
        }
        if header.fragment_count == 0 || header.fragment_count > header.total_length.max(1) {
            return Err(invalid("fragment count out of range"));
        }
        if header.fragment_number >= header.fragment_count {
            return Err(invalid("fragment number out of range"));
        }
        let offset = header.fragment_offset as usize;
        let end = offset.saturating_add(data.len());
        if end > header.total_length as usize {
            return Err(invalid("fragment exceeds message length"));
        }

        let mut outcome = FragmentOutcome::default();

        if let Some(existing) = self.pending.get(&key) {
            if existing.fragment_count != header.fragment_count
                || existing.total_length != header.total_length
            {
                return Err(invalid("fragment header disagrees with earlier fragments"));
            }
        } else {
            if self.pending.len() >= self.max_pending
                && let Some(oldest) = self.order.pop_front()
            {
                self.pending.remove(&oldest);
                outcome.evicted = Some(oldest);
            }
            let total = header.total_length as usize;
            let mut data = BytesMut::with_capacity(total);
            data.resize(total, 0);
            self.pending.insert(
                key,
                PendingMessage {
                    fragment_count: header.fragment_count,
                    total_length: header.total_length,
                    received: vec![false; header.fragment_count as usize],
                    received_count: 0,
                    bytes_received: 0,
                    data,
                },
            );
            self.order.push_back(key);
        }

        let Some(message) = self.pending.get_mut(&key) else {
            return Ok(outcome);
        };

        let number = header.fragment_number as usize;
        if message.received[number] {
            return Ok(outcome);
        }
        message.received[number] = true;
        message.received_count += 1;
        message.bytes_received += data.len();
        message.data[offset..end].copy_from_slice(data);

        if message.received_count < message.fragment_count {
            return Ok(outcome);
        }

        let complete = self.pending.remove(&key);
        self.order.retain(|k| *k != key);
        if let Some(message) = complete {
            if message.bytes_received != message.total_length as usize {
                return Err(invalid("reassembled length mismatch"));
            }
            outcome.complete = Some(message.data);
        }
        Ok(outcome)
    }
}
