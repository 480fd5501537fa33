//! Stream writer for replay fixtures.
//!
//! Produces well-formed command streams in the layout [`FrameDecoder`]
//! reads. Used to build capture replays and decoder tests; the relay itself
//! never sends anything, so this module only exists with the `test-util`
//! feature.
//!
//! [`FrameDecoder`]: super::frame::FrameDecoder

use bytes::{BufMut, Bytes, BytesMut};

use super::command::{CommandType, FRAGMENT_HEADER_LEN, HEADER_LEN, UNRELIABLE_HEADER_LEN};
use super::frame::{DEFAULT_EVENT_CODE_KEY, DEFAULT_OPERATION_CODE_KEY, MESSAGE_SIGNATURE};
use super::params::tag;
use crate::domain::protocol::{MessageKind, ProtocolMessage, Value};

fn len_u16(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Append a tagged value.
pub fn write_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::Null => buf.put_u8(tag::NULL),
        Value::Bool(b) => {
            buf.put_u8(tag::BOOLEAN);
            buf.put_u8(u8::from(*b));
        }
        Value::Byte(v) => {
            buf.put_u8(tag::BYTE);
            buf.put_u8(*v);
        }
        Value::Short(v) => {
            buf.put_u8(tag::SHORT);
            buf.put_i16(*v);
        }
        Value::Int(v) => {
            buf.put_u8(tag::INT);
            buf.put_i32(*v);
        }
        Value::Long(v) => {
            buf.put_u8(tag::LONG);
            buf.put_i64(*v);
        }
        Value::Float(v) => {
            buf.put_u8(tag::FLOAT);
            buf.put_f32(*v);
        }
        Value::Double(v) => {
            buf.put_u8(tag::DOUBLE);
            buf.put_f64(*v);
        }
        Value::String(s) => {
            let len = len_u16(s.len());
            buf.put_u8(tag::STRING);
            buf.put_u16(len);
            buf.put_slice(&s.as_bytes()[..usize::from(len)]);
        }
        Value::Bytes(b) => {
            buf.put_u8(tag::BYTE_ARRAY);
            buf.put_u32(len_u32(b.len()));
            buf.put_slice(b);
        }
        Value::Array(items) => {
            buf.put_u8(tag::OBJECT_ARRAY);
            buf.put_u16(len_u16(items.len()));
            for item in items.iter().take(usize::from(u16::MAX)) {
                write_value(buf, item);
            }
        }
        Value::Dictionary(entries) => {
            buf.put_u8(tag::HASHTABLE);
            buf.put_u16(len_u16(entries.len()));
            for (key, value) in entries.iter().take(usize::from(u16::MAX)) {
                write_value(buf, key);
                write_value(buf, value);
            }
        }
    }
}

/// Encode a message payload, signature included.
///
/// Codes above 255 are carried in the code override parameter.
#[must_use]
pub fn encode_message(message: &ProtocolMessage) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(MESSAGE_SIGNATURE);
    buf.put_u8(match message.kind {
        MessageKind::Request => 2,
        MessageKind::Response => 3,
        MessageKind::Event => 4,
    });
    buf.put_u8(u8::try_from(message.code).unwrap_or(0));

    if message.kind == MessageKind::Response {
        buf.put_i16(message.return_code.unwrap_or(0));
        match &message.debug_message {
            Some(text) => write_value(&mut buf, &Value::String(text.clone())),
            None => write_value(&mut buf, &Value::Null),
        }
    }

    let code_key = match message.kind {
        MessageKind::Event => DEFAULT_EVENT_CODE_KEY,
        MessageKind::Request | MessageKind::Response => DEFAULT_OPERATION_CODE_KEY,
    };
    let needs_override = message.code > u16::from(u8::MAX) && !message.parameters.contains_key(&code_key);

    let count = message.parameters.len() + usize::from(needs_override);
    buf.put_u16(len_u16(count));
    if needs_override {
        buf.put_u8(code_key);
        write_value(&mut buf, &Value::Int(i32::from(message.code)));
    }
    for (key, value) in &message.parameters {
        buf.put_u8(*key);
        write_value(&mut buf, value);
    }
    buf
}

/// Builds a command stream.
#[derive(Debug, Default)]
pub struct CommandWriter {
    buf: BytesMut,
    sequence: u32,
}

impl CommandWriter {
    /// Empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&mut self) -> u32 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    fn put_header(&mut self, command: CommandType, length: usize, sequence: u32) {
        self.buf.put_u8(command as u8);
        self.buf.put_u8(0);
        self.buf.put_u8(0);
        self.buf.put_u8(0);
        self.buf.put_u32(len_u32(length));
        self.buf.put_u32(sequence);
    }

    /// Append a reliable send.
    pub fn reliable(&mut self, message: &ProtocolMessage) -> &mut Self {
        let payload = encode_message(message);
        let sequence = self.next_sequence();
        self.put_header(CommandType::SendReliable, HEADER_LEN + payload.len(), sequence);
        self.buf.put_slice(&payload);
        self
    }

    /// Append an unreliable send.
    pub fn unreliable(&mut self, message: &ProtocolMessage) -> &mut Self {
        let payload = encode_message(message);
        let sequence = self.next_sequence();
        self.put_header(
            CommandType::SendUnreliable,
            HEADER_LEN + UNRELIABLE_HEADER_LEN + payload.len(),
            sequence,
        );
        self.buf.put_u32(sequence);
        self.buf.put_slice(&payload);
        self
    }

    /// Append a message split into fragments of at most `fragment_size` bytes.
    pub fn fragmented(&mut self, message: &ProtocolMessage, fragment_size: usize) -> &mut Self {
        let payload = encode_message(message);
        let size = fragment_size.max(1);
        let chunks: Vec<&[u8]> = payload.chunks(size).collect();
        let count = len_u32(chunks.len());
        let start_sequence = self.sequence.wrapping_add(1);

        let mut offset = 0usize;
        for (number, chunk) in chunks.iter().enumerate() {
            let sequence = self.next_sequence();
            self.put_header(
                CommandType::SendFragment,
                HEADER_LEN + FRAGMENT_HEADER_LEN + chunk.len(),
                sequence,
            );
            self.buf.put_u32(start_sequence);
            self.buf.put_u32(count);
            self.buf.put_u32(len_u32(number));
            self.buf.put_u32(len_u32(payload.len()));
            self.buf.put_u32(len_u32(offset));
            self.buf.put_slice(chunk);
            offset += chunk.len();
        }
        self
    }

    /// Append a keep-alive.
    pub fn ping(&mut self) -> &mut Self {
        let sequence = self.next_sequence();
        self.put_header(CommandType::Ping, HEADER_LEN, sequence);
        self
    }

    /// Append a connection request.
    pub fn connect(&mut self) -> &mut Self {
        let sequence = self.next_sequence();
        self.put_header(CommandType::Connect, HEADER_LEN, sequence);
        self
    }

    /// Append a disconnect.
    pub fn disconnect(&mut self) -> &mut Self {
        let sequence = self.next_sequence();
        self.put_header(CommandType::Disconnect, HEADER_LEN, sequence);
        self
    }

    /// Append arbitrary bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Take the stream built so far.
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
