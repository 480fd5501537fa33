//! Protocol Message Model
//!
//! A decoded unit of the game's RPC protocol: a request, response, or event
//! with a numeric code and a parameter dictionary keyed by small integers.
//! Messages live only between decode and dispatch.

use std::collections::BTreeMap;
use std::fmt;

/// Parameter dictionary of a message.
pub type Parameters = BTreeMap<u8, Value>;

/// Message direction and semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    /// Client to server operation request.
    Request,
    /// Server reply to an operation request.
    Response,
    /// Server-initiated event.
    Event,
}

impl MessageKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loosely typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Raw byte sequence.
    Bytes(Vec<u8>),
    /// Homogeneous or heterogeneous array.
    Array(Vec<Value>),
    /// Key/value pairs in wire order.
    Dictionary(Vec<(Value, Value)>),
}

impl Value {
    /// Integral value widened to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Byte(v) => Some(i64::from(v)),
            Self::Short(v) => Some(i64::from(v)),
            Self::Int(v) => Some(i64::from(v)),
            Self::Long(v) => Some(v),
            _ => None,
        }
    }

    /// String contents.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Byte contents.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Array elements.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Boolean contents.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Short name of the variant, for logs.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Dictionary(_) => "dictionary",
        }
    }
}

/// One decoded request, response, or event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    /// Message kind.
    pub kind: MessageKind,
    /// Resolved operation or event code.
    pub code: u16,
    /// Server return code, present on responses only.
    pub return_code: Option<i16>,
    /// Server debug text, present on some responses.
    pub debug_message: Option<String>,
    /// Parameter dictionary.
    pub parameters: Parameters,
}

impl ProtocolMessage {
    /// Build a request.
    #[must_use]
    pub const fn request(code: u16, parameters: Parameters) -> Self {
        Self {
            kind: MessageKind::Request,
            code,
            return_code: None,
            debug_message: None,
            parameters,
        }
    }

    /// Build a successful response.
    #[must_use]
    pub const fn response(code: u16, parameters: Parameters) -> Self {
        Self {
            kind: MessageKind::Response,
            code,
            return_code: Some(0),
            debug_message: None,
            parameters,
        }
    }

    /// Build an event.
    #[must_use]
    pub const fn event(code: u16, parameters: Parameters) -> Self {
        Self {
            kind: MessageKind::Event,
            code,
            return_code: None,
            debug_message: None,
            parameters,
        }
    }

    /// Look up a parameter.
    #[must_use]
    pub fn parameter(&self, key: u8) -> Option<&Value> {
        self.parameters.get(&key)
    }
}
