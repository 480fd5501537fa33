//! Typed value and parameter table decoding.
//!
//! Every value is prefixed by a one byte type tag unless it is an element of
//! a typed container, in which case the container carries the tag once.
//! Counts read from the wire are checked against the bytes left in the
//! payload before anything is allocated.

use bytes::Buf;

use super::error::FrameError;
use crate::domain::protocol::{Parameters, Value};

/// Maximum container nesting accepted in one value.
pub const MAX_DEPTH: usize = 32;

/// Wire type tags.
pub mod tag {
    /// Null / dynamic element type.
    pub const NULL: u8 = 42;
    /// Typed dictionary.
    pub const DICTIONARY: u8 = 68;
    /// String array.
    pub const STRING_ARRAY: u8 = 97;
    /// Unsigned byte.
    pub const BYTE: u8 = 98;
    /// 64-bit float.
    pub const DOUBLE: u8 = 100;
    /// 32-bit float.
    pub const FLOAT: u8 = 102;
    /// Hashtable with tagged keys and values.
    pub const HASHTABLE: u8 = 104;
    /// 32-bit integer.
    pub const INT: u8 = 105;
    /// 16-bit integer.
    pub const SHORT: u8 = 107;
    /// 64-bit integer.
    pub const LONG: u8 = 108;
    /// 32-bit integer array.
    pub const INT_ARRAY: u8 = 110;
    /// Boolean.
    pub const BOOLEAN: u8 = 111;
    /// UTF-8 string.
    pub const STRING: u8 = 115;
    /// Byte array.
    pub const BYTE_ARRAY: u8 = 120;
    /// Array with a single element tag.
    pub const TYPED_ARRAY: u8 = 121;
    /// Array of tagged elements.
    pub const OBJECT_ARRAY: u8 = 122;
}

/// What to keep when a parameter table repeats a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateKeyPolicy {
    /// Later entries overwrite earlier ones.
    #[default]
    LastWins,
    /// The first entry is kept; repeats are ignored.
    FirstWins,
}

impl DuplicateKeyPolicy {
    /// Parse from a config value (`last` or `first`), ignoring case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "last" | "last_wins" => Some(Self::LastWins),
            "first" | "first_wins" => Some(Self::FirstWins),
            _ => None,
        }
    }

    /// Config representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LastWins => "last",
            Self::FirstWins => "first",
        }
    }
}

/// Smallest encoded size of one untagged element with the given tag.
const fn min_size(tag: u8) -> usize {
    match tag {
        tag::BOOLEAN | tag::BYTE => 1,
        tag::SHORT | tag::STRING | tag::STRING_ARRAY | tag::OBJECT_ARRAY | tag::HASHTABLE => 2,
        tag::TYPED_ARRAY => 3,
        tag::INT | tag::FLOAT | tag::BYTE_ARRAY | tag::INT_ARRAY | tag::DICTIONARY => 4,
        tag::LONG | tag::DOUBLE => 8,
        _ => 0,
    }
}

const fn is_dynamic(tag: u8) -> bool {
    tag == 0 || tag == tag::NULL
}

/// Smallest encoded size of one dictionary key or value.
const fn min_element_size(tag: u8) -> usize {
    if is_dynamic(tag) { 1 } else { min_size(tag) }
}

/// Cursor over one message payload.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    /// Wrap a payload.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn ensure(&self, needed: usize) -> Result<(), FrameError> {
        if self.buf.len() < needed {
            return Err(FrameError::UnexpectedEnd {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    fn ensure_elements(&self, count: usize, element_size: usize) -> Result<(), FrameError> {
        self.ensure(count.saturating_mul(element_size))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FrameError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, FrameError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, FrameError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    /// Read a big-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16, FrameError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    fn read_u32(&mut self) -> Result<u32, FrameError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    fn read_i32(&mut self) -> Result<i32, FrameError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    fn read_string(&mut self) -> Result<String, FrameError> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| FrameError::InvalidUtf8)
    }

    /// Read a tag byte followed by its value.
    pub fn read_tagged(&mut self, depth: usize) -> Result<Value, FrameError> {
        let tag = self.read_u8()?;
        self.read_value(tag, depth)
    }

    fn read_element(&mut self, tag: u8, depth: usize) -> Result<Value, FrameError> {
        if is_dynamic(tag) {
            self.read_tagged(depth)
        } else {
            self.read_value(tag, depth)
        }
    }

    /// Read an untagged value of the given type.
    pub fn read_value(&mut self, tag: u8, depth: usize) -> Result<Value, FrameError> {
        if depth > MAX_DEPTH {
            return Err(FrameError::DepthExceeded(MAX_DEPTH));
        }

        let value = match tag {
            tag::NULL => Value::Null,
            tag::BOOLEAN => Value::Bool(self.read_u8()? != 0),
            tag::BYTE => Value::Byte(self.read_u8()?),
            tag::SHORT => Value::Short(self.read_i16()?),
            tag::INT => Value::Int(self.read_i32()?),
            tag::LONG => {
                self.ensure(8)?;
                Value::Long(self.buf.get_i64())
            }
            tag::FLOAT => {
                self.ensure(4)?;
                Value::Float(self.buf.get_f32())
            }
            tag::DOUBLE => {
                self.ensure(8)?;
                Value::Double(self.buf.get_f64())
            }
            tag::STRING => Value::String(self.read_string()?),
            tag::BYTE_ARRAY => {
                let len = self.read_u32()? as usize;
                Value::Bytes(self.take(len)?.to_vec())
            }
            tag::INT_ARRAY => {
                let count = self.read_u32()? as usize;
                self.ensure_elements(count, 4)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Value::Int(self.buf.get_i32()));
                }
                Value::Array(items)
            }
            tag::STRING_ARRAY => {
                let count = usize::from(self.read_u16()?);
                self.ensure_elements(count, 2)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Value::String(self.read_string()?));
                }
                Value::Array(items)
            }
            tag::TYPED_ARRAY => {
                let count = usize::from(self.read_u16()?);
                let element = self.read_u8()?;
                self.ensure_elements(count, min_size(element))?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(element, depth + 1)?);
                }
                Value::Array(items)
            }
            tag::OBJECT_ARRAY => {
                let count = usize::from(self.read_u16()?);
                self.ensure_elements(count, 1)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_tagged(depth + 1)?);
                }
                Value::Array(items)
            }
            tag::HASHTABLE => {
                let count = usize::from(self.read_u16()?);
                self.ensure_elements(count, 2)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = self.read_tagged(depth + 1)?;
                    let value = self.read_tagged(depth + 1)?;
                    entries.push((key, value));
                }
                Value::Dictionary(entries)
            }
            tag::DICTIONARY => {
                let key_tag = self.read_u8()?;
                let value_tag = self.read_u8()?;
                let count = usize::from(self.read_u16()?);
                let entry_size = min_element_size(key_tag) + min_element_size(value_tag);
                self.ensure_elements(count, entry_size)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = self.read_element(key_tag, depth + 1)?;
                    let value = self.read_element(value_tag, depth + 1)?;
                    entries.push((key, value));
                }
                Value::Dictionary(entries)
            }
            other => return Err(FrameError::UnknownValueType(other)),
        };

        Ok(value)
    }

    /// Read a parameter table: a `u16` count of `(key, tag, value)` entries.
    pub fn read_parameters(&mut self, policy: DuplicateKeyPolicy) -> Result<Parameters, FrameError> {
        let count = usize::from(self.read_u16()?);
        self.ensure_elements(count, 2)?;

        let mut parameters = Parameters::new();
        for _ in 0..count {
            let key = self.read_u8()?;
            let value = self.read_tagged(0)?;
            match policy {
                DuplicateKeyPolicy::LastWins => {
                    parameters.insert(key, value);
                }
                DuplicateKeyPolicy::FirstWins => {
                    parameters.entry(key).or_insert(value);
                }
            }
        }
        Ok(parameters)
    }
}
