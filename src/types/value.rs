use serde::{Deserialize, Serialize};
use std::fmt;

/// Character encoding of an in-process text buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    /// One byte per character, null-terminated
    Ascii,
    /// Two bytes per character (UE1 `TCHAR` in Unicode builds), null-terminated
    Utf16,
}

impl TextEncoding {
    /// Bytes occupied by a single character
    pub fn unit_size(&self) -> usize {
        match self {
            TextEncoding::Ascii => 1,
            TextEncoding::Utf16 => 2,
        }
    }
}

/// Types a watcher can read from the target process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    I32,
    U32,
    U8,
    /// Fixed-capacity text buffer, capacity in characters (terminator included)
    Text { capacity: usize, encoding: TextEncoding },
}

impl ValueType {
    /// Returns the size in bytes read on every poll
    pub fn size(&self) -> usize {
        match self {
            ValueType::U8 => 1,
            ValueType::I32 | ValueType::U32 => 4,
            ValueType::Text { capacity, encoding } => capacity * encoding.unit_size(),
        }
    }

    /// Returns a human-readable name for this value type
    pub fn display_name(&self) -> &str {
        match self {
            ValueType::I32 => "Int32",
            ValueType::U32 => "UInt32",
            ValueType::U8 => "UInt8",
            ValueType::Text { .. } => "Text",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A value observed in the target process
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchValue {
    I32(i32),
    U32(u32),
    U8(u8),
    Text(String),
}

impl WatchValue {
    /// Decodes a value from raw little-endian bytes
    ///
    /// Text stops at the first null unit or at the end of the buffer, whichever
    /// comes first. Case is preserved.
    pub fn from_bytes(bytes: &[u8], value_type: ValueType) -> Option<Self> {
        match value_type {
            ValueType::U8 => bytes.first().map(|b| WatchValue::U8(*b)),
            ValueType::I32 if bytes.len() >= 4 => {
                Some(WatchValue::I32(i32::from_le_bytes(bytes[..4].try_into().ok()?)))
            }
            ValueType::U32 if bytes.len() >= 4 => {
                Some(WatchValue::U32(u32::from_le_bytes(bytes[..4].try_into().ok()?)))
            }
            ValueType::Text { encoding, .. } => Some(WatchValue::Text(decode_text(bytes, encoding))),
            _ => None,
        }
    }

    /// Returns the integer payload, if any
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WatchValue::I32(v) => Some(*v as i64),
            WatchValue::U32(v) => Some(*v as i64),
            WatchValue::U8(v) => Some(*v as i64),
            WatchValue::Text(_) => None,
        }
    }

    /// Returns the text payload, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WatchValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

fn decode_text(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Ascii => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        TextEncoding::Utf16 => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take_while(|&unit| unit != 0)
                .collect();
            String::from_utf16_lossy(&units)
        }
    }
}

impl fmt::Display for WatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchValue::I32(v) => write!(f, "{}", v),
            WatchValue::U32(v) => write!(f, "{}", v),
            WatchValue::U8(v) => write!(f, "{}", v),
            WatchValue::Text(v) => write!(f, "\"{}\"", v),
        }
    }
}
