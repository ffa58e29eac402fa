//! Runtime values
//!
//! Every variable, constant and signal holds a [`Value`]: a number or a
//! piece of text. Text is a byte string in the language, so characters are
//! kept in the Latin-1 range and converted one-to-one to bytes at the file
//! and socket boundaries.

use splusc::ast::VarType;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(i64),
    Text(String),
}

impl Value {
    pub fn zero() -> Self {
        Value::Number(0)
    }

    pub fn empty_text() -> Self {
        Value::Text(String::new())
    }

    pub fn from_bool(b: bool) -> Self {
        Value::Number(if b { 1 } else { 0 })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    /// Numeric view; text yields its leading integer or 0
    pub fn as_number(&self) -> i64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => leading_integer(s).unwrap_or(0),
        }
    }

    /// Text view; numbers render in decimal
    pub fn as_text(&self) -> String {
        match self {
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    /// Strict numeric view: text must be a whole integer (surrounding
    /// whitespace allowed)
    pub fn try_number(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0,
            Value::Text(s) => !s.is_empty(),
        }
    }

    /// Equality used by `=` and switch cases: identical values, or both
    /// sides readable as the same integer (`"5"` equals `5`)
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if self == other {
            return true;
        }
        match (self.try_number(), other.try_number()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::zero()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(i64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Leading `[+-]digits` after optional whitespace
fn leading_integer(s: &str) -> Option<i64> {
    let trimmed = s.trim_start();
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse().ok()
}

/// Storage width of an integer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    U16,
    U32,
    I16,
    I32,
}

impl IntWidth {
    pub fn for_type(ty: &VarType) -> Option<IntWidth> {
        match ty {
            VarType::Integer => Some(IntWidth::U16),
            VarType::LongInteger => Some(IntWidth::U32),
            VarType::SignedInteger => Some(IntWidth::I16),
            VarType::SignedLongInteger => Some(IntWidth::I32),
            _ => None,
        }
    }

    /// Two's-complement wrap into the width
    pub fn wrap(self, n: i64) -> i64 {
        match self {
            IntWidth::U16 => n as u16 as i64,
            IntWidth::U32 => n as u32 as i64,
            IntWidth::I16 => n as i16 as i64,
            IntWidth::I32 => n as i32 as i64,
        }
    }
}

/// Text to bytes, one byte per character
pub fn text_to_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Bytes to text, one character per byte
pub fn bytes_to_text(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widths_wrap() {
        assert_eq!(IntWidth::U16.wrap(65535 + 1), 0);
        assert_eq!(IntWidth::U16.wrap(-1), 65535);
        assert_eq!(IntWidth::I16.wrap(32767 + 1), -32768);
        assert_eq!(IntWidth::U32.wrap(4_294_967_296), 0);
        assert_eq!(IntWidth::I32.wrap(2_147_483_648), -2_147_483_648);
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::from("42abc").as_number(), 42);
        assert_eq!(Value::from("  -7").as_number(), -7);
        assert_eq!(Value::from("abc").as_number(), 0);
        assert_eq!(Value::from("42abc").try_number(), None);
        assert_eq!(Value::from(" 5 ").try_number(), Some(5));
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::from("5").loosely_equals(&Value::Number(5)));
        assert!(Value::Number(5).loosely_equals(&Value::from("5")));
        assert!(!Value::from("5x").loosely_equals(&Value::Number(5)));
        assert!(Value::from("on").loosely_equals(&Value::from("on")));
    }

    #[test]
    fn test_latin1_bytes() {
        let text = "A\u{00ff}\r";
        assert_eq!(text_to_bytes(text), vec![0x41, 0xff, 0x0d]);
        assert_eq!(bytes_to_text(&[0x41, 0xff, 0x0d]), text);
    }
}
