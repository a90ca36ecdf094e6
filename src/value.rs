use std::fmt;

use crate::result::{Error, Result};

/// The uniform 8-byte row slot. Integer and bitfield columns reinterpret the
/// slot as an `i64`, double columns as an `f64`, real columns keep an `f32`
/// in the low four bytes, and string columns keep up to eight ASCII bytes
/// inline. Equality is bit equality.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Cell(u64);

impl Cell {
    pub const ZERO: Cell = Cell(0);

    #[inline]
    pub fn from_f64(v: f64) -> Self {
        Cell(v.to_bits())
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    #[inline]
    pub fn from_i64(v: i64) -> Self {
        Cell(v as u64)
    }

    #[inline]
    pub fn to_i64(self) -> i64 {
        self.0 as i64
    }

    #[inline]
    pub fn from_f32(v: f32) -> Self {
        Cell(u64::from(v.to_bits()))
    }

    #[inline]
    pub fn to_f32(self) -> f32 {
        f32::from_bits(self.0 as u32)
    }

    /// Inline string cell; fails when `text` does not fit the slot.
    pub fn from_str(text: &str) -> Result<Self> {
        if text.len() > 8 {
            return Err(Error::FormatViolation("string does not fit an 8-byte slot"));
        }
        let mut bytes = [0u8; 8];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        Ok(Cell::from_inline(bytes))
    }

    #[inline]
    pub(crate) fn from_inline(bytes: [u8; 8]) -> Self {
        Cell(u64::from_ne_bytes(bytes))
    }

    #[inline]
    pub(crate) fn inline_bytes(self) -> [u8; 8] {
        self.0.to_ne_bytes()
    }

    /// The inline text of a string cell, trailing NULs stripped.
    pub fn to_inline_string(self) -> String {
        let bytes = self.inline_bytes();
        String::from_utf8_lossy(trim_inline(&bytes)).into_owned()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({:#018x})", self.0)
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::ZERO
    }
}

fn trim_inline(bytes: &[u8; 8]) -> &[u8] {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(8);
    &bytes[..len]
}

/// Borrow the inline text of a string slot without copying.
pub(crate) fn inline_str(bytes: &[u8; 8]) -> Result<&str> {
    std::str::from_utf8(trim_inline(bytes))
        .map_err(|_| Error::FormatViolation("string cell is not valid UTF-8"))
}

/// Inline cell for a dictionary string, keeping the first eight bytes.
pub(crate) fn inline_truncated(text: &str) -> Cell {
    let mut bytes = [0u8; 8];
    let len = text.len().min(8);
    bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
    Cell::from_inline(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinterpretations_share_bits() {
        let c = Cell::from_f64(3.25);
        assert_eq!(c.to_f64(), 3.25);
        assert_eq!(Cell::from_i64(c.to_i64()), c);

        let r = Cell::from_f32(-1.5);
        assert_eq!(r.to_f32(), -1.5);
    }

    #[test]
    fn inline_strings_round_trip() {
        let c = Cell::from_str("lat").unwrap();
        assert_eq!(c.to_inline_string(), "lat");
        assert_eq!(inline_str(&c.inline_bytes()).unwrap(), "lat");

        let full = Cell::from_str("12345678").unwrap();
        assert_eq!(full.to_inline_string(), "12345678");

        assert!(Cell::from_str("123456789").is_err());
    }

    #[test]
    fn truncation_keeps_the_prefix() {
        let c = inline_truncated("observation");
        assert_eq!(c.to_inline_string(), "observat");
    }
}
