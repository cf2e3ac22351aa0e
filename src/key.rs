//! Key types, comparators and hashing.
//!
//! Numeric keys are stored little-endian with the width of the dictionary's
//! key size (1 to 8 bytes). String keys are fixed-width byte arrays.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The interpretation of a dictionary's key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyType {
    /// Two's complement little-endian integer.
    NumericSigned = 0,
    /// Unsigned little-endian integer.
    NumericUnsigned = 1,
    /// Fixed-size byte array compared over its full width.
    CharArray = 2,
    /// Fixed-size buffer holding a NUL terminated string.
    NullTerminatedString = 3,
}

impl KeyType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(KeyType::NumericSigned),
            1 => Some(KeyType::NumericUnsigned),
            2 => Some(KeyType::CharArray),
            3 => Some(KeyType::NullTerminatedString),
            _ => None,
        }
    }

    /// Returns true for the integer key types.
    pub fn is_numeric(self) -> bool {
        matches!(self, KeyType::NumericSigned | KeyType::NumericUnsigned)
    }

    /// Compares two keys of the same width.
    ///
    /// Integers are compared from the most significant byte down. Signed keys
    /// first order by sign bit, after which two's complement bytes order the
    /// same way unsigned bytes do.
    pub fn compare(self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            KeyType::NumericUnsigned => compare_le_unsigned(a, b),
            KeyType::NumericSigned => {
                let a_neg = a.last().map_or(false, |msb| msb & 0x80 != 0);
                let b_neg = b.last().map_or(false, |msb| msb & 0x80 != 0);
                match (a_neg, b_neg) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => compare_le_unsigned(a, b),
                }
            }
            KeyType::CharArray => a.cmp(b),
            KeyType::NullTerminatedString => until_nul(a).cmp(until_nul(b)),
        }
    }

    /// Hash used by the hash-based engines.
    ///
    /// Numeric keys hash to their integer value so bucket arithmetic is a
    /// plain modulus over the key. String keys hash with CRC32.
    pub fn hash(self, key: &[u8]) -> u64 {
        match self {
            KeyType::NumericUnsigned => decode_u64(key),
            KeyType::NumericSigned => decode_i64(key) as u64,
            KeyType::CharArray => crc32fast::hash(key) as u64,
            KeyType::NullTerminatedString => crc32fast::hash(until_nul(key)) as u64,
        }
    }
}

fn compare_le_unsigned(a: &[u8], b: &[u8]) -> Ordering {
    if a.len() != b.len() {
        return a.len().cmp(&b.len());
    }
    for (x, y) in a.iter().rev().zip(b.iter().rev()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Encodes a signed integer key of `size` bytes.
pub fn encode_i64(value: i64, size: usize) -> Vec<u8> {
    value.to_le_bytes()[..size.min(8)].to_vec()
}

/// Encodes an unsigned integer key of `size` bytes.
pub fn encode_u64(value: u64, size: usize) -> Vec<u8> {
    value.to_le_bytes()[..size.min(8)].to_vec()
}

/// Encodes a string into a zero padded buffer of `size` bytes, truncating if needed.
pub fn encode_str(value: &str, size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    let n = value.len().min(size);
    buf[..n].copy_from_slice(&value.as_bytes()[..n]);
    buf
}

/// Decodes an unsigned little-endian key of up to 8 bytes.
pub fn decode_u64(key: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = key.len().min(8);
    buf[..n].copy_from_slice(&key[..n]);
    u64::from_le_bytes(buf)
}

/// Decodes a signed little-endian key of up to 8 bytes, sign-extending it.
pub fn decode_i64(key: &[u8]) -> i64 {
    let n = key.len().min(8);
    let negative = n > 0 && key[n - 1] & 0x80 != 0;
    let mut buf = if negative { [0xFFu8; 8] } else { [0u8; 8] };
    buf[..n].copy_from_slice(&key[..n]);
    i64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_compare() {
        let kt = KeyType::NumericUnsigned;
        assert_eq!(kt.compare(&encode_u64(1, 4), &encode_u64(256, 4)), Ordering::Less);
        assert_eq!(kt.compare(&encode_u64(300, 4), &encode_u64(299, 4)), Ordering::Greater);
        assert_eq!(kt.compare(&encode_u64(7, 4), &encode_u64(7, 4)), Ordering::Equal);
        assert_eq!(
            kt.compare(&encode_u64(u32::MAX as u64, 4), &encode_u64(0, 4)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_signed_compare_across_sign_boundary() {
        let kt = KeyType::NumericSigned;
        assert_eq!(kt.compare(&encode_i64(-1, 4), &encode_i64(0, 4)), Ordering::Less);
        assert_eq!(kt.compare(&encode_i64(-200, 4), &encode_i64(-3, 4)), Ordering::Less);
        assert_eq!(
            kt.compare(&encode_i64(i32::MIN as i64, 4), &encode_i64(i32::MAX as i64, 4)),
            Ordering::Less
        );
        assert_eq!(kt.compare(&encode_i64(5, 2), &encode_i64(-5, 2)), Ordering::Greater);
    }

    #[test]
    fn test_string_compare() {
        let kt = KeyType::NullTerminatedString;
        assert_eq!(
            kt.compare(&encode_str("ab", 6), &encode_str("abc", 6)),
            Ordering::Less
        );
        assert_eq!(kt.compare(b"ab\0xy", b"ab\0zz"), Ordering::Equal);
        assert_eq!(KeyType::CharArray.compare(b"ab\0xy", b"ab\0zz"), Ordering::Less);
    }

    #[test]
    fn test_hash_numeric_is_value() {
        assert_eq!(KeyType::NumericUnsigned.hash(&encode_u64(12, 4)), 12);
        assert_eq!(KeyType::NumericSigned.hash(&encode_i64(12, 4)), 12);
        assert_eq!(decode_i64(&encode_i64(-12, 4)), -12);
    }
}
