//! Fixed-layout record framing shared by every engine.
//!
//! Format:
//! ```text
//! [status: 1 byte][key: key_size bytes][value: value_size bytes]
//! ```
//!
//! Status bytes are the signed sentinels `EMPTY = -1`, `DELETED = -2` and
//! `IN_USE = -3`.

use crate::error::{Error, Result};
use crate::key::KeyType;
use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;

/// Occupancy of a record slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Never written.
    Empty,
    /// Tombstone left by a delete.
    Deleted,
    /// Holds a live record.
    InUse,
}

impl RecordStatus {
    /// The on-disk byte for this status.
    pub fn to_byte(self) -> u8 {
        match self {
            RecordStatus::Empty => -1i8 as u8,
            RecordStatus::Deleted => -2i8 as u8,
            RecordStatus::InUse => -3i8 as u8,
        }
    }

    /// Parses an on-disk status byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte as i8 {
            -1 => Ok(RecordStatus::Empty),
            -2 => Ok(RecordStatus::Deleted),
            -3 => Ok(RecordStatus::InUse),
            other => Err(Error::corruption(format!("invalid record status {}", other))),
        }
    }
}

/// A decoded key/value pair handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Key bytes, `key_size` long.
    pub key: Vec<u8>,
    /// Value bytes, `value_size` long.
    pub value: Vec<u8>,
}

impl Record {
    /// Creates a record from borrowed key and value bytes.
    pub fn new(key: &[u8], value: &[u8]) -> Self {
        Self { key: key.to_vec(), value: value.to_vec() }
    }
}

/// Key type and sizes of a dictionary. Fixed for the life of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// How key bytes are compared and hashed.
    pub key_type: KeyType,
    /// Width of every key in bytes.
    pub key_size: usize,
    /// Width of every value in bytes.
    pub value_size: usize,
}

impl RecordLayout {
    /// Creates a layout.
    pub fn new(key_type: KeyType, key_size: usize, value_size: usize) -> Self {
        Self { key_type, key_size, value_size }
    }

    /// Size of one framed record: status byte, key and value.
    pub fn record_size(&self) -> usize {
        1 + self.key_size + self.value_size
    }

    /// Compares two keys with this layout's comparator.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.key_type.compare(a, b)
    }

    /// Hashes a key for the hash-based engines.
    pub fn hash(&self, key: &[u8]) -> u64 {
        self.key_type.hash(key)
    }

    /// Rejects keys of the wrong width.
    pub fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(Error::invalid_argument(format!(
                "key is {} bytes, dictionary expects {}",
                key.len(),
                self.key_size
            )));
        }
        Ok(())
    }

    /// Rejects values of the wrong width.
    pub fn check_value(&self, value: &[u8]) -> Result<()> {
        if value.len() != self.value_size {
            return Err(Error::invalid_argument(format!(
                "value is {} bytes, dictionary expects {}",
                value.len(),
                self.value_size
            )));
        }
        Ok(())
    }

    /// Frames a record.
    pub fn encode(&self, status: RecordStatus, key: &[u8], value: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.record_size());
        buf.put_u8(status.to_byte());
        buf.put_slice(key);
        buf.put_slice(value);
        buf.freeze()
    }

    /// A zeroed record carrying only a status byte.
    pub fn encode_blank(&self, status: RecordStatus) -> Bytes {
        let mut buf = BytesMut::zeroed(self.record_size());
        buf[0] = status.to_byte();
        buf.freeze()
    }

    /// Splits a framed record into status, key and value.
    pub fn decode<'a>(&self, buf: &'a [u8]) -> Result<(RecordStatus, &'a [u8], &'a [u8])> {
        if buf.len() < self.record_size() {
            return Err(Error::corruption(format!(
                "record too short: {} < {}",
                buf.len(),
                self.record_size()
            )));
        }
        let status = RecordStatus::from_byte(buf[0])?;
        let key_end = 1 + self.key_size;
        Ok((status, &buf[1..key_end], &buf[key_end..key_end + self.value_size]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::encode_u64;

    #[test]
    fn test_encode_layout() {
        let layout = RecordLayout::new(KeyType::NumericUnsigned, 4, 3);
        let encoded = layout.encode(RecordStatus::InUse, &encode_u64(9, 4), b"abc");
        assert_eq!(encoded.len(), 8);
        assert_eq!(encoded[0] as i8, -3);
        assert_eq!(&encoded[1..5], &[9, 0, 0, 0]);
        assert_eq!(&encoded[5..], b"abc");

        let (status, key, value) = layout.decode(&encoded).unwrap();
        assert_eq!(status, RecordStatus::InUse);
        assert_eq!(key, &[9, 0, 0, 0]);
        assert_eq!(value, b"abc");
    }

    #[test]
    fn test_blank_and_bad_status() {
        let layout = RecordLayout::new(KeyType::CharArray, 2, 2);
        let blank = layout.encode_blank(RecordStatus::Empty);
        assert_eq!(layout.decode(&blank).unwrap().0, RecordStatus::Empty);

        let bad = [7u8, 0, 0, 0, 0];
        assert!(matches!(layout.decode(&bad), Err(Error::Corruption(_))));
        assert!(layout.decode(&blank[..3]).is_err());
    }

    #[test]
    fn test_size_checks() {
        let layout = RecordLayout::new(KeyType::NumericSigned, 4, 10);
        assert!(layout.check_key(&[0; 4]).is_ok());
        assert!(layout.check_key(&[0; 2]).is_err());
        assert!(layout.check_value(&[0; 9]).is_err());
    }
}
