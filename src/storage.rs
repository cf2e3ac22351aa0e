//! File helpers and the header every file-backed structure starts with.
//!
//! Header format (32 bytes):
//! ```text
//! [magic: 4][version: 1][dictionary_type: 1][key_type: 1][reserved: 1]
//! [key_size: 4][value_size: 4][dictionary_size: 4][param: 4][reserved: 4]
//! [crc32: 4]
//! ```
//!
//! `param` is structure specific (records per bucket for linear hash).
//! The CRC covers the first 28 bytes.

use crate::config::{DictionaryConfig, DictionaryType};
use crate::error::{Error, Result};
use crate::key::KeyType;
use crate::record::RecordLayout;
use bytes::{Buf, BufMut, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Magic number "IOND".
pub const MAGIC: u32 = 0x444E_4F49;

/// Header format version.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the encoded header.
pub const HEADER_SIZE: usize = 32;

/// Fixed parameters written at the start of every structure file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Engine that wrote the file.
    pub dictionary_type: DictionaryType,
    /// Record layout.
    pub layout: RecordLayout,
    /// Capacity or initial bucket count.
    pub dictionary_size: u32,
    /// Structure specific parameter.
    pub param: u32,
}

impl FileHeader {
    /// Creates a header.
    pub fn new(
        dictionary_type: DictionaryType,
        layout: RecordLayout,
        dictionary_size: u32,
        param: u32,
    ) -> Self {
        Self { dictionary_type, layout, dictionary_size, param }
    }

    /// Encode the header to bytes (32 bytes)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_u32_le(MAGIC);
        buf.put_u8(FORMAT_VERSION);
        buf.put_u8(self.dictionary_type as u8);
        buf.put_u8(self.layout.key_type as u8);
        buf.put_u8(0);
        buf.put_u32_le(self.layout.key_size as u32);
        buf.put_u32_le(self.layout.value_size as u32);
        buf.put_u32_le(self.dictionary_size);
        buf.put_u32_le(self.param);
        buf.put_u32_le(0);

        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
        buf.to_vec()
    }

    /// Decode a header, verifying magic, version and checksum.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corruption(format!(
                "header too short: {} < {}",
                data.len(),
                HEADER_SIZE
            )));
        }

        let stored_crc = (&data[HEADER_SIZE - 4..HEADER_SIZE]).get_u32_le();
        let actual_crc = crc32fast::hash(&data[..HEADER_SIZE - 4]);
        if stored_crc != actual_crc {
            return Err(Error::corruption(format!(
                "header checksum mismatch: expected {:#x}, got {:#x}",
                stored_crc, actual_crc
            )));
        }

        let mut buf = &data[..HEADER_SIZE - 4];
        let magic = buf.get_u32_le();
        if magic != MAGIC {
            return Err(Error::corruption(format!("invalid magic number {:#x}", magic)));
        }
        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(Error::corruption(format!("unsupported format version {}", version)));
        }
        let dictionary_type = DictionaryType::from_u8(buf.get_u8())
            .ok_or_else(|| Error::corruption("unknown dictionary type"))?;
        let key_type =
            KeyType::from_u8(buf.get_u8()).ok_or_else(|| Error::corruption("unknown key type"))?;
        buf.advance(1);
        let key_size = buf.get_u32_le() as usize;
        let value_size = buf.get_u32_le() as usize;
        let dictionary_size = buf.get_u32_le();
        let param = buf.get_u32_le();

        Ok(Self {
            dictionary_type,
            layout: RecordLayout::new(key_type, key_size, value_size),
            dictionary_size,
            param,
        })
    }

    /// Checks that a file written for `config` is being reopened as the same
    /// kind of dictionary.
    pub fn check_matches(&self, config: &DictionaryConfig) -> Result<()> {
        if self.dictionary_type != config.dictionary_type {
            return Err(Error::corruption(format!(
                "file holds a {:?}, catalog says {:?}",
                self.dictionary_type, config.dictionary_type
            )));
        }
        if self.layout != config.layout() {
            return Err(Error::corruption(format!(
                "file layout {:?} does not match catalog layout {:?}",
                self.layout,
                config.layout()
            )));
        }
        Ok(())
    }

    /// Write the header at offset 0.
    pub fn write_to(&self, file: &File) -> Result<()> {
        write_at(file, 0, &self.encode())
    }

    /// Read the header from offset 0.
    pub fn read_from(file: &File) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        read_at(file, 0, &mut buf)?;
        Self::decode(&buf)
    }
}

/// Creates (or truncates) a file for reading and writing.
pub(crate) fn create_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(Error::FileOpen)
}

/// Opens an existing file for reading and writing.
pub(crate) fn open_file(path: &Path) -> Result<File> {
    OpenOptions::new().read(true).write(true).open(path).map_err(Error::FileOpen)
}

/// Removes a file.
pub(crate) fn remove_file(path: &Path) -> Result<()> {
    std::fs::remove_file(path).map_err(Error::FileDelete)
}

/// Reads exactly `buf.len()` bytes at `offset`.
pub(crate) fn read_at(mut file: &File, offset: u64, buf: &mut [u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset)).map_err(Error::FileBadSeek)?;
    file.read_exact(buf).map_err(Error::read)
}

/// Writes all of `buf` at `offset`.
pub(crate) fn write_at(mut file: &File, offset: u64, buf: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset)).map_err(Error::FileBadSeek)?;
    file.write_all(buf).map_err(Error::FileWrite)
}

/// Current length of a file.
pub(crate) fn file_len(file: &File) -> Result<u64> {
    Ok(file.metadata().map_err(Error::FileRead)?.len())
}

/// Flushes a file to stable storage.
pub(crate) fn sync(file: &File) -> Result<()> {
    file.sync_all().map_err(Error::FileClose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn header() -> FileHeader {
        FileHeader::new(
            DictionaryType::LinearHash,
            RecordLayout::new(KeyType::NumericSigned, 4, 10),
            4,
            2,
        )
    }

    #[test]
    fn test_header_encode_decode() {
        let encoded = header().encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(FileHeader::decode(&encoded).unwrap(), header());
    }

    #[test]
    fn test_header_corruption_detected() {
        let mut encoded = header().encode();
        encoded[9] ^= 0xFF;
        assert!(matches!(FileHeader::decode(&encoded), Err(Error::Corruption(_))));
        assert!(FileHeader::decode(&encoded[..10]).is_err());
    }

    #[test]
    fn test_header_file_roundtrip_and_match() {
        let temp = NamedTempFile::new().unwrap();
        let file = open_file(temp.path()).unwrap();
        header().write_to(&file).unwrap();
        let read = FileHeader::read_from(&file).unwrap();

        let config =
            DictionaryConfig::new(DictionaryType::LinearHash, KeyType::NumericSigned, 4, 10);
        assert!(read.check_matches(&config).is_ok());

        let config =
            DictionaryConfig::new(DictionaryType::FlatFile, KeyType::NumericSigned, 4, 10);
        assert!(read.check_matches(&config).is_err());
    }

    #[test]
    fn test_read_past_end_is_eof() {
        let temp = NamedTempFile::new().unwrap();
        let file = open_file(temp.path()).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(read_at(&file, 0, &mut buf), Err(Error::FileHitEof)));
    }
}
