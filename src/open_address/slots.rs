//! Slot storage for the open addressing engines.
//!
//! A slot store is a fixed array of framed records. [`MemorySlots`] keeps
//! it in a byte vector, [`FileSlots`] in a file laid out as
//! `[header: 32 bytes][slot 0][slot 1]...`.

use crate::config::{DictionaryConfig, DictionaryType};
use crate::error::{Error, Result};
use crate::record::{RecordLayout, RecordStatus};
use crate::storage::{self, FileHeader, HEADER_SIZE};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Fixed-capacity array of record slots.
pub trait SlotStore: Send {
    /// Number of slots.
    fn capacity(&self) -> usize;

    /// Copies slot `index` into `buf` (`record_size` bytes).
    fn read_slot(&self, index: usize, buf: &mut [u8]) -> Result<()>;

    /// Overwrites slot `index` with a framed record.
    fn write_slot(&mut self, index: usize, record: &[u8]) -> Result<()>;

    /// Overwrites only the status byte of slot `index`.
    fn write_status(&mut self, index: usize, status: RecordStatus) -> Result<()>;

    /// Persists pending writes.
    fn flush(&mut self, _sync: bool) -> Result<()> {
        Ok(())
    }

    /// Releases the backing storage.
    fn destroy(self) -> Result<()>;
}

/// Slots held in memory.
#[derive(Debug)]
pub struct MemorySlots {
    data: Vec<u8>,
    record_size: usize,
    capacity: usize,
}

impl MemorySlots {
    /// Allocates `capacity` empty slots.
    pub fn new(layout: &RecordLayout, capacity: usize) -> Result<Self> {
        let record_size = layout.record_size();
        let total = record_size.checked_mul(capacity).ok_or(Error::OutOfMemory)?;
        let mut data = Vec::new();
        data.try_reserve_exact(total).map_err(|_| Error::OutOfMemory)?;
        let empty = layout.encode_blank(RecordStatus::Empty);
        for _ in 0..capacity {
            data.extend_from_slice(&empty);
        }
        Ok(Self { data, record_size, capacity })
    }

    fn range(&self, index: usize) -> Result<std::ops::Range<usize>> {
        if index >= self.capacity {
            return Err(Error::OutOfBounds);
        }
        let start = index * self.record_size;
        Ok(start..start + self.record_size)
    }
}

impl SlotStore for MemorySlots {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn read_slot(&self, index: usize, buf: &mut [u8]) -> Result<()> {
        let range = self.range(index)?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_slot(&mut self, index: usize, record: &[u8]) -> Result<()> {
        let range = self.range(index)?;
        self.data[range].copy_from_slice(record);
        Ok(())
    }

    fn write_status(&mut self, index: usize, status: RecordStatus) -> Result<()> {
        let range = self.range(index)?;
        self.data[range.start] = status.to_byte();
        Ok(())
    }

    fn destroy(self) -> Result<()> {
        Ok(())
    }
}

/// Slots held in a file.
#[derive(Debug)]
pub struct FileSlots {
    path: PathBuf,
    file: File,
    record_size: usize,
    capacity: usize,
}

impl FileSlots {
    /// Creates the file and fills it with empty slots.
    pub fn create(path: &Path, config: &DictionaryConfig) -> Result<Self> {
        let layout = config.layout();
        let capacity = config.dictionary_size as usize;
        let file = storage::create_file(path)?;
        FileHeader::new(DictionaryType::OpenAddressFileHash, layout, config.dictionary_size, 0)
            .write_to(&file)?;

        {
            let mut writer = BufWriter::new(&file);
            writer
                .seek(SeekFrom::Start(HEADER_SIZE as u64))
                .map_err(Error::FileBadSeek)?;
            let empty = layout.encode_blank(RecordStatus::Empty);
            for _ in 0..capacity {
                writer.write_all(&empty).map_err(Error::FileWrite)?;
            }
            writer.flush().map_err(Error::FileWrite)?;
        }
        log::debug!("Created open address file {:?} with {} slots", path, capacity);

        Ok(Self { path: path.to_path_buf(), file, record_size: layout.record_size(), capacity })
    }

    /// Opens an existing slot file.
    pub fn open(path: &Path, config: &DictionaryConfig) -> Result<Self> {
        let file = storage::open_file(path)?;
        let header = FileHeader::read_from(&file)?;
        header.check_matches(config)?;

        let record_size = header.layout.record_size();
        let capacity = header.dictionary_size as usize;
        let expected = (HEADER_SIZE + record_size * capacity) as u64;
        let len = storage::file_len(&file)?;
        if len != expected {
            return Err(Error::corruption(format!(
                "open address file is {} bytes, expected {}",
                len, expected
            )));
        }

        Ok(Self { path: path.to_path_buf(), file, record_size, capacity })
    }

    fn offset(&self, index: usize) -> Result<u64> {
        if index >= self.capacity {
            return Err(Error::OutOfBounds);
        }
        Ok((HEADER_SIZE + index * self.record_size) as u64)
    }
}

impl SlotStore for FileSlots {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn read_slot(&self, index: usize, buf: &mut [u8]) -> Result<()> {
        storage::read_at(&self.file, self.offset(index)?, buf)
    }

    fn write_slot(&mut self, index: usize, record: &[u8]) -> Result<()> {
        storage::write_at(&self.file, self.offset(index)?, record)
    }

    fn write_status(&mut self, index: usize, status: RecordStatus) -> Result<()> {
        storage::write_at(&self.file, self.offset(index)?, &[status.to_byte()])
    }

    fn flush(&mut self, sync: bool) -> Result<()> {
        if sync {
            storage::sync(&self.file)?;
        }
        Ok(())
    }

    fn destroy(self) -> Result<()> {
        let FileSlots { path, file, .. } = self;
        drop(file);
        storage::remove_file(&path)
    }
}
