//! Flat file engine: an unordered record area scanned linearly.
//!
//! File format:
//! ```text
//! [header: 32 bytes][record 0][record 1]...
//! ```
//!
//! Inserts append at the end of the file. Deletes tombstone records in
//! place and tombstoned slots are never reused, so a file only grows until
//! it is destroyed.

use crate::config::{DictionaryConfig, DictionaryType, Options, WriteConcern};
use crate::cursor::RecordSource;
use crate::dictionary::DictionaryEngine;
use crate::error::{Error, Result};
use crate::predicate::Predicate;
use crate::record::{Record, RecordLayout, RecordStatus};
use crate::storage::{self, FileHeader, HEADER_SIZE};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

/// File extension of flat file dictionaries.
pub const EXTENSION: &str = "ffs";

/// A dictionary stored as a sequence of records in one file.
#[derive(Debug)]
pub struct FlatFile {
    path: PathBuf,
    file: File,
    layout: RecordLayout,
    write_concern: WriteConcern,
    /// Offset one past the last record.
    end_of_data: u64,
}

impl FlatFile {
    /// File name of the flat file with the given dictionary id.
    pub fn file_name(id: u32) -> String {
        format!("{}.{}", id, EXTENSION)
    }

    /// Creates an empty flat file at `path`, truncating any existing file.
    pub fn create(path: &Path, config: &DictionaryConfig, options: &Options) -> Result<Self> {
        let file = storage::create_file(path)?;
        let header = FileHeader::new(
            DictionaryType::FlatFile,
            config.layout(),
            config.dictionary_size,
            0,
        );
        header.write_to(&file)?;
        log::debug!("Created flat file {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            layout: config.layout(),
            write_concern: options
                .write_concern
                .unwrap_or(DictionaryType::FlatFile.default_write_concern()),
            end_of_data: HEADER_SIZE as u64,
        })
    }

    /// Opens an existing flat file, validating its header against `config`.
    pub fn open(path: &Path, config: &DictionaryConfig, options: &Options) -> Result<Self> {
        let file = storage::open_file(path)?;
        let header = FileHeader::read_from(&file)?;
        header.check_matches(config)?;

        let len = storage::file_len(&file)?;
        let record_size = header.layout.record_size() as u64;
        let records = (len - HEADER_SIZE as u64) / record_size;
        let end_of_data = HEADER_SIZE as u64 + records * record_size;
        if end_of_data != len {
            log::warn!(
                "Flat file {:?} has {} trailing bytes, ignoring them",
                path,
                len - end_of_data
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            layout: header.layout,
            write_concern: options
                .write_concern
                .unwrap_or(DictionaryType::FlatFile.default_write_concern()),
            end_of_data,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Visits every record slot from the start of data until `visit` breaks.
    fn scan<T>(
        &self,
        mut visit: impl FnMut(u64, RecordStatus, &[u8], &[u8]) -> ControlFlow<T>,
    ) -> Result<Option<T>> {
        let mut reader = RecordReader::new(&self.file, self.layout, self.end_of_data)?;
        while let Some((offset, buf)) = reader.next_slot()? {
            let (status, key, value) = self.layout.decode(buf)?;
            if let ControlFlow::Break(found) = visit(offset, status, key, value) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Offsets of every live record with `key`.
    fn matching_offsets(&self, key: &[u8]) -> Result<Vec<u64>> {
        let mut offsets = Vec::new();
        self.scan::<()>(|offset, status, candidate, _| {
            if status == RecordStatus::InUse
                && self.layout.compare(candidate, key) == Ordering::Equal
            {
                offsets.push(offset);
            }
            ControlFlow::Continue(())
        })?;
        Ok(offsets)
    }

    fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let encoded = self.layout.encode(RecordStatus::InUse, key, value);
        storage::write_at(&self.file, self.end_of_data, &encoded)?;
        self.end_of_data += encoded.len() as u64;
        Ok(())
    }

    fn overwrite_value(&self, offset: u64, value: &[u8]) -> Result<()> {
        storage::write_at(&self.file, offset + 1 + self.layout.key_size as u64, value)
    }
}

impl DictionaryEngine for FlatFile {
    fn dictionary_type(&self) -> DictionaryType {
        DictionaryType::FlatFile
    }

    fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    fn write_concern(&self) -> WriteConcern {
        self.write_concern
    }

    fn set_write_concern(&mut self, concern: WriteConcern) -> Result<()> {
        self.write_concern = concern;
        Ok(())
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<u32> {
        if self.write_concern != WriteConcern::Duplicate {
            let existing = self.scan(|offset, status, candidate, _| {
                if status == RecordStatus::InUse
                    && self.layout.compare(candidate, key) == Ordering::Equal
                {
                    ControlFlow::Break(offset)
                } else {
                    ControlFlow::Continue(())
                }
            })?;

            if let Some(offset) = existing {
                return match self.write_concern {
                    WriteConcern::Update => {
                        self.overwrite_value(offset, value)?;
                        Ok(1)
                    }
                    _ => Err(Error::DuplicateKey),
                };
            }
        }

        self.append(key, value)?;
        Ok(1)
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.scan(|_, status, candidate, value| {
            if status == RecordStatus::InUse
                && self.layout.compare(candidate, key) == Ordering::Equal
            {
                ControlFlow::Break(value.to_vec())
            } else {
                ControlFlow::Continue(())
            }
        })?
        .ok_or(Error::ItemNotFound)
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<u32> {
        let offsets = self.matching_offsets(key)?;
        if offsets.is_empty() {
            self.append(key, value)?;
            return Ok(1);
        }
        for &offset in &offsets {
            self.overwrite_value(offset, value)?;
        }
        Ok(offsets.len() as u32)
    }

    fn delete(&mut self, key: &[u8]) -> Result<u32> {
        let offsets = self.matching_offsets(key)?;
        if offsets.is_empty() {
            return Err(Error::ItemNotFound);
        }
        for &offset in &offsets {
            storage::write_at(&self.file, offset, &[RecordStatus::Deleted.to_byte()])?;
        }
        Ok(offsets.len() as u32)
    }

    fn find<'a>(&'a self, predicate: &Predicate) -> Result<Box<dyn RecordSource + 'a>> {
        Ok(Box::new(FlatFileSource {
            reader: RecordReader::new(&self.file, self.layout, self.end_of_data)?,
            layout: self.layout,
            predicate: predicate.clone(),
        }))
    }

    fn record_count(&self) -> Result<usize> {
        let mut count = 0;
        self.scan::<()>(|_, status, _, _| {
            if status == RecordStatus::InUse {
                count += 1;
            }
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }

    fn flush(&mut self, sync: bool) -> Result<()> {
        if sync {
            storage::sync(&self.file)?;
        }
        Ok(())
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        storage::remove_file(&path)
    }
}

/// Buffered sequential reader over the record area of a file.
pub(crate) struct RecordReader<'a> {
    reader: BufReader<&'a File>,
    offset: u64,
    end: u64,
    buf: Vec<u8>,
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(file: &'a File, layout: RecordLayout, end: u64) -> Result<Self> {
        Self::starting_at(file, layout, HEADER_SIZE as u64, end)
    }

    pub(crate) fn starting_at(
        file: &'a File,
        layout: RecordLayout,
        start: u64,
        end: u64,
    ) -> Result<Self> {
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start)).map_err(Error::FileBadSeek)?;
        Ok(Self { reader, offset: start, end, buf: vec![0u8; layout.record_size()] })
    }

    /// Reads the next slot, returning its offset and raw bytes.
    pub(crate) fn next_slot(&mut self) -> Result<Option<(u64, &[u8])>> {
        if self.offset + self.buf.len() as u64 > self.end {
            return Ok(None);
        }
        self.reader.read_exact(&mut self.buf).map_err(Error::read)?;
        let offset = self.offset;
        self.offset += self.buf.len() as u64;
        Ok(Some((offset, &self.buf)))
    }
}

struct FlatFileSource<'a> {
    reader: RecordReader<'a>,
    layout: RecordLayout,
    predicate: Predicate,
}

impl RecordSource for FlatFileSource<'_> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        while let Some((_, buf)) = self.reader.next_slot()? {
            let (status, key, value) = self.layout.decode(buf)?;
            if status == RecordStatus::InUse && self.predicate.matches(&self.layout, key) {
                return Ok(Some(Record::new(key, value)));
            }
        }
        Ok(None)
    }
}
