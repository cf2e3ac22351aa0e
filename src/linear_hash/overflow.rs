//! Overflow chains: per-bucket files of records that did not fit in the
//! bucket's primary page.
//!
//! A chain file is a bare sequence of framed records. New records are
//! appended, deletes tombstone in place. A chain whose records are all
//! tombstoned is removed.

use crate::error::{Error, Result};
use crate::flat_file::RecordReader;
use crate::record::{Record, RecordLayout, RecordStatus};
use crate::storage;
use std::cmp::Ordering;
use std::fs::File;
use std::path::{Path, PathBuf};

/// File extension of overflow chains.
pub const EXTENSION: &str = "lho";

/// The overflow chain of one bucket.
#[derive(Debug)]
pub(crate) struct OverflowChain {
    path: PathBuf,
    file: File,
    layout: RecordLayout,
    end: u64,
    live: usize,
}

impl OverflowChain {
    /// File name of the chain of `bucket` in dictionary `id`.
    pub(crate) fn file_name(id: u32, bucket: usize) -> String {
        format!("{}_{}.{}", id, bucket, EXTENSION)
    }

    /// Paths of every chain file of dictionary `id` in `directory`, whatever
    /// bucket it belongs to.
    pub(crate) fn files_of(directory: &Path, id: u32) -> Result<Vec<PathBuf>> {
        let prefix = format!("{}_", id);
        let mut paths = Vec::new();
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(Error::FileRead(e)),
        };
        for entry in entries {
            let entry = entry.map_err(Error::FileRead)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let bucket = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&format!(".{}", EXTENSION)));
            if bucket.is_some_and(|b| b.parse::<usize>().is_ok()) {
                paths.push(entry.path());
            }
        }
        Ok(paths)
    }

    /// Creates an empty chain, truncating any stale file at `path`.
    pub(crate) fn create(path: &Path, layout: RecordLayout) -> Result<Self> {
        let file = storage::create_file(path)?;
        log::debug!("Created overflow chain {:?}", path);
        Ok(Self { path: path.to_path_buf(), file, layout, end: 0, live: 0 })
    }

    /// Opens an existing chain.
    pub(crate) fn open(path: &Path, layout: RecordLayout) -> Result<Self> {
        let file = storage::open_file(path)?;
        let len = storage::file_len(&file)?;
        let record_size = layout.record_size() as u64;
        let mut chain =
            Self { path: path.to_path_buf(), file, layout, end: len - len % record_size, live: 0 };
        chain.live = chain.scan()?.iter().filter(|s| s.status == RecordStatus::InUse).count();
        Ok(chain)
    }

    /// Number of live records in the chain.
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Appends a record.
    pub(crate) fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let encoded = self.layout.encode(RecordStatus::InUse, key, value);
        storage::write_at(&self.file, self.end, &encoded)?;
        self.end += encoded.len() as u64;
        self.live += 1;
        Ok(())
    }

    /// Every slot in the chain, in append order.
    pub(crate) fn scan(&self) -> Result<Vec<ChainSlot>> {
        let mut reader = RecordReader::starting_at(&self.file, self.layout, 0, self.end)?;
        let mut slots = Vec::new();
        while let Some((offset, buf)) = reader.next_slot()? {
            let (status, key, value) = self.layout.decode(buf)?;
            slots.push(ChainSlot { offset, status, record: Record::new(key, value) });
        }
        Ok(slots)
    }

    /// Live records in append order.
    pub(crate) fn records(&self) -> Result<Vec<Record>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|slot| slot.status == RecordStatus::InUse)
            .map(|slot| slot.record)
            .collect())
    }

    /// Value of the first live record with `key`.
    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.matching(key)?.into_iter().next().map(|slot| slot.record.value))
    }

    /// Overwrites the value of every live record with `key`.
    pub(crate) fn update(&mut self, key: &[u8], value: &[u8]) -> Result<u32> {
        let matches = self.matching(key)?;
        for slot in &matches {
            let offset = slot.offset + 1 + self.layout.key_size as u64;
            storage::write_at(&self.file, offset, value)?;
        }
        Ok(matches.len() as u32)
    }

    /// Tombstones every live record with `key`.
    pub(crate) fn delete(&mut self, key: &[u8]) -> Result<u32> {
        let matches = self.matching(key)?;
        for slot in &matches {
            storage::write_at(&self.file, slot.offset, &[RecordStatus::Deleted.to_byte()])?;
        }
        self.live -= matches.len();
        Ok(matches.len() as u32)
    }

    fn matching(&self, key: &[u8]) -> Result<Vec<ChainSlot>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|slot| {
                slot.status == RecordStatus::InUse
                    && self.layout.compare(&slot.record.key, key) == Ordering::Equal
            })
            .collect())
    }

    /// Fsyncs the chain file.
    pub(crate) fn sync(&self) -> Result<()> {
        storage::sync(&self.file)
    }

    /// Removes the chain file.
    pub(crate) fn destroy(self) -> Result<()> {
        let OverflowChain { path, file, .. } = self;
        drop(file);
        storage::remove_file(&path)
    }
}

/// One decoded slot of a chain.
#[derive(Debug)]
pub(crate) struct ChainSlot {
    pub(crate) offset: u64,
    pub(crate) status: RecordStatus,
    pub(crate) record: Record,
}
