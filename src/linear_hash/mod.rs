//! Linear hash engine with per-bucket overflow chains.
//!
//! The table starts with `L` buckets (a power of two, at least 2) and grows
//! one bucket per [`split`](DictionaryEngine::split). With file level `i` and
//! split pointer `p`, a key hashes to
//!
//! ```text
//! lower = h mod (2^i * L)
//! upper = h mod (2^(i+1) * L)
//! bucket = if lower >= p { lower } else { upper }
//! ```
//!
//! Buckets below `p` have already been split at level `i`. Splitting bucket
//! `p` moves the records whose upper hash differs into the new bucket
//! `p + 2^i * L`, then advances `p`; when `p` reaches `2^i * L` it wraps to 0
//! and `i` grows by one.
//!
//! Main file format:
//! ```text
//! [header: 32 bytes][state: 16 bytes][bucket 0][bucket 1]...
//! state  = [level: u32][bucket_pointer: u32][records: u64]
//! bucket = records_per_bucket framed records
//! ```
//!
//! Records that do not fit in their bucket's page go to the bucket's
//! overflow chain file, `{id}_{bucket}.lho`.

mod overflow;

use crate::config::{DictionaryConfig, DictionaryType, Options, WriteConcern};
use crate::cursor::RecordSource;
use crate::dictionary::DictionaryEngine;
use crate::error::{Error, Result};
use crate::predicate::Predicate;
use crate::record::{Record, RecordLayout, RecordStatus};
use crate::storage::{self, FileHeader, HEADER_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use overflow::OverflowChain;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::path::PathBuf;

/// File extension of the main bucket file.
pub const EXTENSION: &str = "lhs";

const STATE_SIZE: usize = 16;
const DATA_START: u64 = (HEADER_SIZE + STATE_SIZE) as u64;

/// Mutable table geometry, persisted after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct State {
    level: u32,
    bucket_pointer: u32,
    records: u64,
}

impl State {
    fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(STATE_SIZE);
        buf.put_u32_le(self.level);
        buf.put_u32_le(self.bucket_pointer);
        buf.put_u64_le(self.records);
        buf.to_vec()
    }

    fn decode(mut data: &[u8]) -> Self {
        Self {
            level: data.get_u32_le(),
            bucket_pointer: data.get_u32_le(),
            records: data.get_u64_le(),
        }
    }
}

/// A linear hash table stored in a main bucket file plus overflow chains.
#[derive(Debug)]
pub struct LinearHash {
    id: u32,
    directory: PathBuf,
    path: PathBuf,
    file: File,
    layout: RecordLayout,
    initial_size: usize,
    records_per_bucket: usize,
    state: State,
    overflow: BTreeMap<usize, OverflowChain>,
    write_concern: WriteConcern,
    split_threshold: Option<u32>,
}

impl LinearHash {
    /// File name of the main file of dictionary `id`.
    pub fn file_name(id: u32) -> String {
        format!("{}.{}", id, EXTENSION)
    }

    /// Creates a table with `config.dictionary_size` initial buckets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInitialSize`] unless the initial size is a
    /// power of two of at least 2.
    pub fn create(config: &DictionaryConfig, options: &Options) -> Result<Self> {
        let initial_size = config.dictionary_size as usize;
        if initial_size < 2 || !initial_size.is_power_of_two() {
            return Err(Error::InvalidInitialSize(initial_size));
        }
        options.validate()?;

        for stale in OverflowChain::files_of(&options.directory, config.id)? {
            log::debug!("Removing stale overflow chain {:?}", stale);
            storage::remove_file(&stale)?;
        }

        let path = options.path_for(&Self::file_name(config.id));
        let file = storage::create_file(&path)?;
        let layout = config.layout();
        let records_per_bucket = options.records_per_bucket;

        FileHeader::new(
            DictionaryType::LinearHash,
            layout,
            config.dictionary_size,
            records_per_bucket as u32,
        )
        .write_to(&file)?;

        let mut table = Self {
            id: config.id,
            directory: options.directory.clone(),
            path,
            file,
            layout,
            initial_size,
            records_per_bucket,
            state: State { level: 0, bucket_pointer: 0, records: 0 },
            overflow: BTreeMap::new(),
            write_concern: options
                .write_concern
                .unwrap_or(DictionaryType::LinearHash.default_write_concern()),
            split_threshold: options.linear_hash_split_threshold,
        };
        table.write_state()?;
        for bucket in 0..initial_size {
            table.write_empty_page(bucket)?;
        }

        log::info!(
            "Created linear hash {} with {} buckets of {} records",
            config.id,
            initial_size,
            records_per_bucket
        );
        Ok(table)
    }

    /// Reopens a table, including any overflow chains on disk.
    pub fn open(config: &DictionaryConfig, options: &Options) -> Result<Self> {
        let path = options.path_for(&Self::file_name(config.id));
        let file = storage::open_file(&path)?;
        let header = FileHeader::read_from(&file)?;
        header.check_matches(config)?;

        let mut state_buf = [0u8; STATE_SIZE];
        storage::read_at(&file, HEADER_SIZE as u64, &mut state_buf)?;
        let state = State::decode(&state_buf);

        let mut table = Self {
            id: config.id,
            directory: options.directory.clone(),
            path,
            file,
            layout: header.layout,
            initial_size: header.dictionary_size as usize,
            records_per_bucket: header.param as usize,
            state,
            overflow: BTreeMap::new(),
            write_concern: options
                .write_concern
                .unwrap_or(DictionaryType::LinearHash.default_write_concern()),
            split_threshold: options.linear_hash_split_threshold,
        };

        let expected = DATA_START + (table.bucket_count() * table.page_size()) as u64;
        let len = storage::file_len(&table.file)?;
        if len < expected {
            return Err(Error::corruption(format!(
                "linear hash file is {} bytes, expected {}",
                len, expected
            )));
        }

        for bucket in 0..table.bucket_count() {
            let chain_path = table.overflow_path(bucket);
            if chain_path.exists() {
                let chain = OverflowChain::open(&chain_path, table.layout)?;
                table.overflow.insert(bucket, chain);
            }
        }

        log::info!(
            "Opened linear hash {}: level {}, bucket pointer {}, {} records",
            table.id,
            table.state.level,
            table.state.bucket_pointer,
            table.state.records
        );
        Ok(table)
    }

    /// Current file level `i`.
    pub fn level(&self) -> u32 {
        self.state.level
    }

    /// Next bucket to split.
    pub fn bucket_pointer(&self) -> usize {
        self.state.bucket_pointer as usize
    }

    /// Buckets in the table: `2^i * L + p`.
    pub fn bucket_count(&self) -> usize {
        self.level_size() + self.bucket_pointer()
    }

    /// Percent of primary slots holding a record, counting overflow.
    pub fn load_factor(&self) -> u32 {
        let slots = (self.bucket_count() * self.records_per_bucket) as u64;
        (self.state.records * 100 / slots.max(1)) as u32
    }

    /// Buckets at the start of the current level, `2^i * L`.
    fn level_size(&self) -> usize {
        self.initial_size << self.state.level
    }

    /// Bucket that holds `key` under the current geometry.
    pub fn bucket_for(&self, key: &[u8]) -> usize {
        let hash = self.layout.hash(key);
        let lower = (hash % self.level_size() as u64) as usize;
        if lower >= self.bucket_pointer() {
            lower
        } else {
            (hash % (2 * self.level_size()) as u64) as usize
        }
    }

    fn page_size(&self) -> usize {
        self.records_per_bucket * self.layout.record_size()
    }

    fn page_offset(&self, bucket: usize) -> u64 {
        DATA_START + (bucket * self.page_size()) as u64
    }

    fn overflow_path(&self, bucket: usize) -> PathBuf {
        self.directory.join(OverflowChain::file_name(self.id, bucket))
    }

    fn write_state(&self) -> Result<()> {
        storage::write_at(&self.file, HEADER_SIZE as u64, &self.state.encode())
    }

    fn write_empty_page(&self, bucket: usize) -> Result<()> {
        let empty = self.layout.encode_blank(RecordStatus::Empty);
        let mut page = Vec::with_capacity(self.page_size());
        for _ in 0..self.records_per_bucket {
            page.extend_from_slice(&empty);
        }
        storage::write_at(&self.file, self.page_offset(bucket), &page)
    }

    fn read_page(&self, bucket: usize) -> Result<Vec<u8>> {
        let mut page = vec![0u8; self.page_size()];
        storage::read_at(&self.file, self.page_offset(bucket), &mut page)?;
        Ok(page)
    }

    /// Decoded primary slots of `bucket`.
    fn page_slots(&self, bucket: usize) -> Result<Vec<(RecordStatus, Record)>> {
        let page = self.read_page(bucket)?;
        page.chunks_exact(self.layout.record_size())
            .map(|chunk| {
                let (status, key, value) = self.layout.decode(chunk)?;
                Ok((status, Record::new(key, value)))
            })
            .collect()
    }

    fn slot_offset(&self, bucket: usize, slot: usize) -> u64 {
        self.page_offset(bucket) + (slot * self.layout.record_size()) as u64
    }

    /// Live records of a bucket: primary page first, then the overflow chain.
    fn bucket_records(&self, bucket: usize) -> Result<Vec<Record>> {
        let mut records: Vec<Record> = self
            .page_slots(bucket)?
            .into_iter()
            .filter(|(status, _)| *status == RecordStatus::InUse)
            .map(|(_, record)| record)
            .collect();
        if let Some(chain) = self.overflow.get(&bucket) {
            records.extend(chain.records()?);
        }
        Ok(records)
    }

    /// Places a record in its bucket without any write concern check.
    fn place(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let bucket = self.bucket_for(key);
        let slots = self.page_slots(bucket)?;

        match slots.iter().position(|(status, _)| *status != RecordStatus::InUse) {
            Some(slot) => {
                let encoded = self.layout.encode(RecordStatus::InUse, key, value);
                storage::write_at(&self.file, self.slot_offset(bucket, slot), &encoded)?;
            }
            None => self.chain_for(bucket)?.append(key, value)?,
        }

        self.state.records += 1;
        self.write_state()
    }

    fn chain_for(&mut self, bucket: usize) -> Result<&mut OverflowChain> {
        if !self.overflow.contains_key(&bucket) {
            let chain = OverflowChain::create(&self.overflow_path(bucket), self.layout)?;
            self.overflow.insert(bucket, chain);
        }
        self.overflow.get_mut(&bucket).ok_or(Error::Uninitialized)
    }

    /// Writes `records` into `bucket`: the first page-full into the primary
    /// page, the rest into a fresh overflow chain.
    fn rewrite_bucket(&mut self, bucket: usize, records: &[Record]) -> Result<()> {
        if let Some(old) = self.overflow.remove(&bucket) {
            old.destroy()?;
        }

        let rpb = self.records_per_bucket;
        let mut page = Vec::with_capacity(self.page_size());
        for slot in 0..rpb {
            let encoded = match records.get(slot) {
                Some(r) => self.layout.encode(RecordStatus::InUse, &r.key, &r.value),
                None => self.layout.encode_blank(RecordStatus::Empty),
            };
            page.extend_from_slice(&encoded);
        }
        storage::write_at(&self.file, self.page_offset(bucket), &page)?;

        if records.len() > rpb {
            let chain = self.chain_for(bucket)?;
            for record in &records[rpb..] {
                chain.append(&record.key, &record.value)?;
            }
        }
        Ok(())
    }

    fn maybe_split(&mut self) -> Result<()> {
        if let Some(threshold) = self.split_threshold {
            while self.load_factor() > threshold {
                self.split()?;
            }
        }
        Ok(())
    }

    fn remove_dead_chain(&mut self, bucket: usize) -> Result<()> {
        if self.overflow.get(&bucket).map_or(false, |chain| chain.live() == 0) {
            if let Some(chain) = self.overflow.remove(&bucket) {
                chain.destroy()?;
            }
        }
        Ok(())
    }
}

impl DictionaryEngine for LinearHash {
    fn dictionary_type(&self) -> DictionaryType {
        DictionaryType::LinearHash
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
        match self.write_concern {
            WriteConcern::Duplicate => {}
            WriteConcern::InsertUnique => match self.get(key) {
                Ok(_) => return Err(Error::DuplicateKey),
                Err(Error::ItemNotFound) => {}
                Err(e) => return Err(e),
            },
            WriteConcern::Update => return self.update(key, value),
        }
        self.place(key, value)?;
        self.maybe_split()?;
        Ok(1)
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let bucket = self.bucket_for(key);
        for (status, record) in self.page_slots(bucket)? {
            if status == RecordStatus::InUse
                && self.layout.compare(&record.key, key) == Ordering::Equal
            {
                return Ok(record.value);
            }
        }
        match self.overflow.get(&bucket) {
            Some(chain) => chain.get(key)?.ok_or(Error::ItemNotFound),
            None => Err(Error::ItemNotFound),
        }
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<u32> {
        let bucket = self.bucket_for(key);
        let mut count = 0;
        for (slot, (status, record)) in self.page_slots(bucket)?.into_iter().enumerate() {
            if status == RecordStatus::InUse
                && self.layout.compare(&record.key, key) == Ordering::Equal
            {
                let offset = self.slot_offset(bucket, slot) + 1 + self.layout.key_size as u64;
                storage::write_at(&self.file, offset, value)?;
                count += 1;
            }
        }
        if let Some(chain) = self.overflow.get_mut(&bucket) {
            count += chain.update(key, value)?;
        }

        if count == 0 {
            self.place(key, value)?;
            self.maybe_split()?;
            return Ok(1);
        }
        Ok(count)
    }

    fn delete(&mut self, key: &[u8]) -> Result<u32> {
        let bucket = self.bucket_for(key);
        let mut count = 0;
        for (slot, (status, record)) in self.page_slots(bucket)?.into_iter().enumerate() {
            if status == RecordStatus::InUse
                && self.layout.compare(&record.key, key) == Ordering::Equal
            {
                let offset = self.slot_offset(bucket, slot);
                storage::write_at(&self.file, offset, &[RecordStatus::Deleted.to_byte()])?;
                count += 1;
            }
        }
        if let Some(chain) = self.overflow.get_mut(&bucket) {
            count += chain.delete(key)?;
        }
        self.remove_dead_chain(bucket)?;

        if count == 0 {
            return Err(Error::ItemNotFound);
        }
        self.state.records -= count as u64;
        self.write_state()?;
        Ok(count)
    }

    fn find<'a>(&'a self, predicate: &Predicate) -> Result<Box<dyn RecordSource + 'a>> {
        let (start, remaining) = match predicate {
            Predicate::Equality(key) => (self.bucket_for(key), 1),
            Predicate::Range { lower, .. } => (self.bucket_for(lower), self.bucket_count()),
            Predicate::All => (0, self.bucket_count()),
        };
        Ok(Box::new(LinearHashSource {
            table: self,
            predicate: predicate.clone(),
            next_bucket: start,
            remaining,
            buffered: VecDeque::new(),
        }))
    }

    fn record_count(&self) -> Result<usize> {
        Ok(self.state.records as usize)
    }

    /// Splits the bucket at the split pointer.
    fn split(&mut self) -> Result<()> {
        let bucket = self.bucket_pointer();
        let level_size = self.level_size();
        let new_bucket = bucket + level_size;
        let modulus = (2 * level_size) as u64;

        let (stay, moved): (Vec<Record>, Vec<Record>) = self
            .bucket_records(bucket)?
            .into_iter()
            .partition(|r| (self.layout.hash(&r.key) % modulus) as usize == bucket);

        self.rewrite_bucket(new_bucket, &moved)?;
        self.rewrite_bucket(bucket, &stay)?;

        self.state.bucket_pointer += 1;
        if self.bucket_pointer() == level_size {
            self.state.bucket_pointer = 0;
            self.state.level += 1;
        }
        self.write_state()?;

        log::debug!(
            "Split bucket {} of linear hash {}: {} stayed, {} moved to {}; level {}, pointer {}",
            bucket,
            self.id,
            stay.len(),
            moved.len(),
            new_bucket,
            self.state.level,
            self.state.bucket_pointer
        );
        Ok(())
    }

    fn flush(&mut self, sync: bool) -> Result<()> {
        if sync {
            storage::sync(&self.file)?;
            for chain in self.overflow.values() {
                chain.sync()?;
            }
        }
        Ok(())
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        let LinearHash { path, file, overflow, id, directory, .. } = *self;
        drop(file);

        let mut failures = Vec::new();
        for (bucket, chain) in overflow {
            if let Err(e) = chain.destroy() {
                failures.push(format!("overflow {}: {}", bucket, e));
            }
        }
        // Chains of buckets past the current geometry.
        match OverflowChain::files_of(&directory, id) {
            Ok(stale) => {
                for chain_path in stale {
                    if let Err(e) = storage::remove_file(&chain_path) {
                        failures.push(format!("overflow {:?}: {}", chain_path, e));
                    }
                }
            }
            Err(e) => failures.push(format!("overflow scan: {}", e)),
        }
        if let Err(e) = storage::remove_file(&path) {
            failures.push(format!("main file: {}", e));
        }

        if failures.is_empty() {
            log::info!("Destroyed linear hash {}", id);
            Ok(())
        } else {
            Err(Error::DictionaryDestruction(failures.join("; ")))
        }
    }
}

/// Walks buckets from a start bucket, wrapping past the last bucket to
/// bucket 0, until every bucket has been visited once.
struct LinearHashSource<'a> {
    table: &'a LinearHash,
    predicate: Predicate,
    next_bucket: usize,
    remaining: usize,
    buffered: VecDeque<Record>,
}

impl RecordSource for LinearHashSource<'_> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Ok(Some(record));
            }
            if self.remaining == 0 {
                return Ok(None);
            }

            let bucket = self.next_bucket;
            self.remaining -= 1;
            self.next_bucket = (bucket + 1) % self.table.bucket_count();

            let layout = &self.table.layout;
            let predicate = &self.predicate;
            self.buffered.extend(
                self.table
                    .bucket_records(bucket)?
                    .into_iter()
                    .filter(|r| predicate.matches(layout, &r.key)),
            );
        }
    }
}
