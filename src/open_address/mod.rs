//! Open addressing hash engines.
//!
//! One record per slot, `slot = hash(key) mod capacity`, linear probing with
//! wraparound. Deletes leave a tombstone so probe chains stay intact, and
//! tombstones are reclaimed by later inserts. Capacity is fixed at creation.
//!
//! The same engine runs over an in-memory slot array
//! ([`OpenAddressHash`]) or a file ([`OpenAddressFileHash`]).

pub mod slots;

pub use slots::{FileSlots, MemorySlots, SlotStore};

use crate::config::{DictionaryConfig, DictionaryType, Options, WriteConcern};
use crate::cursor::RecordSource;
use crate::dictionary::DictionaryEngine;
use crate::error::{Error, Result};
use crate::predicate::Predicate;
use crate::record::{Record, RecordLayout, RecordStatus};
use std::cmp::Ordering;
use std::path::Path;

/// File extension of file-backed open addressing dictionaries.
pub const EXTENSION: &str = "oah";

/// In-memory open addressing hash.
pub type OpenAddressHash = OpenAddress<MemorySlots>;

/// File-backed open addressing hash.
pub type OpenAddressFileHash = OpenAddress<FileSlots>;

/// Open addressing hash over a slot store.
#[derive(Debug)]
pub struct OpenAddress<S: SlotStore> {
    slots: S,
    layout: RecordLayout,
    dictionary_type: DictionaryType,
    write_concern: WriteConcern,
    live: usize,
}

/// Result of walking a probe chain.
#[derive(Debug, Default)]
struct Probe {
    /// Slot holding the key.
    found: Option<usize>,
    /// First empty or deleted slot seen.
    free: Option<usize>,
}

impl OpenAddressHash {
    /// Creates an in-memory table with `config.dictionary_size` slots.
    pub fn create(config: &DictionaryConfig, options: &Options) -> Result<Self> {
        let layout = config.layout();
        let slots = MemorySlots::new(&layout, config.dictionary_size as usize)?;
        Self::with_slots(slots, layout, DictionaryType::OpenAddressHash, options)
    }
}

impl OpenAddressFileHash {
    /// File name of the table with the given dictionary id.
    pub fn file_name(id: u32) -> String {
        format!("{}.{}", id, EXTENSION)
    }

    /// Creates a file-backed table at `path`.
    pub fn create(path: &Path, config: &DictionaryConfig, options: &Options) -> Result<Self> {
        let slots = FileSlots::create(path, config)?;
        Self::with_slots(slots, config.layout(), DictionaryType::OpenAddressFileHash, options)
    }

    /// Reopens a file-backed table.
    pub fn open(path: &Path, config: &DictionaryConfig, options: &Options) -> Result<Self> {
        let slots = FileSlots::open(path, config)?;
        let mut table =
            Self::with_slots(slots, config.layout(), DictionaryType::OpenAddressFileHash, options)?;
        table.live = table.count_live()?;
        Ok(table)
    }
}

impl<S: SlotStore> OpenAddress<S> {
    fn with_slots(
        slots: S,
        layout: RecordLayout,
        dictionary_type: DictionaryType,
        options: &Options,
    ) -> Result<Self> {
        if slots.capacity() == 0 {
            return Err(Error::invalid_argument("open address capacity must be > 0"));
        }
        let write_concern =
            options.write_concern.unwrap_or(dictionary_type.default_write_concern());
        if write_concern == WriteConcern::Duplicate {
            return Err(Error::WriteConcernViolation);
        }
        Ok(Self { slots, layout, dictionary_type, write_concern, live: 0 })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    fn home(&self, key: &[u8]) -> usize {
        (self.layout.hash(key) % self.capacity() as u64) as usize
    }

    /// Walks the probe chain of `key` from its home slot, stopping at the key,
    /// at an empty slot, or after visiting every slot once.
    fn probe(&self, key: &[u8]) -> Result<Probe> {
        let capacity = self.capacity();
        let home = self.home(key);
        let mut probe = Probe::default();
        let mut buf = vec![0u8; self.layout.record_size()];

        for step in 0..capacity {
            let index = (home + step) % capacity;
            self.slots.read_slot(index, &mut buf)?;
            let (status, candidate, _) = self.layout.decode(&buf)?;
            match status {
                RecordStatus::Empty => {
                    probe.free.get_or_insert(index);
                    break;
                }
                RecordStatus::Deleted => {
                    probe.free.get_or_insert(index);
                }
                RecordStatus::InUse => {
                    if self.layout.compare(candidate, key) == Ordering::Equal {
                        probe.found = Some(index);
                        break;
                    }
                }
            }
        }
        Ok(probe)
    }

    fn write_record(&mut self, index: usize, key: &[u8], value: &[u8]) -> Result<()> {
        let encoded = self.layout.encode(RecordStatus::InUse, key, value);
        self.slots.write_slot(index, &encoded)
    }

    fn claim(&mut self, free: Option<usize>, key: &[u8], value: &[u8]) -> Result<u32> {
        let index = free.ok_or(Error::MaxCapacity)?;
        self.write_record(index, key, value)?;
        self.live += 1;
        Ok(1)
    }

    fn count_live(&self) -> Result<usize> {
        let mut buf = vec![0u8; self.layout.record_size()];
        let mut live = 0;
        for index in 0..self.capacity() {
            self.slots.read_slot(index, &mut buf)?;
            if self.layout.decode(&buf)?.0 == RecordStatus::InUse {
                live += 1;
            }
        }
        Ok(live)
    }
}

impl<S: SlotStore> DictionaryEngine for OpenAddress<S> {
    fn dictionary_type(&self) -> DictionaryType {
        self.dictionary_type
    }

    fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    fn write_concern(&self) -> WriteConcern {
        self.write_concern
    }

    fn set_write_concern(&mut self, concern: WriteConcern) -> Result<()> {
        if concern == WriteConcern::Duplicate {
            return Err(Error::WriteConcernViolation);
        }
        self.write_concern = concern;
        Ok(())
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<u32> {
        let probe = self.probe(key)?;
        match (probe.found, self.write_concern) {
            (Some(index), WriteConcern::Update) => {
                self.write_record(index, key, value)?;
                Ok(1)
            }
            (Some(_), _) => Err(Error::DuplicateKey),
            (None, _) => self.claim(probe.free, key, value),
        }
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let index = self.probe(key)?.found.ok_or(Error::ItemNotFound)?;
        let mut buf = vec![0u8; self.layout.record_size()];
        self.slots.read_slot(index, &mut buf)?;
        let (_, _, value) = self.layout.decode(&buf)?;
        Ok(value.to_vec())
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<u32> {
        let probe = self.probe(key)?;
        match probe.found {
            Some(index) => {
                self.write_record(index, key, value)?;
                Ok(1)
            }
            None => self.claim(probe.free, key, value),
        }
    }

    fn delete(&mut self, key: &[u8]) -> Result<u32> {
        let index = self.probe(key)?.found.ok_or(Error::ItemNotFound)?;
        self.slots.write_status(index, RecordStatus::Deleted)?;
        self.live -= 1;
        Ok(1)
    }

    fn find<'a>(&'a self, predicate: &Predicate) -> Result<Box<dyn RecordSource + 'a>> {
        let mode = match predicate {
            Predicate::Equality(key) => ScanMode::Probe { home: self.home(key) },
            _ => ScanMode::Full,
        };
        Ok(Box::new(OpenAddressSource {
            table: self,
            predicate: predicate.clone(),
            mode,
            step: 0,
            buf: vec![0u8; self.layout.record_size()],
        }))
    }

    fn record_count(&self) -> Result<usize> {
        Ok(self.live)
    }

    fn flush(&mut self, sync: bool) -> Result<()> {
        self.slots.flush(sync)
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        self.slots.destroy()
    }
}

enum ScanMode {
    /// Follow the probe chain of the equality key.
    Probe { home: usize },
    /// Visit every slot once.
    Full,
}

struct OpenAddressSource<'a, S: SlotStore> {
    table: &'a OpenAddress<S>,
    predicate: Predicate,
    mode: ScanMode,
    step: usize,
    buf: Vec<u8>,
}

impl<S: SlotStore> RecordSource for OpenAddressSource<'_, S> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let capacity = self.table.capacity();
        let layout = &self.table.layout;

        while self.step < capacity {
            let index = match self.mode {
                ScanMode::Probe { home } => (home + self.step) % capacity,
                ScanMode::Full => self.step,
            };
            self.step += 1;

            self.table.slots.read_slot(index, &mut self.buf)?;
            let (status, key, value) = layout.decode(&self.buf)?;
            match status {
                RecordStatus::Empty if matches!(self.mode, ScanMode::Probe { .. }) => {
                    self.step = capacity;
                }
                RecordStatus::InUse if self.predicate.matches(layout, key) => {
                    let record = Record::new(key, value);
                    if matches!(self.mode, ScanMode::Probe { .. }) {
                        // Keys are unique, the chain holds at most one match.
                        self.step = capacity;
                    }
                    return Ok(Some(record));
                }
                _ => {}
            }
        }
        Ok(None)
    }
}
