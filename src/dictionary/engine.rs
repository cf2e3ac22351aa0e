//! The operation table every structure engine implements.

use crate::config::{DictionaryType, WriteConcern};
use crate::cursor::RecordSource;
use crate::error::{Error, Result};
use crate::predicate::Predicate;
use crate::record::RecordLayout;

/// A structure engine behind the dictionary facade.
///
/// Keys and values passed in have already been checked against
/// [`layout`](DictionaryEngine::layout) by the caller. Counts returned by
/// the mutating operations are the number of records affected.
pub trait DictionaryEngine: Send {
    /// Which engine this is.
    fn dictionary_type(&self) -> DictionaryType;

    /// Key type and record sizes.
    fn layout(&self) -> &RecordLayout;

    /// Current write concern.
    fn write_concern(&self) -> WriteConcern;

    /// Changes the write concern. Engines that cannot honour a concern
    /// return [`Error::WriteConcernViolation`].
    fn set_write_concern(&mut self, concern: WriteConcern) -> Result<()>;

    /// Inserts a record, honouring the write concern for existing keys.
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<u32>;

    /// Returns the value of the first record with `key`.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Overwrites every record with `key`, or inserts one if none exists.
    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<u32>;

    /// Removes every record with `key`. Fails with `ItemNotFound` if none.
    fn delete(&mut self, key: &[u8]) -> Result<u32>;

    /// Builds a source of the records matching `predicate`.
    fn find<'a>(&'a self, predicate: &Predicate) -> Result<Box<dyn RecordSource + 'a>>;

    /// Number of live records.
    fn record_count(&self) -> Result<usize>;

    /// Splits one bucket. Only meaningful for growable hash engines.
    fn split(&mut self) -> Result<()> {
        Err(Error::not_implemented(format!("split on {:?}", self.dictionary_type())))
    }

    /// Persists pending state ahead of closing.
    fn flush(&mut self, _sync: bool) -> Result<()> {
        Ok(())
    }

    /// Releases all storage held by the engine.
    fn destroy(self: Box<Self>) -> Result<()>;
}
