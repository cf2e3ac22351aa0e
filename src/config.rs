//! Configuration for iondict.
//!
//! [`Options`] holds crate-wide tuning that applies to every dictionary
//! opened with it. [`DictionaryConfig`] describes one dictionary instance and
//! is what the master table persists.

use crate::error::{Error, Result};
use crate::key::KeyType;
use crate::record::RecordLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identifier assigned to a dictionary by the master table.
pub type DictionaryId = u32;

/// How an insert treats a key that is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteConcern {
    /// Reject with `DuplicateKey`.
    InsertUnique,
    /// Overwrite the stored value.
    Update,
    /// Store another record under the same key.
    Duplicate,
}

/// The structure engines a dictionary can be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DictionaryType {
    /// In-memory B+tree.
    BPlusTree = 0,
    /// Unordered record file scanned linearly.
    FlatFile = 1,
    /// File-backed open addressing hash.
    OpenAddressFileHash = 2,
    /// In-memory open addressing hash.
    OpenAddressHash = 3,
    /// In-memory skip list.
    SkipList = 4,
    /// File-backed linear hash with overflow chains.
    LinearHash = 5,
}

impl DictionaryType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DictionaryType::BPlusTree),
            1 => Some(DictionaryType::FlatFile),
            2 => Some(DictionaryType::OpenAddressFileHash),
            3 => Some(DictionaryType::OpenAddressHash),
            4 => Some(DictionaryType::SkipList),
            5 => Some(DictionaryType::LinearHash),
            _ => None,
        }
    }

    /// Returns true if the engine keeps its records in its own files and can
    /// be closed and reopened in place.
    pub fn is_file_backed(self) -> bool {
        matches!(
            self,
            DictionaryType::FlatFile
                | DictionaryType::OpenAddressFileHash
                | DictionaryType::LinearHash
        )
    }

    /// Write concern an engine starts with.
    pub fn default_write_concern(self) -> WriteConcern {
        match self {
            DictionaryType::FlatFile
            | DictionaryType::OpenAddressFileHash
            | DictionaryType::OpenAddressHash => WriteConcern::InsertUnique,
            DictionaryType::BPlusTree | DictionaryType::SkipList | DictionaryType::LinearHash => {
                WriteConcern::Duplicate
            }
        }
    }
}

/// Health of a dictionary as recorded in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DictionaryStatus {
    /// Open and usable.
    Ok,
    /// Storage persisted, handle closed.
    Closed,
    /// A failed operation left the dictionary unusable.
    Error,
}

/// Metadata describing one dictionary instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    /// Catalog id; also names the dictionary's files.
    pub id: DictionaryId,
    /// Application-defined tag searched by `find_by_use`.
    pub use_type: u32,
    /// Key interpretation.
    pub key_type: KeyType,
    /// Key width in bytes.
    pub key_size: u32,
    /// Value width in bytes.
    pub value_size: u32,
    /// Capacity or initial size, meaning depends on the engine.
    pub dictionary_size: u32,
    /// Engine backing the dictionary.
    pub dictionary_type: DictionaryType,
    /// Catalog status.
    pub status: DictionaryStatus,
}

impl DictionaryConfig {
    /// Creates a config with id 0, use type 0 and no size hint.
    pub fn new(
        dictionary_type: DictionaryType,
        key_type: KeyType,
        key_size: u32,
        value_size: u32,
    ) -> Self {
        Self {
            id: 0,
            use_type: 0,
            key_type,
            key_size,
            value_size,
            dictionary_size: 0,
            dictionary_type,
            status: DictionaryStatus::Ok,
        }
    }

    /// Sets the capacity / initial size.
    pub fn with_dictionary_size(mut self, size: u32) -> Self {
        self.dictionary_size = size;
        self
    }

    /// Sets the use type tag.
    pub fn with_use_type(mut self, use_type: u32) -> Self {
        self.use_type = use_type;
        self
    }

    /// Sets the id.
    pub fn with_id(mut self, id: DictionaryId) -> Self {
        self.id = id;
        self
    }

    /// Record layout implied by this config.
    pub fn layout(&self) -> RecordLayout {
        RecordLayout::new(self.key_type, self.key_size as usize, self.value_size as usize)
    }

    /// Validates the config.
    pub fn validate(&self) -> Result<()> {
        if self.key_size == 0 {
            return Err(Error::invalid_argument("key_size must be > 0"));
        }
        if self.key_type.is_numeric() && self.key_size > 8 {
            return Err(Error::invalid_argument("numeric keys must be at most 8 bytes"));
        }
        if matches!(
            self.dictionary_type,
            DictionaryType::OpenAddressHash | DictionaryType::OpenAddressFileHash
        ) && self.dictionary_size == 0
        {
            return Err(Error::invalid_argument("open address capacity must be > 0"));
        }
        Ok(())
    }
}

/// Configuration options shared by the dictionaries of one directory.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory holding dictionary files and the master table. In-memory
    /// dictionaries spill here when closed or dropped.
    /// Default: current directory
    pub directory: PathBuf,

    /// Overrides each engine's default write concern.
    /// Default: None
    pub write_concern: Option<WriteConcern>,

    /// Slots in one linear hash bucket page.
    /// Default: 2
    pub records_per_bucket: usize,

    /// Load factor (percent of primary slots in use) at which linear hash
    /// inserts split a bucket themselves. `None` leaves splitting to the caller.
    /// Default: None
    pub linear_hash_split_threshold: Option<u32>,

    /// Maximum entries per B+tree node.
    /// Default: 32
    pub bplus_tree_order: usize,

    /// Maximum tower height of a skip list node.
    /// Default: 16
    pub skip_list_max_height: usize,

    /// Probability of promoting a skip list node one more level.
    /// Default: 0.5
    pub skip_list_promotion: f64,

    /// Fsync file-backed dictionaries when they are closed.
    /// Default: true
    pub sync_on_close: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            write_concern: None,
            records_per_bucket: 2,
            linear_hash_split_threshold: None,
            bplus_tree_order: 32,
            skip_list_max_height: 16,
            skip_list_promotion: 0.5,
            sync_on_close: true,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the storage directory.
    pub fn directory<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.directory = dir.as_ref().to_path_buf();
        self
    }

    /// Sets the write concern override.
    pub fn write_concern(mut self, concern: WriteConcern) -> Self {
        self.write_concern = Some(concern);
        self
    }

    /// Sets the linear hash page size.
    pub fn records_per_bucket(mut self, n: usize) -> Self {
        self.records_per_bucket = n;
        self
    }

    /// Enables automatic linear hash splitting at the given load factor.
    pub fn linear_hash_split_threshold(mut self, percent: u32) -> Self {
        self.linear_hash_split_threshold = Some(percent);
        self
    }

    /// Sets the B+tree order.
    pub fn bplus_tree_order(mut self, order: usize) -> Self {
        self.bplus_tree_order = order;
        self
    }

    /// Sets the skip list maximum height.
    pub fn skip_list_max_height(mut self, height: usize) -> Self {
        self.skip_list_max_height = height;
        self
    }

    /// Sets whether close fsyncs file-backed dictionaries.
    pub fn sync_on_close(mut self, value: bool) -> Self {
        self.sync_on_close = value;
        self
    }

    /// Path of a file inside the storage directory.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.records_per_bucket == 0 {
            return Err(Error::invalid_argument("records_per_bucket must be > 0"));
        }
        if self.bplus_tree_order < 3 {
            return Err(Error::invalid_argument("bplus_tree_order must be >= 3"));
        }
        if self.skip_list_max_height == 0 {
            return Err(Error::invalid_argument("skip_list_max_height must be > 0"));
        }
        if self.skip_list_promotion <= 0.0 || self.skip_list_promotion >= 1.0 {
            return Err(Error::invalid_argument(
                "skip_list_promotion must be between 0 and 1",
            ));
        }
        if let Some(percent) = self.linear_hash_split_threshold {
            if percent == 0 {
                return Err(Error::invalid_argument("linear_hash_split_threshold must be > 0"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert_eq!(opts.records_per_bucket, 2);
        assert_eq!(opts.bplus_tree_order, 32);
        assert!(opts.write_concern.is_none());
        assert!(opts.linear_hash_split_threshold.is_none());
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new()
            .directory("/tmp/dicts")
            .records_per_bucket(4)
            .bplus_tree_order(5)
            .write_concern(WriteConcern::Update);

        assert_eq!(opts.path_for("1.ffs"), PathBuf::from("/tmp/dicts/1.ffs"));
        assert_eq!(opts.records_per_bucket, 4);
        assert_eq!(opts.bplus_tree_order, 5);
        assert_eq!(opts.write_concern, Some(WriteConcern::Update));
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        assert!(opts.validate().is_ok());

        opts.bplus_tree_order = 2;
        assert!(opts.validate().is_err());

        opts.bplus_tree_order = 4;
        opts.skip_list_promotion = 1.5;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_config_validation() {
        let cfg = DictionaryConfig::new(DictionaryType::FlatFile, KeyType::NumericSigned, 4, 10);
        assert!(cfg.validate().is_ok());

        let cfg = DictionaryConfig::new(DictionaryType::FlatFile, KeyType::NumericSigned, 9, 10);
        assert!(cfg.validate().is_err());

        let cfg =
            DictionaryConfig::new(DictionaryType::OpenAddressHash, KeyType::CharArray, 9, 10);
        assert!(cfg.validate().is_err());
        assert!(cfg.with_dictionary_size(8).validate().is_ok());
    }

    #[test]
    fn test_config_encodes_fixed_size() {
        let a = DictionaryConfig::new(DictionaryType::SkipList, KeyType::NumericUnsigned, 4, 4);
        let b = a.clone().with_id(u32::MAX).with_dictionary_size(1 << 20).with_use_type(9);
        let a_len = bincode::serialized_size(&a).unwrap();
        assert_eq!(a_len, bincode::serialized_size(&b).unwrap());
    }
}
