//! The master table: a catalog of every dictionary in a directory.
//!
//! The catalog is itself a flat file dictionary keyed by dictionary id. Each
//! row holds the bincode encoding of a [`DictionaryConfig`]. Row 0 is the
//! master row; its `id` field carries the next id to hand out.

use crate::config::{
    DictionaryConfig, DictionaryId, DictionaryStatus, DictionaryType, Options, WriteConcern,
};
use crate::cursor::Cursor;
use crate::dictionary::{Dictionary, DictionaryEngine};
use crate::error::{Error, Result};
use crate::flat_file::FlatFile;
use crate::key::{decode_u64, encode_u64, KeyType};
use crate::predicate::Predicate;
use crate::storage;

/// File name of the master table inside the storage directory.
pub const MASTER_TABLE_FILE: &str = "ion_mt.tbl";

const ID_SIZE: usize = 4;
const MASTER_ROW: DictionaryId = 0;

/// Which match `find_by_use` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOrder {
    /// Lowest id.
    First,
    /// Highest id.
    Last,
}

/// Catalog of dictionaries.
///
/// # Example
///
/// ```no_run
/// use iondict::{DictionaryConfig, DictionaryType, KeyType, MasterTable, Options};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut catalog = MasterTable::new(&Options::default().directory("./data"));
/// catalog.init()?;
///
/// let config = DictionaryConfig::new(DictionaryType::SkipList, KeyType::NumericSigned, 4, 8);
/// let mut dict = catalog.create_dictionary(config)?;
/// catalog.close_dictionary(&mut dict)?;
///
/// let reopened = catalog.open_dictionary(dict.id())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MasterTable {
    options: Options,
    table: Option<FlatFile>,
    next_id: DictionaryId,
}

impl MasterTable {
    /// Creates an uninitialized catalog for `options.directory`.
    pub fn new(options: &Options) -> Self {
        Self { options: options.clone(), table: None, next_id: MASTER_ROW + 1 }
    }

    /// Opens the catalog file, creating it if it does not exist. Calling
    /// this on an initialized catalog does nothing.
    pub fn init(&mut self) -> Result<()> {
        if self.table.is_some() {
            return Ok(());
        }
        self.options.validate()?;

        let path = self.options.path_for(MASTER_TABLE_FILE);
        let config = table_config()?;
        let options = self.options.clone().write_concern(WriteConcern::InsertUnique);

        if path.exists() {
            let table = FlatFile::open(&path, &config, &options)?;
            let master = decode_row(&table.get(&row_key(MASTER_ROW))?)?;
            self.next_id = master.id;
            self.table = Some(table);
            log::info!("Opened master table {:?}, next id {}", path, self.next_id);
        } else {
            let mut table = FlatFile::create(&path, &config, &options)?;
            self.next_id = MASTER_ROW + 1;
            table.insert(&row_key(MASTER_ROW), &master_row(self.next_id)?)?;
            self.table = Some(table);
            log::info!("Created master table {:?}", path);
        }
        Ok(())
    }

    /// Returns true once `init` has succeeded and until `close`.
    pub fn is_initialized(&self) -> bool {
        self.table.is_some()
    }

    /// The id the next created dictionary will get.
    pub fn next_id(&self) -> Result<DictionaryId> {
        self.table()?;
        Ok(self.next_id)
    }

    /// Assigns an id to `config`, creates the dictionary and records it.
    pub fn create_dictionary(&mut self, config: DictionaryConfig) -> Result<Dictionary> {
        self.table()?;
        let id = self.next_id;
        let config = config.with_id(id);
        config.validate()?;

        // Reserve the id first so a failed create never reuses it.
        self.next_id = id + 1;
        let next = master_row(self.next_id)?;
        self.table_mut()?.update(&row_key(MASTER_ROW), &next)?;

        let dict = Dictionary::create(config, &self.options)?;
        match self.table_mut()?.insert(&row_key(id), &encode_row(dict.config())?) {
            Ok(_) => {}
            Err(Error::DuplicateKey) => return Err(Error::DuplicateDictionary(id)),
            Err(e) => return Err(e),
        }
        log::info!("Registered {:?} dictionary {}", dict.dictionary_type(), id);
        Ok(dict)
    }

    /// Metadata of dictionary `id`.
    pub fn lookup(&self, id: DictionaryId) -> Result<DictionaryConfig> {
        if id == MASTER_ROW {
            return Err(Error::ItemNotFound);
        }
        decode_row(&self.table()?.get(&row_key(id))?)
    }

    /// The first or last dictionary, by id, whose use type is `use_type`.
    pub fn find_by_use(&self, use_type: u32, order: SearchOrder) -> Result<DictionaryConfig> {
        let mut rows = self.rows()?;
        rows.retain(|config| config.use_type == use_type);
        let found = match order {
            SearchOrder::First => rows.into_iter().min_by_key(|config| config.id),
            SearchOrder::Last => rows.into_iter().max_by_key(|config| config.id),
        };
        found.ok_or(Error::ItemNotFound)
    }

    /// Every registered dictionary, in id order.
    pub fn dictionaries(&self) -> Result<Vec<DictionaryConfig>> {
        let mut rows = self.rows()?;
        rows.sort_by_key(|config| config.id);
        Ok(rows)
    }

    /// Removes the row of dictionary `id` without touching its storage.
    pub fn delete_from_table(&mut self, id: DictionaryId) -> Result<()> {
        if id == MASTER_ROW {
            return Err(Error::invalid_argument("the master row cannot be deleted"));
        }
        self.table_mut()?.delete(&row_key(id))?;
        Ok(())
    }

    /// Opens dictionary `id` and marks it open in the catalog.
    pub fn open_dictionary(&mut self, id: DictionaryId) -> Result<Dictionary> {
        let config = self.lookup(id)?;
        let dict = Dictionary::open(config, &self.options)?;
        self.record(dict.config())?;
        Ok(dict)
    }

    /// Closes `dict` and records it as closed in the catalog.
    pub fn close_dictionary(&mut self, dict: &mut Dictionary) -> Result<()> {
        dict.close()?;
        self.record(dict.config())
    }

    /// Destroys the storage of dictionary `id` and removes its row. Any open
    /// handle to the dictionary must be closed first.
    pub fn delete_dictionary(&mut self, id: DictionaryId) -> Result<()> {
        let config = self.lookup(id)?;
        Dictionary::detached(config, &self.options).destroy()?;
        self.delete_from_table(id)?;
        log::info!("Deleted dictionary {}", id);
        Ok(())
    }

    /// Flushes and closes the catalog file.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut table) = self.table.take() {
            table.flush(self.options.sync_on_close)?;
            log::info!("Closed master table");
        }
        Ok(())
    }

    /// Closes the catalog and removes its file. Dictionaries it lists are
    /// left in place.
    pub fn delete(mut self) -> Result<()> {
        self.close()?;
        let path = self.options.path_for(MASTER_TABLE_FILE);
        if path.exists() {
            storage::remove_file(&path)?;
        }
        log::info!("Deleted master table {:?}", path);
        Ok(())
    }

    fn table(&self) -> Result<&FlatFile> {
        self.table.as_ref().ok_or(Error::Uninitialized)
    }

    fn table_mut(&mut self) -> Result<&mut FlatFile> {
        self.table.as_mut().ok_or(Error::Uninitialized)
    }

    fn record(&mut self, config: &DictionaryConfig) -> Result<()> {
        let row = encode_row(config)?;
        self.table_mut()?.update(&row_key(config.id), &row)?;
        Ok(())
    }

    fn rows(&self) -> Result<Vec<DictionaryConfig>> {
        let table = self.table()?;
        let mut rows = Vec::new();
        for record in Cursor::new(table.find(&Predicate::All)?)? {
            let record = record?;
            if decode_u64(&record.key) as DictionaryId != MASTER_ROW {
                rows.push(decode_row(&record.value)?);
            }
        }
        Ok(rows)
    }
}

/// Config of the catalog's own flat file.
fn table_config() -> Result<DictionaryConfig> {
    let value_size = row_size()?;
    Ok(DictionaryConfig::new(
        DictionaryType::FlatFile,
        KeyType::NumericUnsigned,
        ID_SIZE as u32,
        value_size as u32,
    ))
}

fn row_size() -> Result<usize> {
    let probe = DictionaryConfig::new(DictionaryType::FlatFile, KeyType::NumericUnsigned, 0, 0);
    Ok(bincode::serialized_size(&probe)? as usize)
}

fn row_key(id: DictionaryId) -> Vec<u8> {
    encode_u64(id as u64, ID_SIZE)
}

fn master_row(next_id: DictionaryId) -> Result<Vec<u8>> {
    let row = DictionaryConfig::new(DictionaryType::FlatFile, KeyType::NumericUnsigned, 0, 0)
        .with_id(next_id);
    encode_row(&row)
}

fn encode_row(config: &DictionaryConfig) -> Result<Vec<u8>> {
    Ok(bincode::serialize(config)?)
}

fn decode_row(value: &[u8]) -> Result<DictionaryConfig> {
    Ok(bincode::deserialize(value)?)
}

impl Drop for MasterTable {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close master table on drop: {}", e);
        }
    }
}
