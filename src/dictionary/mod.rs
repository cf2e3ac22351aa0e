//! The dictionary facade.
//!
//! A [`Dictionary`] binds one structure engine behind a uniform interface.
//! Mutating operations return a [`Status`] carrying an error code and the
//! number of affected records; reads return [`Result`].
//!
//! In-memory engines have no storage of their own. Closing one spills its
//! records into a flat file named after the dictionary id, and opening it
//! again reloads them.

mod engine;

pub use engine::DictionaryEngine;

use crate::bplus_tree::BPlusTree;
use crate::config::{
    DictionaryConfig, DictionaryId, DictionaryStatus, DictionaryType, Options, WriteConcern,
};
use crate::cursor::Cursor;
use crate::error::{Error, Result, Status};
use crate::flat_file::FlatFile;
use crate::linear_hash::LinearHash;
use crate::open_address::{OpenAddressFileHash, OpenAddressHash};
use crate::predicate::Predicate;
use crate::record::RecordLayout;
use crate::skip_list::SkipList;
use crate::storage;

/// A handle to one dictionary.
pub struct Dictionary {
    config: DictionaryConfig,
    options: Options,
    engine: Option<Box<dyn DictionaryEngine>>,
}

impl Dictionary {
    /// Creates a new, empty dictionary described by `config`.
    ///
    /// Any storage left behind by an earlier dictionary with the same id is
    /// overwritten.
    pub fn create(config: DictionaryConfig, options: &Options) -> Result<Self> {
        config.validate()?;
        options.validate()?;
        let engine = create_engine(&config, options)?;
        log::info!(
            "Created {:?} dictionary {} ({:?} key of {} bytes, {} byte values)",
            config.dictionary_type,
            config.id,
            config.key_type,
            config.key_size,
            config.value_size
        );
        Ok(Self {
            config: DictionaryConfig { status: DictionaryStatus::Ok, ..config },
            options: options.clone(),
            engine: Some(engine),
        })
    }

    /// Opens a dictionary that was created and closed earlier.
    pub fn open(config: DictionaryConfig, options: &Options) -> Result<Self> {
        config.validate()?;
        options.validate()?;
        let engine = open_engine(&config, options)?;
        log::info!("Opened {:?} dictionary {}", config.dictionary_type, config.id);
        Ok(Self {
            config: DictionaryConfig { status: DictionaryStatus::Ok, ..config },
            options: options.clone(),
            engine: Some(engine),
        })
    }

    /// A closed handle for a dictionary whose storage already exists.
    pub(crate) fn detached(config: DictionaryConfig, options: &Options) -> Self {
        Self {
            config: DictionaryConfig { status: DictionaryStatus::Closed, ..config },
            options: options.clone(),
            engine: None,
        }
    }

    /// Opens a closed handle again. Does nothing if it is open.
    pub fn reopen(&mut self) -> Result<()> {
        if self.engine.is_some() {
            return Ok(());
        }
        self.engine = Some(open_engine(&self.config, &self.options)?);
        self.config.status = DictionaryStatus::Ok;
        log::info!("Reopened dictionary {}", self.config.id);
        Ok(())
    }

    /// Persists the dictionary and releases its engine.
    ///
    /// Closing a closed dictionary succeeds without doing anything.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut engine) = self.engine.take() else {
            return Ok(());
        };

        let result = if self.config.dictionary_type.is_file_backed() {
            engine.flush(self.options.sync_on_close)
        } else {
            spill(&*engine, &self.config, &self.options)
        };
        if let Err(e) = result {
            log::error!("Failed to close dictionary {}: {}", self.config.id, e);
            self.engine = Some(engine);
            return Err(e);
        }

        self.options.write_concern = Some(engine.write_concern());
        self.config.status = DictionaryStatus::Closed;
        log::info!("Closed dictionary {}", self.config.id);
        Ok(())
    }

    /// Removes every file belonging to the dictionary.
    pub fn destroy(mut self) -> Result<()> {
        let config = &self.config;
        match self.engine.take() {
            Some(engine) => engine.destroy()?,
            None if config.dictionary_type.is_file_backed() => {
                open_engine(config, &self.options)?.destroy()?
            }
            None => {
                let path = self.options.path_for(&FlatFile::file_name(config.id));
                if path.exists() {
                    storage::remove_file(&path)?;
                }
            }
        }
        log::info!("Destroyed dictionary {}", config.id);
        Ok(())
    }

    /// Inserts a record according to the write concern.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Status {
        let result = self.checked(key, Some(value)).and_then(|engine| engine.insert(key, value));
        self.status("insert", result)
    }

    /// Returns the value of the first record with `key`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let engine = self.engine()?;
        engine.layout().check_key(key)?;
        engine.get(key)
    }

    /// Overwrites every record with `key`, inserting one if there is none.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Status {
        let result = self.checked(key, Some(value)).and_then(|engine| engine.update(key, value));
        self.status("update", result)
    }

    /// Removes every record with `key`.
    pub fn delete(&mut self, key: &[u8]) -> Status {
        let result = self.checked(key, None).and_then(|engine| engine.delete(key));
        self.status("delete", result)
    }

    /// Returns a cursor over the records matching `predicate`.
    ///
    /// The cursor borrows the dictionary, so it cannot be mutated until the
    /// cursor is dropped.
    pub fn find(&self, predicate: &Predicate) -> Result<Cursor<'_>> {
        let engine = self.engine()?;
        predicate.validate(engine.layout())?;
        Cursor::new(engine.find(predicate)?)
    }

    /// Splits the next bucket of a linear hash.
    pub fn split(&mut self) -> Result<()> {
        self.engine_mut()?.split()
    }

    /// Changes how inserts treat existing keys.
    ///
    /// The concern is not written to storage. [`reopen`](Self::reopen) on this
    /// handle keeps it, while [`Dictionary::open`] starts again from
    /// `Options::write_concern` or the engine default.
    pub fn set_write_concern(&mut self, concern: WriteConcern) -> Result<()> {
        self.engine_mut()?.set_write_concern(concern)
    }

    /// Current write concern.
    pub fn write_concern(&self) -> Result<WriteConcern> {
        Ok(self.engine()?.write_concern())
    }

    /// Number of records in use.
    pub fn len(&self) -> Result<usize> {
        self.engine()?.record_count()
    }

    /// Returns true if the dictionary holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns true unless the dictionary has been closed.
    pub fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    /// Metadata of this dictionary.
    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }

    /// Catalog id.
    pub fn id(&self) -> DictionaryId {
        self.config.id
    }

    /// Engine backing the dictionary.
    pub fn dictionary_type(&self) -> DictionaryType {
        self.config.dictionary_type
    }

    /// Key and record sizes.
    pub fn layout(&self) -> RecordLayout {
        self.config.layout()
    }

    fn engine(&self) -> Result<&dyn DictionaryEngine> {
        self.engine.as_deref().ok_or(Error::Uninitialized)
    }

    fn engine_mut(&mut self) -> Result<&mut Box<dyn DictionaryEngine>> {
        self.engine.as_mut().ok_or(Error::Uninitialized)
    }

    fn checked(
        &mut self,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<&mut Box<dyn DictionaryEngine>> {
        let engine = self.engine_mut()?;
        engine.layout().check_key(key)?;
        if let Some(value) = value {
            engine.layout().check_value(value)?;
        }
        Ok(engine)
    }

    fn status(&self, operation: &str, result: Result<u32>) -> Status {
        if let Err(e) = &result {
            if is_storage_error(e) {
                log::error!("{} on dictionary {} failed: {}", operation, self.config.id, e);
            }
        }
        Status::from(result)
    }
}

/// Closes an open dictionary. In-memory engines spill to `{id}.ffs` inside
/// `Options::directory`, which defaults to the working directory.
impl Drop for Dictionary {
    fn drop(&mut self) {
        if self.engine.is_some() {
            if let Err(e) = self.close() {
                log::warn!("Failed to close dictionary {} on drop: {}", self.config.id, e);
            }
        }
    }
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}

fn is_storage_error(e: &Error) -> bool {
    matches!(
        e,
        Error::FileWrite(_)
            | Error::FileRead(_)
            | Error::FileOpen(_)
            | Error::FileClose(_)
            | Error::FileDelete(_)
            | Error::FileBadSeek(_)
            | Error::FileHitEof
            | Error::Corruption(_)
    )
}

fn create_engine(
    config: &DictionaryConfig,
    options: &Options,
) -> Result<Box<dyn DictionaryEngine>> {
    Ok(match config.dictionary_type {
        DictionaryType::BPlusTree => Box::new(BPlusTree::create(config, options)?),
        DictionaryType::FlatFile => {
            let path = options.path_for(&FlatFile::file_name(config.id));
            Box::new(FlatFile::create(&path, config, options)?)
        }
        DictionaryType::OpenAddressFileHash => {
            let path = options.path_for(&OpenAddressFileHash::file_name(config.id));
            Box::new(OpenAddressFileHash::create(&path, config, options)?)
        }
        DictionaryType::OpenAddressHash => Box::new(OpenAddressHash::create(config, options)?),
        DictionaryType::SkipList => Box::new(SkipList::create(config, options)?),
        DictionaryType::LinearHash => Box::new(LinearHash::create(config, options)?),
    })
}

fn open_engine(config: &DictionaryConfig, options: &Options) -> Result<Box<dyn DictionaryEngine>> {
    match config.dictionary_type {
        DictionaryType::FlatFile => {
            let path = options.path_for(&FlatFile::file_name(config.id));
            Ok(Box::new(FlatFile::open(&path, config, options)?))
        }
        DictionaryType::OpenAddressFileHash => {
            let path = options.path_for(&OpenAddressFileHash::file_name(config.id));
            Ok(Box::new(OpenAddressFileHash::open(&path, config, options)?))
        }
        DictionaryType::LinearHash => Ok(Box::new(LinearHash::open(config, options)?)),
        DictionaryType::BPlusTree | DictionaryType::OpenAddressHash | DictionaryType::SkipList => {
            let mut engine = create_engine(config, options)?;
            reload(&mut *engine, config, options)?;
            Ok(engine)
        }
    }
}

/// Config of the flat file an in-memory dictionary spills into.
fn spill_config(config: &DictionaryConfig) -> DictionaryConfig {
    DictionaryConfig { dictionary_type: DictionaryType::FlatFile, ..config.clone() }
}

fn spill(
    engine: &dyn DictionaryEngine,
    config: &DictionaryConfig,
    options: &Options,
) -> Result<()> {
    let path = options.path_for(&FlatFile::file_name(config.id));
    let spill_options = options.clone().write_concern(WriteConcern::Duplicate);
    let mut file = FlatFile::create(&path, &spill_config(config), &spill_options)?;

    let mut count = 0;
    for record in Cursor::new(engine.find(&Predicate::All)?)? {
        let record = record?;
        file.insert(&record.key, &record.value)?;
        count += 1;
    }
    file.flush(options.sync_on_close)?;
    log::debug!("Spilled {} records of dictionary {} to {:?}", count, config.id, path);
    Ok(())
}

fn reload(
    engine: &mut dyn DictionaryEngine,
    config: &DictionaryConfig,
    options: &Options,
) -> Result<()> {
    let path = options.path_for(&FlatFile::file_name(config.id));
    let file = FlatFile::open(&path, &spill_config(config), options)?;

    // Spilled duplicates must come back as duplicates.
    let concern = engine.write_concern();
    let relaxed = engine.set_write_concern(WriteConcern::Duplicate).is_ok();
    let mut count = 0;
    for record in Cursor::new(file.find(&Predicate::All)?)? {
        let record = record?;
        engine.insert(&record.key, &record.value)?;
        count += 1;
    }
    if relaxed {
        engine.set_write_concern(concern)?;
    }
    drop(file);

    if let Err(e) = storage::remove_file(&path) {
        log::warn!("Failed to remove spill file {:?}: {}", path, e);
    }
    log::debug!("Reloaded {} records of dictionary {}", count, config.id);
    Ok(())
}
