//! # iondict - Embedded Key/Value Dictionaries
//!
//! iondict is a library of fixed-layout key/value dictionaries for small
//! devices and embedded applications. Every dictionary stores records of a
//! fixed key size and value size, and exposes the same operations no matter
//! which structure engine sits underneath.
//!
//! ## Architecture
//!
//! - **Record codec**: `{status}{key}{value}` framing and per-key-type comparison
//! - **Flat file**: unordered record file scanned linearly
//! - **Open address hash**: fixed-capacity linear probing, in memory or on file
//! - **Linear hash**: growable hash with overflow chains and caller-driven splits
//! - **B+tree**: ordered in-memory tree with a chained leaf level
//! - **Skip list**: ordered in-memory layered list
//! - **Dictionary**: the facade binding one engine, returning [`Status`] values
//! - **Cursor**: predicate-driven iteration over ALL, EQUALITY or RANGE
//! - **Master table**: on-disk catalog that assigns ids and remembers configs
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use iondict::key::encode_i64;
//! use iondict::{Dictionary, DictionaryConfig, DictionaryType, KeyType, Options, Predicate};
//!
//! # fn main() -> Result<(), iondict::Error> {
//! let options = Options::default().directory("./data");
//! let config = DictionaryConfig::new(DictionaryType::BPlusTree, KeyType::NumericSigned, 4, 8)
//!     .with_id(1);
//! let mut dict = Dictionary::create(config, &options)?;
//!
//! // Mutations report an error code and an affected count
//! let status = dict.insert(&encode_i64(10, 4), b"ten     ");
//! assert!(status.is_ok());
//!
//! // Point and range reads
//! let value = dict.get(&encode_i64(10, 4))?;
//! for record in dict.find(&Predicate::range(encode_i64(0, 4), encode_i64(50, 4)))? {
//!     println!("{:?}", record?);
//! }
//!
//! dict.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod bplus_tree;
pub mod config;
pub mod cursor;
pub mod dictionary;
pub mod error;
pub mod flat_file;
pub mod key;
pub mod linear_hash;
pub mod master_table;
pub mod open_address;
pub mod predicate;
pub mod record;
pub mod skip_list;
pub mod storage;

// Re-exports
pub use bplus_tree::BPlusTree;
pub use config::{
    DictionaryConfig, DictionaryId, DictionaryStatus, DictionaryType, Options, WriteConcern,
};
pub use cursor::{Cursor, CursorState, RecordSource};
pub use dictionary::{Dictionary, DictionaryEngine};
pub use error::{Error, ErrorCode, Result, Status};
pub use flat_file::FlatFile;
pub use key::KeyType;
pub use linear_hash::LinearHash;
pub use master_table::{MasterTable, SearchOrder};
pub use open_address::{OpenAddressFileHash, OpenAddressHash};
pub use predicate::Predicate;
pub use record::{Record, RecordLayout, RecordStatus};
pub use skip_list::SkipList;
