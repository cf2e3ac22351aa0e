//! Basic usage example for iondict
//!
//! This example demonstrates the fundamental operations on a B+tree
//! dictionary:
//! - Creating a dictionary
//! - Inserting, reading, updating and deleting records
//! - Iterating a range with a cursor
//! - Closing and reopening

use iondict::key::{decode_i64, encode_i64};
use iondict::{Dictionary, DictionaryConfig, DictionaryType, KeyType, Options, Predicate};

fn value(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(10, b' ');
    bytes
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    std::fs::create_dir_all("./example_data")?;
    let options = Options::default().directory("./example_data");
    let config = DictionaryConfig::new(DictionaryType::BPlusTree, KeyType::NumericSigned, 4, 10)
        .with_id(1);

    let mut dict = Dictionary::create(config.clone(), &options)?;
    println!("Dictionary created");

    println!("Inserting data...");
    for key in [5, 10, 25, 50, 70] {
        let status = dict.insert(&encode_i64(key, 4), &value(&format!("{:02} is key", key)));
        println!("insert {} => {:?}", key, status);
    }

    let found = dict.get(&encode_i64(25, 4))?;
    println!("25 => {:?}", String::from_utf8_lossy(&found));

    let status = dict.update(&encode_i64(25, 4), &value("updated"));
    println!("update 25 => {:?}", status);

    println!("Range 15..=55:");
    for record in dict.find(&Predicate::range(encode_i64(15, 4), encode_i64(55, 4)))? {
        let record = record?;
        println!("  {} => {:?}", decode_i64(&record.key), String::from_utf8_lossy(&record.value));
    }

    let status = dict.delete(&encode_i64(10, 4));
    println!("delete 10 => {:?}", status);
    let status = dict.delete(&encode_i64(10, 4));
    println!("delete 10 again => {:?}", status);

    // Spills the tree to disk; opening reloads it
    dict.close()?;
    let dict = Dictionary::open(config, &options)?;
    println!("Reopened with {} records", dict.len()?);

    dict.destroy()?;
    println!("Dictionary destroyed");

    Ok(())
}
