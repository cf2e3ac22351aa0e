//! Linear hash splitting example for iondict
//!
//! Fills a small linear hash until buckets overflow, then splits buckets one
//! at a time and shows the split pointer and level advancing.

use iondict::key::encode_u64;
use iondict::{DictionaryConfig, DictionaryEngine, DictionaryType, KeyType, LinearHash, Options};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let dir = std::env::temp_dir().join("iondict_linear_hash_demo");
    std::fs::create_dir_all(&dir)?;
    let options = Options::default().directory(&dir).records_per_bucket(2);
    let config = DictionaryConfig::new(DictionaryType::LinearHash, KeyType::NumericUnsigned, 4, 4)
        .with_dictionary_size(4)
        .with_id(1);

    let mut table = LinearHash::create(&config, &options)?;
    for key in 0..24u64 {
        table.insert(&encode_u64(key, 4), &(key as u32).to_le_bytes())?;
    }
    println!(
        "{} buckets, load factor {}%",
        table.bucket_count(),
        table.load_factor()
    );

    for _ in 0..6 {
        table.split()?;
        println!(
            "level {} pointer {} buckets {} load {}%",
            table.level(),
            table.bucket_pointer(),
            table.bucket_count(),
            table.load_factor()
        );
    }

    for key in 0..24u64 {
        let value = table.get(&encode_u64(key, 4))?;
        assert_eq!(value, (key as u32).to_le_bytes());
    }
    println!("All 24 keys still reachable");

    Box::new(table).destroy()?;
    Ok(())
}
