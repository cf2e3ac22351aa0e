//! Master table example for iondict
//!
//! Registers a few dictionaries in the catalog, looks them up by use type
//! and reopens one by id.

use iondict::key::encode_u64;
use iondict::{DictionaryConfig, DictionaryType, KeyType, MasterTable, Options, SearchOrder};

const SENSORS: u32 = 1;
const EVENTS: u32 = 2;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    std::fs::create_dir_all("./example_catalog")?;
    let options = Options::default().directory("./example_catalog");
    let mut catalog = MasterTable::new(&options);
    catalog.init()?;
    println!("Catalog ready, next id {}", catalog.next_id()?);

    let mut sensors = catalog.create_dictionary(
        DictionaryConfig::new(DictionaryType::LinearHash, KeyType::NumericUnsigned, 4, 8)
            .with_dictionary_size(4)
            .with_use_type(SENSORS),
    )?;
    let mut events = catalog.create_dictionary(
        DictionaryConfig::new(DictionaryType::SkipList, KeyType::NumericUnsigned, 8, 16)
            .with_use_type(EVENTS),
    )?;

    for id in 0..16u64 {
        sensors.insert(&encode_u64(id, 4), &(id * 100).to_le_bytes());
    }
    events.insert(&encode_u64(1, 8), b"boot            ");

    catalog.close_dictionary(&mut sensors)?;
    catalog.close_dictionary(&mut events)?;

    for config in catalog.dictionaries()? {
        println!(
            "{:>3} {:?} use={} status={:?}",
            config.id, config.dictionary_type, config.use_type, config.status
        );
    }

    let found = catalog.find_by_use(SENSORS, SearchOrder::Last)?;
    let sensors = catalog.open_dictionary(found.id)?;
    println!("Sensor dictionary {} holds {} records", sensors.id(), sensors.len()?);
    drop(sensors);

    for config in catalog.dictionaries()? {
        catalog.delete_dictionary(config.id)?;
    }
    catalog.delete()?;
    println!("Catalog deleted");

    Ok(())
}
