// End-to-end tests of the dictionary facade
// These tests run the same flows against every structure engine

use iondict::key::{decode_i64, encode_i64};
use iondict::{
    CursorState, Dictionary, DictionaryConfig, DictionaryEngine, DictionaryType, Error, ErrorCode,
    KeyType, LinearHash, Options, Predicate, Status, WriteConcern,
};
use tempfile::TempDir;

const ALL_TYPES: [DictionaryType; 6] = [
    DictionaryType::BPlusTree,
    DictionaryType::FlatFile,
    DictionaryType::OpenAddressFileHash,
    DictionaryType::OpenAddressHash,
    DictionaryType::SkipList,
    DictionaryType::LinearHash,
];

fn k(v: i64) -> Vec<u8> {
    encode_i64(v, 4)
}

fn v(n: i64) -> Vec<u8> {
    encode_i64(n, 4)
}

fn config(dictionary_type: DictionaryType) -> DictionaryConfig {
    let size = match dictionary_type {
        DictionaryType::LinearHash => 4,
        _ => 64,
    };
    DictionaryConfig::new(dictionary_type, KeyType::NumericSigned, 4, 4)
        .with_dictionary_size(size)
        .with_id(3)
}

fn sorted_keys(dict: &Dictionary, predicate: &Predicate) -> Vec<i64> {
    let mut keys: Vec<i64> = dict
        .find(predicate)
        .unwrap()
        .map(|r| decode_i64(&r.unwrap().key))
        .collect();
    keys.sort();
    keys
}

/// "NN is key", padded to 10 bytes
fn scenario_value(n: i64) -> Vec<u8> {
    let mut value = format!("{:02} is key", n).into_bytes();
    value.resize(10, 0);
    value
}

#[test]
fn test_flat_file_scenario() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());
    let config = DictionaryConfig::new(DictionaryType::FlatFile, KeyType::NumericSigned, 4, 10)
        .with_dictionary_size(10)
        .with_id(1);
    let mut dict = Dictionary::create(config, &options).unwrap();

    for n in 0..10 {
        assert_eq!(dict.insert(&k(n), &scenario_value(n)), Status::ok(1));
    }
    assert_eq!(dict.get(&k(3)).unwrap(), scenario_value(3));

    assert_eq!(dict.delete(&k(3)), Status::ok(1));
    assert!(matches!(dict.get(&k(3)), Err(Error::ItemNotFound)));

    let fresh = b"new value!".to_vec();
    assert_eq!(dict.insert(&k(3), &fresh), Status::ok(1));
    assert_eq!(dict.get(&k(3)).unwrap(), fresh);
    assert_eq!(dict.len().unwrap(), 10);
}

#[test]
fn test_open_address_capacity_scenario() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());

    for dictionary_type in [DictionaryType::OpenAddressHash, DictionaryType::OpenAddressFileHash] {
        let config = DictionaryConfig::new(dictionary_type, KeyType::NumericSigned, 4, 4)
            .with_dictionary_size(50)
            .with_id(2);
        let mut dict = Dictionary::create(config, &options).unwrap();

        for n in 0..50 {
            assert_eq!(dict.insert(&k(n), &v(n)), Status::ok(1), "key {}", n);
        }
        assert_eq!(dict.insert(&k(50), &v(50)), Status::error(ErrorCode::MaxCapacity));

        assert_eq!(dict.delete(&k(17)), Status::ok(1));
        assert_eq!(dict.insert(&k(50), &v(50)), Status::ok(1));
        assert_eq!(dict.get(&k(50)).unwrap(), v(50));
        for n in (0..50).filter(|n| *n != 17) {
            assert_eq!(dict.get(&k(n)).unwrap(), v(n));
        }
        dict.destroy().unwrap();
    }
}

#[test]
fn test_linear_hash_split_scenario() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path()).records_per_bucket(2);
    let config = DictionaryConfig::new(DictionaryType::LinearHash, KeyType::NumericSigned, 4, 4)
        .with_dictionary_size(4)
        .with_id(4);
    let mut table = LinearHash::create(&config, &options).unwrap();

    for n in [0, 4, 8, 12] {
        assert_eq!(table.insert(&k(n), &v(n * 10)).unwrap(), 1);
    }
    assert_eq!(table.bucket_pointer(), 0);

    table.split().unwrap();
    assert_eq!(table.bucket_pointer(), 1);
    assert_eq!(table.level(), 0);
    for n in [0, 4, 8, 12] {
        assert_eq!(table.get(&k(n)).unwrap(), v(n * 10));
    }
}

#[test]
fn test_ordered_range_scenario() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());

    for dictionary_type in [DictionaryType::BPlusTree, DictionaryType::SkipList] {
        let mut dict = Dictionary::create(config(dictionary_type), &options).unwrap();
        for n in [5, 10, 25, 50, 70] {
            assert!(dict.insert(&k(n), &v(n)).is_ok());
        }

        // Ordered engines return the range already sorted.
        let keys: Vec<i64> = dict
            .find(&Predicate::range(k(15), k(55)))
            .unwrap()
            .map(|r| decode_i64(&r.unwrap().key))
            .collect();
        assert_eq!(keys, vec![25, 50], "{:?}", dictionary_type);
        dict.destroy().unwrap();
    }
}

#[test]
fn test_range_on_every_engine() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());

    for dictionary_type in ALL_TYPES {
        let mut dict = Dictionary::create(config(dictionary_type), &options).unwrap();
        for n in [5, 10, 25, 50, 70, -3] {
            assert!(dict.insert(&k(n), &v(n)).is_ok());
        }
        assert_eq!(sorted_keys(&dict, &Predicate::range(k(15), k(55))), vec![25, 50]);
        assert_eq!(sorted_keys(&dict, &Predicate::range(k(-10), k(5))), vec![-3, 5]);
        assert_eq!(sorted_keys(&dict, &Predicate::equality(k(70))), vec![70]);
        assert_eq!(sorted_keys(&dict, &Predicate::All), vec![-3, 5, 10, 25, 50, 70]);
        dict.destroy().unwrap();
    }
}

#[test]
fn test_round_trip_and_absence_on_every_engine() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());

    for dictionary_type in ALL_TYPES {
        let mut dict = Dictionary::create(config(dictionary_type), &options).unwrap();
        for n in 0..30 {
            assert_eq!(dict.insert(&k(n), &v(n + 1000)), Status::ok(1));
        }

        // Deleting an absent key changes nothing.
        assert_eq!(dict.delete(&k(99)), Status::error(ErrorCode::ItemNotFound));
        for n in 0..30 {
            assert_eq!(dict.get(&k(n)).unwrap(), v(n + 1000), "{:?}", dictionary_type);
        }

        // Update overwrites an existing key and inserts a missing one.
        assert_eq!(dict.update(&k(7), &v(-7)), Status::ok(1));
        assert_eq!(dict.get(&k(7)).unwrap(), v(-7));
        assert_eq!(dict.update(&k(40), &v(40)), Status::ok(1));
        assert_eq!(dict.get(&k(40)).unwrap(), v(40));

        assert_eq!(dict.delete(&k(7)), Status::ok(1));
        assert!(matches!(dict.get(&k(7)), Err(Error::ItemNotFound)));
        assert_eq!(dict.len().unwrap(), 30);

        let mut expected: Vec<i64> = (0..30).filter(|n| *n != 7).collect();
        expected.push(40);
        assert_eq!(sorted_keys(&dict, &Predicate::All), expected);
        dict.destroy().unwrap();
    }
}

#[test]
fn test_close_and_reopen_every_engine() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());

    for dictionary_type in ALL_TYPES {
        let mut dict = Dictionary::create(config(dictionary_type), &options).unwrap();
        for n in 0..40 {
            assert!(dict.insert(&k(n), &v(n * 2)).is_ok());
        }
        assert!(dict.delete(&k(11)).is_ok());
        dict.close().unwrap();

        let dict = Dictionary::open(config(dictionary_type), &options).unwrap();
        assert_eq!(dict.len().unwrap(), 39, "{:?}", dictionary_type);
        for n in (0..40).filter(|n| *n != 11) {
            assert_eq!(dict.get(&k(n)).unwrap(), v(n * 2));
        }
        dict.destroy().unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0, "{:?}", dictionary_type);
    }
}

#[test]
fn test_unique_write_concern() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default()
        .directory(dir.path())
        .write_concern(WriteConcern::InsertUnique);

    for dictionary_type in ALL_TYPES {
        let mut dict = Dictionary::create(config(dictionary_type), &options).unwrap();
        assert_eq!(dict.insert(&k(1), &v(1)), Status::ok(1));
        assert_eq!(dict.insert(&k(1), &v(2)), Status::error(ErrorCode::DuplicateKey));
        assert_eq!(dict.get(&k(1)).unwrap(), v(1));

        dict.set_write_concern(WriteConcern::Update).unwrap();
        assert_eq!(dict.insert(&k(1), &v(3)), Status::ok(1));
        assert_eq!(dict.get(&k(1)).unwrap(), v(3));
        assert_eq!(dict.len().unwrap(), 1);
        dict.destroy().unwrap();
    }
}

#[test]
fn test_duplicate_write_concern() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());

    for dictionary_type in [
        DictionaryType::BPlusTree,
        DictionaryType::SkipList,
        DictionaryType::LinearHash,
        DictionaryType::FlatFile,
    ] {
        let mut dict = Dictionary::create(config(dictionary_type), &options).unwrap();
        dict.set_write_concern(WriteConcern::Duplicate).unwrap();
        for n in 0..3 {
            assert_eq!(dict.insert(&k(9), &v(n)), Status::ok(1));
        }
        assert_eq!(dict.find(&Predicate::equality(k(9))).unwrap().count(), 3);
        assert_eq!(dict.update(&k(9), &v(-1)), Status::ok(3));
        assert_eq!(dict.delete(&k(9)), Status::ok(3));
        assert!(dict.is_empty().unwrap());
        dict.destroy().unwrap();
    }

    let mut dict = Dictionary::create(config(DictionaryType::OpenAddressHash), &options).unwrap();
    assert!(matches!(
        dict.set_write_concern(WriteConcern::Duplicate),
        Err(Error::WriteConcernViolation)
    ));
    dict.destroy().unwrap();
}

#[test]
fn test_cursor_states() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());
    let mut dict = Dictionary::create(config(DictionaryType::SkipList), &options).unwrap();
    for n in [1, 2, 3] {
        assert!(dict.insert(&k(n), &v(n)).is_ok());
    }

    let empty = dict.find(&Predicate::range(k(10), k(20))).unwrap();
    assert_eq!(empty.state(), CursorState::EndOfResults);

    let mut cursor = dict.find(&Predicate::All).unwrap();
    assert_eq!(cursor.state(), CursorState::Initialized);
    assert!(cursor.next().is_some());
    assert_eq!(cursor.state(), CursorState::Active);
    assert!(cursor.next().is_some());
    assert!(cursor.next().is_some());
    assert!(cursor.next().is_none());
    assert_eq!(cursor.state(), CursorState::EndOfResults);
    assert!(cursor.next().is_none());
    assert_eq!(cursor.state(), CursorState::EndOfResults);
    cursor.destroy();
}

#[test]
fn test_invalid_predicates_rejected() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());
    let dict = Dictionary::create(config(DictionaryType::BPlusTree), &options).unwrap();

    assert!(matches!(
        dict.find(&Predicate::range(k(9), k(1))),
        Err(Error::InvalidPredicate(_))
    ));
    assert!(dict.find(&Predicate::equality(vec![0u8; 2])).is_err());
}

#[test]
fn test_linear_hash_auto_split_through_facade() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default()
        .directory(dir.path())
        .linear_hash_split_threshold(75);
    let mut dict = Dictionary::create(config(DictionaryType::LinearHash), &options).unwrap();

    for n in 0..200 {
        assert_eq!(dict.insert(&k(n), &v(n)), Status::ok(1));
    }
    for n in 0..200 {
        assert_eq!(dict.get(&k(n)).unwrap(), v(n));
    }
    assert_eq!(sorted_keys(&dict, &Predicate::All), (0..200).collect::<Vec<_>>());
}

#[test]
fn test_recreate_linear_hash_discards_old_overflow() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().directory(dir.path());
    let config = DictionaryConfig::new(DictionaryType::LinearHash, KeyType::NumericSigned, 4, 4)
        .with_dictionary_size(2)
        .with_id(3);

    // Even keys all land in bucket 0 and spill into its overflow chain.
    let mut dict = Dictionary::create(config.clone(), &options).unwrap();
    for n in [0, 2, 4, 6, 8] {
        assert!(dict.insert(&k(n), &v(n)).is_ok());
    }
    dict.close().unwrap();

    let mut dict = Dictionary::create(config.clone(), &options).unwrap();
    assert_eq!(dict.len().unwrap(), 0);
    assert!(dict.insert(&k(1), &v(1)).is_ok());
    dict.close().unwrap();

    let dict = Dictionary::open(config, &options).unwrap();
    assert_eq!(dict.len().unwrap(), 1);
    assert_eq!(sorted_keys(&dict, &Predicate::All), vec![1]);
    assert!(matches!(dict.get(&k(4)), Err(Error::ItemNotFound)));
    dict.destroy().unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
