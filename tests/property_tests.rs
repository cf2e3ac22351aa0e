// Property tests: every engine behaves like an ordered map under random workloads

use iondict::key::{decode_i64, encode_i64, encode_u64};
use iondict::{
    Dictionary, DictionaryConfig, DictionaryEngine, DictionaryType, KeyType, LinearHash, Options,
    Predicate, WriteConcern,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Insert(i64, i64),
    Delete(i64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (-60i64..60, any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v as i64)),
        1 => (-60i64..60).prop_map(Op::Delete),
    ]
}

fn arb_type() -> impl Strategy<Value = DictionaryType> {
    prop_oneof![
        Just(DictionaryType::BPlusTree),
        Just(DictionaryType::FlatFile),
        Just(DictionaryType::OpenAddressFileHash),
        Just(DictionaryType::OpenAddressHash),
        Just(DictionaryType::SkipList),
        Just(DictionaryType::LinearHash),
    ]
}

fn k(v: i64) -> Vec<u8> {
    encode_i64(v, 4)
}

fn create(dir: &TempDir, dictionary_type: DictionaryType) -> Dictionary {
    let size = match dictionary_type {
        DictionaryType::LinearHash => 4,
        _ => 128,
    };
    let config = DictionaryConfig::new(dictionary_type, KeyType::NumericSigned, 4, 4)
        .with_dictionary_size(size)
        .with_id(1);
    let options = Options::default()
        .directory(dir.path())
        .write_concern(WriteConcern::Update)
        .bplus_tree_order(4);
    Dictionary::create(config, &options).unwrap()
}

fn apply(dict: &mut Dictionary, model: &mut BTreeMap<i64, i64>, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Insert(key, value) => {
                assert!(dict.insert(&k(*key), &encode_i64(*value, 4)).is_ok());
                model.insert(*key, *value);
            }
            Op::Delete(key) => {
                let status = dict.delete(&k(*key));
                assert_eq!(status.is_ok(), model.remove(key).is_some());
            }
        }
    }
}

fn keys(dict: &Dictionary, predicate: &Predicate) -> Vec<i64> {
    let mut keys: Vec<i64> = dict
        .find(predicate)
        .unwrap()
        .map(|r| decode_i64(&r.unwrap().key))
        .collect();
    keys.sort();
    keys
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_engine_matches_model(
        dictionary_type in arb_type(),
        ops in prop::collection::vec(arb_op(), 1..120),
    ) {
        let dir = TempDir::new().unwrap();
        let mut dict = create(&dir, dictionary_type);
        let mut model = BTreeMap::new();
        apply(&mut dict, &mut model, &ops);

        prop_assert_eq!(dict.len().unwrap(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(dict.get(&k(*key)).unwrap(), encode_i64(*value, 4));
        }
        prop_assert_eq!(keys(&dict, &Predicate::All), model.keys().copied().collect::<Vec<_>>());
    }

    #[test]
    fn prop_range_is_exact(
        dictionary_type in arb_type(),
        ops in prop::collection::vec(arb_op(), 1..80),
        a in -70i64..70,
        b in -70i64..70,
    ) {
        let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
        let dir = TempDir::new().unwrap();
        let mut dict = create(&dir, dictionary_type);
        let mut model = BTreeMap::new();
        apply(&mut dict, &mut model, &ops);

        let expected: Vec<i64> = model.range(lower..=upper).map(|(key, _)| *key).collect();
        prop_assert_eq!(keys(&dict, &Predicate::range(k(lower), k(upper))), expected);
    }

    #[test]
    fn prop_ordered_engines_return_sorted_ranges(
        ordered in prop_oneof![Just(DictionaryType::BPlusTree), Just(DictionaryType::SkipList)],
        inserts in prop::collection::vec(-60i64..60, 1..100),
    ) {
        let dir = TempDir::new().unwrap();
        let mut dict = create(&dir, ordered);
        for key in &inserts {
            prop_assert!(dict.insert(&k(*key), &k(*key)).is_ok());
        }
        let returned: Vec<i64> = dict
            .find(&Predicate::All)
            .unwrap()
            .map(|r| decode_i64(&r.unwrap().key))
            .collect();
        let mut sorted = returned.clone();
        sorted.sort();
        prop_assert_eq!(returned, sorted);
    }

    #[test]
    fn prop_linear_hash_split_preserves_records(
        inserts in prop::collection::vec((0u64..1000, any::<u32>()), 1..60),
        splits in 1usize..12,
    ) {
        let dir = TempDir::new().unwrap();
        let config =
            DictionaryConfig::new(DictionaryType::LinearHash, KeyType::NumericUnsigned, 4, 4)
                .with_dictionary_size(2)
                .with_id(9);
        let options = Options::default().directory(dir.path()).write_concern(WriteConcern::Update);
        let mut table = LinearHash::create(&config, &options).unwrap();

        let mut model = BTreeMap::new();
        for (key, value) in &inserts {
            table.insert(&encode_u64(*key, 4), &value.to_le_bytes()).unwrap();
            model.insert(*key, *value);
        }

        for _ in 0..splits {
            let (level, pointer) = (table.level(), table.bucket_pointer());
            let round = 2usize << level;
            table.split().unwrap();
            if pointer + 1 == round {
                prop_assert_eq!((table.level(), table.bucket_pointer()), (level + 1, 0));
            } else {
                prop_assert_eq!((table.level(), table.bucket_pointer()), (level, pointer + 1));
            }
            for (key, value) in &model {
                let found = table.get(&encode_u64(*key, 4)).unwrap();
                prop_assert_eq!(found, value.to_le_bytes().to_vec());
            }
        }
        prop_assert_eq!(table.record_count().unwrap(), model.len());
    }
}
