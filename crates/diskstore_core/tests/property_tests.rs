//! Property tests for the mapping laws.

use diskstore_core::{Scalar, StoreResult, Value};
use diskstore_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_set_then_get(key in key_strategy(), value in value_strategy()) {
        let store = temp_store::<Scalar>();
        store.set(&key, &Scalar(value.clone())).unwrap();
        prop_assert!(store.contains(&key).unwrap());
        prop_assert_eq!(store.get(&key).unwrap().into_inner(), value);
    }

    #[test]
    fn prop_set_twice_is_set_once(key in key_strategy(), value in value_strategy()) {
        let once = temp_store::<Scalar>();
        once.set(&key, &Scalar(value.clone())).unwrap();

        let twice = temp_store::<Scalar>();
        twice.set(&key, &Scalar(value.clone())).unwrap();
        twice.set(&key, &Scalar(value)).unwrap();

        let items = |store: &TestStore<Scalar>| {
            store.items().iter().collect::<StoreResult<Vec<_>>>().unwrap()
        };
        prop_assert_eq!(items(&once), items(&twice));
    }

    #[test]
    fn prop_note_roundtrip(title in text_strategy(), body in blob_strategy()) {
        let store = temp_store::<Note>();
        let note = Note { title, body };
        store.set("n", &note).unwrap();
        prop_assert_eq!(store.get("n").unwrap(), note);
    }

    #[test]
    fn prop_add_keeps_first_value(key in key_strategy(), first in any::<i64>(), second in any::<i64>()) {
        let store = temp_store::<(i64,)>();
        prop_assert_eq!(store.add(Some(&key), &(first,)).unwrap(), Some(key.clone()));
        prop_assert_eq!(store.add(Some(&key), &(second,)).unwrap(), None);
        prop_assert_eq!(store.get(&key).unwrap(), (first,));
    }

    #[test]
    fn prop_iteration_matches_insertion(keys in distinct_keys_strategy(40), fetch in 1usize..8) {
        let store = temp_store_with_config::<Scalar>(
            diskstore_core::StoreConfig::new().fetch_size(fetch),
        );
        for (i, key) in keys.iter().enumerate() {
            store.set(key.as_str(), &Scalar::new(i as i64)).unwrap();
        }

        let expected: Vec<Value> = keys.iter().map(|k| Value::from(k.as_str())).collect();
        let forward = store.iter().collect::<StoreResult<Vec<_>>>().unwrap();
        let mut backward = store.iter_rev().collect::<StoreResult<Vec<_>>>().unwrap();
        backward.reverse();

        prop_assert_eq!(&forward, &expected);
        prop_assert_eq!(&backward, &expected);
    }

    #[test]
    fn prop_delete_removes(keys in distinct_keys_strategy(10)) {
        let store = temp_store::<Scalar>();
        for key in &keys {
            store.set(key.as_str(), &Scalar::new(key.as_str())).unwrap();
        }
        for key in &keys {
            store.delete(key.as_str()).unwrap();
            prop_assert!(store.delete(key.as_str()).unwrap_err().is_key_error());
        }
        prop_assert!(store.is_empty().unwrap());
    }
}
