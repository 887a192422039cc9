//! Property-based test generators using proptest.

use diskstore_codec::Value;
use proptest::prelude::*;

/// Strategy for keys of any storage class.
///
/// Reals are finite; `NaN` never equals itself and cannot be looked up.
pub fn key_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Blob),
        text_strategy().prop_map(Value::Text),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e12..1.0e12_f64).prop_map(Value::Real),
    ]
}

/// Strategy for text, including multi-byte characters.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 äöüß€🦀日本]{0,24}").expect("Invalid regex")
}

/// Strategy for arbitrary binary content.
pub fn blob_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for scalar values of any storage class.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        blob_strategy().prop_map(Value::Blob),
        text_strategy().prop_map(Value::Text),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>()
            .prop_filter("finite", |r| r.is_finite())
            .prop_map(Value::Real),
    ]
}

/// Strategy for distinct text keys, in generation order.
pub fn distinct_keys_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,8}", 1..max.max(2)).prop_flat_map(|set| {
        let keys: Vec<String> = set.into_iter().collect();
        Just(keys).prop_shuffle()
    })
}
