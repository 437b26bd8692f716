//! Property-based test generators using proptest.

use kvbridge_engine::Key;
use proptest::prelude::*;

/// Strategy for generating scalar keys (integers, text and binary).
pub fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        any::<i64>().prop_map(Key::Int),
        text_key_strategy().prop_map(Key::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Key::Bytes),
    ]
}

/// Strategy for generating text keys.
pub fn text_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_:.-]{1,24}").expect("Invalid regex")
}

/// Strategy for generating values (arbitrary bytes).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for generating valid store names.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating a sequence of writes over a small key space,
/// so that replacements are common.
pub fn writes_strategy(max_len: usize) -> impl Strategy<Value = Vec<(Key, Vec<u8>)>> {
    prop::collection::vec(
        ((0i64..8).prop_map(Key::Int), value_strategy()),
        1..=max_len.max(1),
    )
}

/// Strategy for generating record ages in seconds.
pub fn age_secs_strategy() -> impl Strategy<Value = u64> {
    0u64..10_000
}
