//! Property tests for record operations.

use kvbridge_core::{Config, Key};
use kvbridge_testkit::{
    age_secs_strategy, key_strategy, store_name_strategy, value_strategy, writes_strategy,
    TestStorage,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::BTreeMap;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn get_returns_last_written_value(key in key_strategy(), value in value_strategy()) {
        runtime().block_on(async {
            let test = TestStorage::open().await;
            test.set_item(key.clone(), value.clone()).await.unwrap();
            prop_assert_eq!(test.get_item(key).await.unwrap(), Some(value));
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn writes_leave_one_record_per_key(writes in writes_strategy(24)) {
        runtime().block_on(async {
            let test = TestStorage::open().await;
            let mut expected: BTreeMap<Key, Vec<u8>> = BTreeMap::new();
            for (key, value) in writes {
                test.set_item(key.clone(), value.clone()).await.unwrap();
                expected.insert(key, value);
            }

            prop_assert_eq!(test.count().await.unwrap(), expected.len() as u64);
            for (key, value) in expected {
                prop_assert_eq!(test.get_item(key).await.unwrap(), Some(value));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn each_configured_store_is_its_own_partition(
        names in prop::collection::btree_set(store_name_strategy(), 1..5),
    ) {
        runtime().block_on(async {
            let test = TestStorage::with_config(Config::new().stores(names.clone())).await;
            for name in &names {
                test.partition(name).set_item("k", name.clone().into_bytes()).await.unwrap();
            }

            let expected: Vec<String> = names.iter().cloned().collect();
            prop_assert_eq!(test.engine.store_names("kvbridge"), expected);
            for name in &names {
                let partition = test.partition(name);
                prop_assert_eq!(partition.count().await.unwrap(), 1);
                prop_assert_eq!(
                    partition.get_item("k").await.unwrap(),
                    Some(name.clone().into_bytes())
                );
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn purge_deletes_exactly_expired_records(
        ages in prop::collection::vec(age_secs_strategy(), 1..16),
        max_age in 1u64..10_000,
    ) {
        runtime().block_on(async {
            let test = TestStorage::open().await;
            let now = 10_000u64;
            // Record i is written `ages[i]` seconds before `now`.
            for (i, age) in ages.iter().enumerate() {
                test.set_secs(now - age);
                test.set_item(i as i64, vec![1]).await.unwrap();
            }

            test.set_secs(now);
            let deleted = test.purge(Some(max_age)).await.unwrap();

            let expired = ages.iter().filter(|age| **age >= max_age).count() as u64;
            prop_assert_eq!(deleted, expired);
            for (i, age) in ages.iter().enumerate() {
                let present = test.contains_key(i as i64).await.unwrap();
                prop_assert_eq!(present, *age < max_age);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
