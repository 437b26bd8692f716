//! Integration tests for record operations over the in-memory engine.

use kvbridge_core::{Config, EngineError, Key, Storage, StorageError};
use kvbridge_engine::{InMemoryEngine, OpKind};
use kvbridge_testkit::{init_tracing, TestStorage, BASE_EPOCH_MS};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn set_then_get_returns_value() {
    init_tracing();
    let test = TestStorage::open().await;

    test.set_item("greeting", b"hello".to_vec()).await.unwrap();
    assert_eq!(
        test.get_item("greeting").await.unwrap(),
        Some(b"hello".to_vec())
    );
}

#[tokio::test]
async fn second_write_replaces_first() {
    let test = TestStorage::open().await;

    test.set_item("k", b"one".to_vec()).await.unwrap();
    test.advance_secs(5);
    test.set_item("k", b"two".to_vec()).await.unwrap();

    assert_eq!(test.get_item("k").await.unwrap(), Some(b"two".to_vec()));
    assert_eq!(test.count().await.unwrap(), 1);

    let record = test
        .engine
        .record("kvbridge", "default", &Key::from("k"))
        .unwrap();
    assert_eq!(record.created, BASE_EPOCH_MS + 5_000);
}

#[tokio::test]
async fn miss_is_none() {
    let test = TestStorage::open().await;
    assert_eq!(test.get_item("absent").await.unwrap(), None);
}

#[tokio::test]
async fn removing_missing_key_succeeds() {
    let test = TestStorage::open().await;
    test.remove_item("absent").await.unwrap();

    test.set_item("present", vec![1]).await.unwrap();
    test.remove_item("present").await.unwrap();
    assert_eq!(test.get_item("present").await.unwrap(), None);
}

#[tokio::test]
async fn clear_removes_every_key() {
    let test = TestStorage::open().await;
    for i in 0..10i64 {
        test.set_item(i, vec![i as u8]).await.unwrap();
    }
    assert_eq!(test.engine.record_count("kvbridge", "default"), 10);
    test.clear().await.unwrap();
    assert_eq!(test.engine.record_count("kvbridge", "default"), 0);

    for i in 0..10i64 {
        assert_eq!(test.get_item(i).await.unwrap(), None);
    }
    assert_eq!(test.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_operations_on_different_keys_do_not_interfere() {
    let test = Arc::new(TestStorage::open().await);

    let mut handles = Vec::new();
    for task in 0..8u8 {
        let test = Arc::clone(&test);
        handles.push(tokio::spawn(async move {
            for round in 0..10u8 {
                let key = format!("task-{task}");
                test.set_item(key.clone(), vec![task, round]).await.unwrap();
                assert_eq!(
                    test.get_item(key).await.unwrap(),
                    Some(vec![task, round])
                );
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(test.count().await.unwrap(), 8);
    for task in 0..8u8 {
        assert_eq!(
            test.get_item(format!("task-{task}")).await.unwrap(),
            Some(vec![task, 9])
        );
    }
}

#[tokio::test]
async fn failed_open_is_a_connection_error() {
    let engine = Arc::new(InMemoryEngine::new());
    engine.fail_next(OpKind::Open, EngineError::denied("storage disabled"));

    let err = Storage::open(engine.clone(), Config::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Connection { .. }));
    assert_eq!(engine.version_of("kvbridge"), None);
}

#[tokio::test]
async fn failed_add_is_a_write_error_and_keeps_old_value() {
    let test = TestStorage::open().await;
    test.set_item("k", b"old".to_vec()).await.unwrap();

    test.engine.fail_next(OpKind::Add, EngineError::QuotaExceeded);
    let err = test.set_item("k", b"new".to_vec()).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Write {
            operation: "set_item",
            source: EngineError::QuotaExceeded,
            ..
        }
    ));
    assert_eq!(test.get_item("k").await.unwrap(), Some(b"old".to_vec()));
}

#[tokio::test]
async fn refused_transaction_is_a_write_error() {
    let test = TestStorage::open().await;
    test.engine
        .fail_next(OpKind::Transaction, EngineError::denied("busy"));

    let err = test.clear().await.unwrap_err();
    assert!(matches!(err, StorageError::Write { operation: "clear", .. }));
}

#[tokio::test]
async fn failed_get_is_a_read_error() {
    let test = TestStorage::open().await;
    test.engine.fail_next(OpKind::Get, EngineError::Closed);

    let err = test.get_item("k").await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Read {
            source: EngineError::Closed,
            ..
        }
    ));
}

#[tokio::test]
async fn failed_remove_is_swallowed_by_default() {
    let test = TestStorage::open().await;
    test.set_item("k", vec![1]).await.unwrap();

    test.engine.fail_next(OpKind::Delete, EngineError::QuotaExceeded);
    test.remove_item("k").await.unwrap();
    assert_eq!(test.get_item("k").await.unwrap(), Some(vec![1]));
}

#[tokio::test]
async fn failed_remove_propagates_when_configured() {
    let test = TestStorage::with_config(Config::new().propagate_remove_errors(true)).await;

    test.engine.fail_next(OpKind::Delete, EngineError::QuotaExceeded);
    let err = test.remove_item("k").await.unwrap_err();
    assert!(matches!(err, StorageError::Write { .. }));
}

#[tokio::test]
async fn reopen_at_higher_version_adds_missing_stores() {
    let mut test = TestStorage::with_config(Config::new().stores(["a"])).await;
    test.partition("a").set_item("k", vec![1]).await.unwrap();

    test.reopen(["a", "b"], 2).await.unwrap();

    assert_eq!(test.version(), 2);
    assert_eq!(test.store_names(), vec!["a", "b"]);
    let report = test.last_upgrade().unwrap();
    assert_eq!((report.old_version, report.new_version), (1, 2));
    assert_eq!(report.created_stores().collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(
        test.partition("a").get_item("k").await.unwrap(),
        Some(vec![1])
    );
}

#[tokio::test]
async fn reopen_keeps_default_store() {
    let mut test =
        TestStorage::with_config(Config::new().stores(["a", "b"]).default_store("b")).await;
    test.set_item("k", vec![1]).await.unwrap();

    test.reopen(["b", "c"], 2).await.unwrap();
    assert_eq!(test.config().default_store, "b");
    assert_eq!(test.get_item("k").await.unwrap(), Some(vec![1]));
}

#[tokio::test]
async fn reopen_without_default_store_is_rejected() {
    let mut test =
        TestStorage::with_config(Config::new().stores(["a", "b"]).default_store("b")).await;
    test.set_item("k", vec![1]).await.unwrap();

    let err = test.reopen(["a"], 2).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidConfig { .. }));

    // The handle is left as it was.
    assert_eq!(test.config().default_store, "b");
    assert_eq!(test.version(), 1);
    assert_eq!(test.engine.version_of("kvbridge"), Some(1));
    assert_eq!(test.get_item("k").await.unwrap(), Some(vec![1]));
}

#[tokio::test]
async fn reopen_at_same_version_runs_no_upgrade() {
    let mut test = TestStorage::open().await;
    test.reopen(["default"], 1).await.unwrap();
    assert!(test.last_upgrade().is_none());
    assert_eq!(test.version(), 1);
}

#[tokio::test]
async fn opening_at_lower_version_uses_current_version() {
    let engine = Arc::new(InMemoryEngine::new());
    let newer = TestStorage::with_engine(engine.clone(), Config::new().version(3)).await;
    newer.set_item("k", vec![3]).await.unwrap();

    let older = TestStorage::with_engine(engine, Config::new().version(1)).await;
    assert_eq!(older.version(), 3);
    assert!(older.last_upgrade().is_none());
    assert_eq!(older.get_item("k").await.unwrap(), Some(vec![3]));
}

#[tokio::test]
async fn concurrent_opens_at_different_versions_both_succeed() {
    let engine = Arc::new(InMemoryEngine::new());
    let (first, second) = tokio::join!(
        Storage::open(engine.clone(), Config::new().stores(["a"]).version(1)),
        Storage::open(engine.clone(), Config::new().stores(["a", "b"]).version(2)),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(engine.version_of("kvbridge"), Some(2));
    assert_eq!(engine.store_names("kvbridge"), vec!["a", "b"]);
    assert_eq!(second.version(), 2);
    assert!(first.has_store("a"));
    assert!(second.has_store("a") && second.has_store("b"));

    first.set_item("k", vec![1]).await.unwrap();
    assert_eq!(second.get_item("k").await.unwrap(), Some(vec![1]));
}

#[tokio::test]
async fn independent_handles_share_data() {
    let engine = Arc::new(InMemoryEngine::new());
    let first = TestStorage::with_engine(engine.clone(), Config::default()).await;
    let second = TestStorage::with_engine(engine, Config::default()).await;

    first.set_item("shared", vec![7]).await.unwrap();
    assert_eq!(second.get_item("shared").await.unwrap(), Some(vec![7]));
}

#[tokio::test]
async fn closed_storage_fails_operations() {
    let test = TestStorage::open().await;
    test.close();

    let err = test.get_item("k").await.unwrap_err();
    assert_eq!(err.engine_error(), Some(&EngineError::Closed));
    // Removal stays silent.
    test.remove_item("k").await.unwrap();
}

#[tokio::test]
async fn callers_can_bound_operations_with_a_timeout() {
    let test = TestStorage::open().await;
    let result = tokio::time::timeout(Duration::from_secs(5), test.set_item("k", vec![1])).await;
    assert!(matches!(result, Ok(Ok(()))));
}

#[tokio::test]
async fn integer_and_text_keys_are_distinct() {
    let test = TestStorage::open().await;
    test.set_item(1i64, b"int".to_vec()).await.unwrap();
    test.set_item("1", b"text".to_vec()).await.unwrap();

    assert_eq!(test.get_item(1i64).await.unwrap(), Some(b"int".to_vec()));
    assert_eq!(test.get_item("1").await.unwrap(), Some(b"text".to_vec()));
}
