//! Test fixtures and storage helpers.
//!
//! Provides an opened [`Storage`] over a fresh [`InMemoryEngine`] with a
//! [`ManualClock`], so tests control record timestamps.

use kvbridge_core::{Config, ManualClock, Storage};
use kvbridge_engine::InMemoryEngine;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Wall-clock time the fixture clock starts at (2023-11-14T22:13:20Z).
pub const BASE_EPOCH_MS: u64 = 1_700_000_000_000;

/// A storage opened over an in-memory engine and a manual clock.
pub struct TestStorage {
    /// The storage handle.
    pub storage: Storage,
    /// The host engine behind it, for inspection and fault injection.
    pub engine: Arc<InMemoryEngine>,
    /// The clock stamping new records.
    pub clock: Arc<ManualClock>,
}

impl TestStorage {
    /// Opens a storage with the default configuration.
    pub async fn open() -> Self {
        Self::with_config(Config::default()).await
    }

    /// Opens a storage with `config` over a new engine.
    pub async fn with_config(config: Config) -> Self {
        Self::with_engine(Arc::new(InMemoryEngine::new()), config).await
    }

    /// Opens a storage with `config` over an existing engine.
    pub async fn with_engine(engine: Arc<InMemoryEngine>, config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(BASE_EPOCH_MS));
        let storage = Storage::open_with_clock(engine.clone(), config, clock.clone())
            .await
            .expect("Failed to open test storage");
        Self {
            storage,
            engine,
            clock,
        }
    }

    /// Moves the clock forward by `secs` seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.clock.advance(secs * 1000);
    }

    /// Sets the clock to `secs` seconds after [`BASE_EPOCH_MS`].
    pub fn set_secs(&self, secs: u64) {
        self.clock.set(BASE_EPOCH_MS + secs * 1000);
    }
}

impl std::ops::Deref for TestStorage {
    type Target = Storage;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

impl std::ops::DerefMut for TestStorage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.storage
    }
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Opens a storage whose default store holds `count` records keyed
    /// `key-0`, `key-1`, ... written one second apart.
    pub async fn populated_storage(count: usize) -> TestStorage {
        let test = TestStorage::open().await;
        for i in 0..count {
            test.storage
                .set_item(format!("key-{i}"), format!("value-{i}").into_bytes())
                .await
                .expect("Failed to set item");
            test.advance_secs(1);
        }
        test
    }
}
