//! Storage handle.
//!
//! [`Storage`] owns one open connection to a host database. Opening runs the
//! schema initializer inside the host's upgrade transaction when the stored
//! version is lower than the configured one.

use crate::bridge::PendingOperation;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{StorageError, StorageResult};
use crate::partition::Partition;
use crate::schema::{SchemaInitializer, UpgradeReport};
use kvbridge_engine::{EngineError, EngineResult, HostDatabase, HostEngine, Key};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// An open database with typed record operations.
///
/// The handle is `Send + Sync`; share it behind an [`Arc`] to issue
/// operations from several tasks. Overlapping operations are ordered by the
/// host.
pub struct Storage {
    engine: Arc<dyn HostEngine>,
    config: Config,
    clock: Arc<dyn Clock>,
    database: Arc<dyn HostDatabase>,
    last_upgrade: Option<UpgradeReport>,
}

impl Storage {
    /// Opens the database described by `config` using the system clock.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is invalid and
    /// `Connection` if the host fails or denies the open.
    pub async fn open(engine: Arc<dyn HostEngine>, config: Config) -> StorageResult<Self> {
        Self::open_with_clock(engine, config, Arc::new(SystemClock)).await
    }

    /// Opens the database with an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`Storage::open`].
    pub async fn open_with_clock(
        engine: Arc<dyn HostEngine>,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> StorageResult<Self> {
        check_config(&config)?;

        let (database, last_upgrade) = connect(engine.as_ref(), &config).await?;
        info!(
            database = %config.database_name,
            version = database.version(),
            stores = ?database.store_names(),
            upgraded = last_upgrade.is_some(),
            "storage opened"
        );

        Ok(Self {
            engine,
            config,
            clock,
            database,
            last_upgrade,
        })
    }

    /// Re-acquires the connection with a new store list and version.
    ///
    /// A higher version creates the missing stores; existing stores are
    /// never dropped or renamed. The default store stays the same and must
    /// be listed in `stores`. The current connection is closed first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` (leaving the handle untouched) if the new
    /// store list omits the default store, and `Connection` if the host
    /// fails the open. After a `Connection` error the handle keeps its
    /// previous configuration but its old connection is closed.
    pub async fn reopen<I, S>(&mut self, stores: I, version: u32) -> StorageResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = self.config.clone().version(version);
        config.stores = stores.into_iter().map(Into::into).collect();
        check_config(&config)?;

        self.database.close();
        let (database, last_upgrade) = connect(self.engine.as_ref(), &config).await?;
        info!(
            database = %config.database_name,
            version = database.version(),
            stores = ?database.store_names(),
            upgraded = last_upgrade.is_some(),
            "storage reopened"
        );
        self.database = database;
        self.last_upgrade = last_upgrade;
        self.config = config;
        Ok(())
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.database.name()
    }

    /// Version the connection was opened at.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.database.version()
    }

    /// Names of the stores in the database.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.database.store_names()
    }

    /// Whether the database has a store named `name`.
    #[must_use]
    pub fn has_store(&self, name: &str) -> bool {
        self.store_names().iter().any(|s| s == name)
    }

    /// The report of the upgrade run by the last open, if one ran.
    #[must_use]
    pub fn last_upgrade(&self) -> Option<&UpgradeReport> {
        self.last_upgrade.as_ref()
    }

    /// The configuration this handle was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a view of the store `name`.
    ///
    /// The store is not checked here; operations on an unknown store fail
    /// with the host's `NotFound`.
    #[must_use]
    pub fn partition(&self, name: impl Into<String>) -> Partition<'_> {
        Partition::new(self, name.into())
    }

    fn default_partition(&self) -> Partition<'_> {
        self.partition(self.config.default_store.clone())
    }

    /// Closes the connection. Later operations fail.
    pub fn close(&self) {
        debug!(database = %self.config.database_name, "storage closed");
        self.database.close();
    }

    pub(crate) fn database(&self) -> &dyn HostDatabase {
        self.database.as_ref()
    }

    pub(crate) fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Stores `value` under `key` in the default store.
    ///
    /// # Errors
    ///
    /// See [`Partition::set_item`].
    pub async fn set_item(
        &self,
        key: impl Into<Key>,
        value: impl Into<Vec<u8>>,
    ) -> StorageResult<()> {
        self.default_partition().set_item(key, value).await
    }

    /// Reads the value under `key` in the default store.
    ///
    /// # Errors
    ///
    /// See [`Partition::get_item`].
    pub async fn get_item(&self, key: impl Into<Key>) -> StorageResult<Option<Vec<u8>>> {
        self.default_partition().get_item(key).await
    }

    /// Removes `key` from the default store.
    ///
    /// # Errors
    ///
    /// See [`Partition::remove_item`].
    pub async fn remove_item(&self, key: impl Into<Key>) -> StorageResult<()> {
        self.default_partition().remove_item(key).await
    }

    /// Removes every record from the default store.
    ///
    /// # Errors
    ///
    /// See [`Partition::clear`].
    pub async fn clear(&self) -> StorageResult<()> {
        self.default_partition().clear().await
    }

    /// Whether `key` exists in the default store.
    ///
    /// # Errors
    ///
    /// See [`Partition::contains_key`].
    pub async fn contains_key(&self, key: impl Into<Key>) -> StorageResult<bool> {
        self.default_partition().contains_key(key).await
    }

    /// Number of records in the default store.
    ///
    /// # Errors
    ///
    /// See [`Partition::count`].
    pub async fn count(&self) -> StorageResult<u64> {
        self.default_partition().count().await
    }

    /// Stores a CBOR-encoded value in the default store.
    ///
    /// # Errors
    ///
    /// See [`Partition::set_value`].
    pub async fn set_value<T: Serialize>(
        &self,
        key: impl Into<Key>,
        value: &T,
    ) -> StorageResult<()> {
        self.default_partition().set_value(key, value).await
    }

    /// Reads a CBOR-encoded value from the default store.
    ///
    /// # Errors
    ///
    /// See [`Partition::get_value`].
    pub async fn get_value<T: DeserializeOwned>(
        &self,
        key: impl Into<Key>,
    ) -> StorageResult<Option<T>> {
        self.default_partition().get_value(key).await
    }

    /// Deletes records in the default store older than `max_age_secs`.
    ///
    /// # Errors
    ///
    /// See [`Partition::purge`].
    pub async fn purge(&self, max_age_secs: Option<u64>) -> StorageResult<u64> {
        self.default_partition().purge(max_age_secs).await
    }

    /// Purges the default store using [`Config::default_max_age`].
    ///
    /// # Errors
    ///
    /// See [`Partition::purge`].
    pub async fn purge_expired(&self) -> StorageResult<u64> {
        self.default_partition().purge_expired().await
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("database", &self.config.database_name)
            .field("version", &self.database.version())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Rejects version 0 as a connection error, then validates the rest.
fn check_config(config: &Config) -> StorageResult<()> {
    if config.version == 0 {
        return Err(StorageError::connection(
            &config.database_name,
            EngineError::invalid_request("version must be positive"),
        ));
    }
    config.validate()
}

/// Opens the configured database, falling back to the stored version when
/// the configured one is lower.
async fn connect(
    engine: &dyn HostEngine,
    config: &Config,
) -> StorageResult<(Arc<dyn HostDatabase>, Option<UpgradeReport>)> {
    let initializer = SchemaInitializer::new(config.stores.clone(), config.track_accessed_index);
    let name = config.database_name.as_str();

    let opened = match request_open(engine, name, Some(config.version), initializer.clone()).await {
        Err(EngineError::Version { requested, current }) => {
            debug!(
                database = name,
                requested,
                current,
                "stored version is newer, opening at current version"
            );
            request_open(engine, name, None, initializer).await
        }
        other => other,
    };
    opened.map_err(|e| StorageError::connection(name, e))
}

async fn request_open(
    engine: &dyn HostEngine,
    name: &str,
    version: Option<u32>,
    initializer: SchemaInitializer,
) -> EngineResult<(Arc<dyn HostDatabase>, Option<UpgradeReport>)> {
    let slot = Arc::new(Mutex::new(None));
    let op = PendingOperation::new("open");
    engine.open(
        name,
        version,
        initializer.into_upgrade_callback(Arc::clone(&slot)),
        op.callbacks(),
    );
    let database = op.wait().await?;
    let report = slot.lock().take();
    if let Some(report) = &report {
        info!(
            database = name,
            from = report.old_version,
            to = report.new_version,
            operations = ?report.operations,
            "schema upgraded"
        );
    }
    Ok((database, report))
}
