//! Record operations on one store.

use crate::bridge::PendingOperation;
use crate::error::{StorageError, StorageResult};
use crate::storage::Storage;
use kvbridge_engine::{
    Callbacks, EngineError, EngineResult, HostTransaction, Key, Record, TransactionMode,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A view of one store of a [`Storage`].
///
/// Each operation runs in its own host transaction scoped to this store.
#[derive(Debug, Clone)]
pub struct Partition<'a> {
    storage: &'a Storage,
    store: String,
}

impl<'a> Partition<'a> {
    pub(crate) fn new(storage: &'a Storage, store: String) -> Self {
        Self { storage, store }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.store
    }

    pub(crate) fn storage(&self) -> &'a Storage {
        self.storage
    }

    pub(crate) fn transaction(
        &self,
        mode: TransactionMode,
    ) -> EngineResult<Arc<dyn HostTransaction>> {
        self.storage.database().transaction(&[self.store.as_str()], mode)
    }

    pub(crate) fn write_error(&self, operation: &'static str, source: EngineError) -> StorageError {
        StorageError::write(&self.store, operation, source)
    }

    fn read_error(&self, source: EngineError) -> StorageError {
        StorageError::read(&self.store, source)
    }

    /// Stores `value` under `key`, replacing any previous record.
    ///
    /// The delete of the old record and the insert of the new one run in a
    /// single read/write transaction. The record's `created` time is taken
    /// from the storage clock.
    ///
    /// # Errors
    ///
    /// Returns `Write` if the host fails the transaction.
    pub async fn set_item(
        &self,
        key: impl Into<Key>,
        value: impl Into<Vec<u8>>,
    ) -> StorageResult<()> {
        let key = key.into();
        let record = Record::new(key.clone(), value.into(), self.storage.now_millis());
        debug!(store = %self.store, %key, created = record.created, "set_item");

        let op = PendingOperation::new("set_item");
        {
            let txn = self
                .transaction(TransactionMode::ReadWrite)
                .map_err(|e| self.write_error("set_item", e))?;
            txn.delete(&self.store, &key, logged_delete(&self.store, &key));
            txn.add(&self.store, record, op.callbacks());
        }
        op.wait().await.map_err(|e| self.write_error("set_item", e))
    }

    /// Reads the value stored under `key`; `None` on a miss.
    ///
    /// # Errors
    ///
    /// Returns `Read` if the host fails the lookup.
    pub async fn get_item(&self, key: impl Into<Key>) -> StorageResult<Option<Vec<u8>>> {
        let key = key.into();
        debug!(store = %self.store, %key, "get_item");

        let op = PendingOperation::<Option<Record>>::new("get_item");
        {
            let txn = self
                .transaction(TransactionMode::ReadOnly)
                .map_err(|e| self.read_error(e))?;
            txn.get(&self.store, &key, op.callbacks());
        }
        let record = op.wait().await.map_err(|e| self.read_error(e))?;
        Ok(record.map(|r| r.value))
    }

    /// Removes `key`. Removing a missing key succeeds.
    ///
    /// Host failures are logged as a delete warning and swallowed unless
    /// [`crate::Config::propagate_remove_errors`] is set.
    ///
    /// # Errors
    ///
    /// Returns `Write` only when `propagate_remove_errors` is set.
    pub async fn remove_item(&self, key: impl Into<Key>) -> StorageResult<()> {
        let key = key.into();
        debug!(store = %self.store, %key, "remove_item");

        let outcome = match self.transaction(TransactionMode::ReadWrite) {
            Ok(txn) => {
                let op = PendingOperation::new("remove_item");
                txn.delete(&self.store, &key, op.callbacks());
                drop(txn);
                op.wait().await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(e) if self.storage.config().propagate_remove_errors => {
                Err(self.write_error("remove_item", e))
            }
            Err(e) => {
                warn!(store = %self.store, %key, error = %e, "delete warning: remove_item failed");
                Ok(())
            }
        }
    }

    /// Removes every record from the store.
    ///
    /// # Errors
    ///
    /// Returns `Write` if the host fails the transaction.
    pub async fn clear(&self) -> StorageResult<()> {
        debug!(store = %self.store, "clear");

        let op = PendingOperation::new("clear");
        {
            let txn = self
                .transaction(TransactionMode::ReadWrite)
                .map_err(|e| self.write_error("clear", e))?;
            txn.clear(&self.store, op.callbacks());
        }
        op.wait().await.map_err(|e| self.write_error("clear", e))
    }

    /// Number of records in the store.
    ///
    /// # Errors
    ///
    /// Returns `Read` if the host fails the count.
    pub async fn count(&self) -> StorageResult<u64> {
        let op = PendingOperation::new("count");
        {
            let txn = self
                .transaction(TransactionMode::ReadOnly)
                .map_err(|e| self.read_error(e))?;
            txn.count(&self.store, op.callbacks());
        }
        op.wait().await.map_err(|e| self.read_error(e))
    }

    /// Whether a record exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Read` if the host fails the lookup.
    pub async fn contains_key(&self, key: impl Into<Key>) -> StorageResult<bool> {
        Ok(self.get_item(key).await?.is_some())
    }

    /// Stores `value` encoded as CBOR.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if encoding fails, otherwise as [`Partition::set_item`].
    pub async fn set_value<T: Serialize>(
        &self,
        key: impl Into<Key>,
        value: &T,
    ) -> StorageResult<()> {
        let mut bytes = Vec::new();
        ciborium::into_writer(value, &mut bytes)
            .map_err(|e| StorageError::codec(e.to_string()))?;
        self.set_item(key, bytes).await
    }

    /// Reads a CBOR-encoded value; `None` on a miss.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if the stored bytes do not decode as `T`, otherwise
    /// as [`Partition::get_item`].
    pub async fn get_value<T: DeserializeOwned>(
        &self,
        key: impl Into<Key>,
    ) -> StorageResult<Option<T>> {
        let Some(bytes) = self.get_item(key).await? else {
            return Ok(None);
        };
        ciborium::from_reader(bytes.as_slice())
            .map(Some)
            .map_err(|e| StorageError::codec(e.to_string()))
    }
}

/// Callbacks for a delete whose outcome is only logged.
pub(crate) fn logged_delete(store: &str, key: &Key) -> Callbacks<()> {
    let store = store.to_string();
    let key = key.clone();
    let failed_key = key.clone();
    let failed_store = store.clone();
    Callbacks::new(
        move |()| trace!(%store, %key, "record deleted"),
        move |error| {
            warn!(store = %failed_store, key = %failed_key, %error, "delete warning");
        },
    )
}
