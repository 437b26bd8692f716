//! Age-based purge over the `created` index.
//!
//! A purge opens one read/write transaction, walks the `created` index
//! upwards from the oldest record to the cutoff (inclusive) and deletes each
//! visited record by primary key before advancing. Cursor exhaustion is the
//! only completion signal.

use crate::bridge::PendingOperation;
use crate::error::StorageResult;
use crate::partition::{logged_delete, Partition};
use crate::schema::CREATED_INDEX;
use kvbridge_engine::{CursorCallbacks, EngineError, IndexCursor, KeyRange, TransactionMode};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Returns the cutoff for `max_age_secs` at `now_millis`.
///
/// Records created at or before the cutoff are expired.
#[must_use]
pub fn cutoff_millis(now_millis: u64, max_age_secs: u64) -> u64 {
    now_millis.saturating_sub(max_age_secs.saturating_mul(1000))
}

impl Partition<'_> {
    /// Deletes every record created at least `max_age_secs` seconds ago.
    ///
    /// `None` and `Some(0)` disable purging: nothing is deleted and no
    /// transaction is opened. Returns the number of deleted records.
    ///
    /// # Errors
    ///
    /// Returns `Write` if the transaction or the cursor fails.
    pub async fn purge(&self, max_age_secs: Option<u64>) -> StorageResult<u64> {
        let Some(max_age) = max_age_secs.filter(|secs| *secs > 0) else {
            debug!(store = %self.name(), "purge disabled");
            return Ok(0);
        };
        let cutoff = cutoff_millis(self.storage().now_millis(), max_age);
        debug!(store = %self.name(), max_age, cutoff, "purge");

        let op = PendingOperation::<u64>::new("purge");
        {
            let txn = self
                .transaction(TransactionMode::ReadWrite)
                .map_err(|e| self.write_error("purge", e))?;

            let store = self.name().to_string();
            let step_txn = Arc::clone(&txn);
            let done = op.signal();
            let mut deleted = 0u64;
            let on_step = move |cursor: Option<Box<dyn IndexCursor>>| match cursor {
                Some(cursor) => {
                    let key = cursor.primary_key().clone();
                    trace!(%store, %key, created = cursor.index_key(), "purging record");
                    step_txn.delete(&store, &key, logged_delete(&store, &key));
                    deleted += 1;
                    cursor.advance();
                }
                None => {
                    done.succeed(deleted);
                }
            };
            let failed = op.signal();
            let on_error = move |error: EngineError| {
                failed.fail(error);
            };

            txn.open_index_cursor(
                self.name(),
                CREATED_INDEX,
                KeyRange::upper_bound(cutoff, false),
                CursorCallbacks::new(on_step, on_error),
            );
        }

        let deleted = op.wait().await.map_err(|e| self.write_error("purge", e))?;
        info!(store = %self.name(), cutoff, deleted, "purge complete");
        Ok(deleted)
    }

    /// Purges with [`crate::Config::default_max_age`].
    ///
    /// Without a configured max age this is a no-op. Sub-second max ages
    /// round down to whole seconds.
    ///
    /// # Errors
    ///
    /// Same as [`Partition::purge`].
    pub async fn purge_expired(&self) -> StorageResult<u64> {
        let max_age = self
            .storage()
            .config()
            .default_max_age
            .map(|age| age.as_secs());
        self.purge(max_age).await
    }
}
