//! Host engine contract.
//!
//! These traits describe a callback-driven, transactional record engine of
//! the kind a platform embeds per origin. Every asynchronous request takes a
//! [`Callbacks`] pair; the host later invokes exactly one of them, from its
//! own event loop and never from the caller's stack.

use crate::error::{EngineError, EngineResult};
use crate::key::Key;
use crate::range::KeyRange;
use crate::record::{IndexSpec, Record};
use std::fmt;
use std::sync::Arc;

/// Callback invoked with a request's success value.
pub type SuccessCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Callback invoked with a request's failure.
pub type ErrorCallback = Box<dyn FnOnce(EngineError) + Send + 'static>;

/// Callback invoked for every cursor step: `Some` for a visited entry,
/// `None` once the cursor is exhausted.
pub type CursorStepCallback = Box<dyn FnMut(Option<Box<dyn IndexCursor>>) + Send + 'static>;

/// Callback run inside the version-change transaction of an upgrade.
pub type UpgradeCallback =
    Box<dyn FnOnce(&mut dyn VersionChange) -> EngineResult<()> + Send + 'static>;

/// The success/error callback pair of one request.
///
/// Firing consumes the pair, so a host holding a `Callbacks` can signal a
/// request only once.
pub struct Callbacks<T> {
    on_success: SuccessCallback<T>,
    on_error: ErrorCallback,
}

impl<T> Callbacks<T> {
    /// Creates a callback pair.
    pub fn new<S, E>(on_success: S, on_error: E) -> Self
    where
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(EngineError) + Send + 'static,
    {
        Self {
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        }
    }

    /// Fires the success callback.
    pub fn succeed(self, value: T) {
        (self.on_success)(value);
    }

    /// Fires the error callback.
    pub fn fail(self, error: EngineError) {
        (self.on_error)(error);
    }

    /// Fires the callback matching `outcome`.
    pub fn complete(self, outcome: EngineResult<T>) {
        match outcome {
            Ok(value) => self.succeed(value),
            Err(error) => self.fail(error),
        }
    }
}

impl<T> fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

/// Callbacks of an index cursor request.
pub struct CursorCallbacks {
    /// Invoked once per visited entry and once more (with `None`) on exhaustion.
    pub on_step: CursorStepCallback,
    /// Invoked instead of any further step if the scan fails.
    pub on_error: ErrorCallback,
}

impl CursorCallbacks {
    /// Creates cursor callbacks.
    pub fn new<S, E>(on_step: S, on_error: E) -> Self
    where
        S: FnMut(Option<Box<dyn IndexCursor>>) + Send + 'static,
        E: FnOnce(EngineError) + Send + 'static,
    {
        Self {
            on_step: Box::new(on_step),
            on_error: Box::new(on_error),
        }
    }
}

impl fmt::Debug for CursorCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorCallbacks").finish_non_exhaustive()
    }
}

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only. Read-only transactions with overlapping scopes may run together.
    ReadOnly,
    /// Reads and writes. Serialized against every overlapping transaction.
    ReadWrite,
}

/// A position of an index cursor.
///
/// The cursor does not move on its own: after handling an entry the
/// receiver calls [`IndexCursor::advance`] to request the next step.
/// Dropping the cursor without advancing ends the scan silently.
pub trait IndexCursor: Send {
    /// Primary key of the record at this position.
    fn primary_key(&self) -> &Key;

    /// Index value at this position.
    fn index_key(&self) -> u64;

    /// Requests the next entry (the platform's `continue`).
    fn advance(self: Box<Self>);
}

/// A transaction scoped to one or more object stores.
///
/// Requests are queued in issue order. The transaction commits on its own
/// once every handle to it is dropped and no request is outstanding. A
/// failed request aborts the transaction and rolls back its writes.
pub trait HostTransaction: Send + Sync {
    /// Returns the access mode.
    fn mode(&self) -> TransactionMode;

    /// Returns the stores this transaction may touch.
    fn scope(&self) -> &[String];

    /// Reads the record at `key`; succeeds with `None` on a miss.
    fn get(&self, store: &str, key: &Key, callbacks: Callbacks<Option<Record>>);

    /// Inserts `record`; fails with [`EngineError::Constraint`] if the key exists.
    fn add(&self, store: &str, record: Record, callbacks: Callbacks<()>);

    /// Deletes the record at `key`; a missing key is not an error.
    fn delete(&self, store: &str, key: &Key, callbacks: Callbacks<()>);

    /// Deletes every record in `store`.
    fn clear(&self, store: &str, callbacks: Callbacks<()>);

    /// Counts the records in `store`.
    fn count(&self, store: &str, callbacks: Callbacks<u64>);

    /// Opens a forward cursor over `index` restricted to `range`.
    fn open_index_cursor(
        &self,
        store: &str,
        index: &str,
        range: KeyRange<u64>,
        callbacks: CursorCallbacks,
    );
}

/// An open connection to one database.
pub trait HostDatabase: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Version this connection was opened at.
    fn version(&self) -> u32;

    /// Names of the object stores, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Starts a transaction over `stores`.
    ///
    /// # Errors
    ///
    /// Returns an error synchronously if:
    /// - a store does not exist (`NotFound`)
    /// - `stores` is empty (`InvalidRequest`)
    /// - the connection is closed (`Closed`)
    /// - the host refuses to start a transaction (`Denied`)
    fn transaction(
        &self,
        stores: &[&str],
        mode: TransactionMode,
    ) -> EngineResult<Arc<dyn HostTransaction>>;

    /// Closes the connection. Later transactions fail with `Closed`.
    fn close(&self);
}

/// Schema operations available inside an upgrade.
pub trait VersionChange {
    /// Version before the upgrade; 0 for a new database.
    fn old_version(&self) -> u32;

    /// Version being upgraded to.
    fn new_version(&self) -> u32;

    /// Whether a store with this name exists.
    fn contains_store(&self, name: &str) -> bool;

    /// Creates a store keyed by [`Record::key`].
    ///
    /// # Errors
    ///
    /// Returns `Constraint` if the store already exists.
    fn create_store(&mut self, name: &str) -> EngineResult<()>;

    /// Attaches a secondary index to an existing store.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown store and `Constraint` for a
    /// duplicate index name.
    fn create_index(&mut self, store: &str, spec: IndexSpec) -> EngineResult<()>;
}

/// A host record engine.
///
/// # Invariants
///
/// - For every request exactly one of its callbacks fires, exactly once
/// - Callbacks never run on the stack of the call that issued the request
/// - An upgrade callback runs at most once per open, before its success
///   callback, and only when the stored version is lower than the requested one
pub trait HostEngine: Send + Sync {
    /// Opens database `name`.
    ///
    /// With `Some(version)`, a missing database or one stored at a lower
    /// version is upgraded through `on_upgrade` first; a database stored at
    /// a higher version fails with [`EngineError::Version`]. With `None` the
    /// database opens at its current version (1 if new).
    fn open(
        &self,
        name: &str,
        version: Option<u32>,
        on_upgrade: UpgradeCallback,
        callbacks: Callbacks<Arc<dyn HostDatabase>>,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn complete_routes_outcome() {
        let hits = Arc::new(AtomicU32::new(0));
        let ok = Arc::clone(&hits);
        let err = Arc::clone(&hits);
        let callbacks: Callbacks<u32> = Callbacks::new(
            move |v| {
                ok.fetch_add(v, Ordering::SeqCst);
            },
            move |_| {
                err.fetch_add(100, Ordering::SeqCst);
            },
        );
        callbacks.complete(Ok(2));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fail_invokes_error_callback() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&seen);
        let callbacks: Callbacks<()> =
            Callbacks::new(|()| {}, move |e| *slot.lock() = Some(e));
        callbacks.fail(EngineError::QuotaExceeded);
        assert_eq!(*seen.lock(), Some(EngineError::QuotaExceeded));
    }
}
