//! In-memory reference host.
//!
//! [`InMemoryEngine`] implements the host contract the way a browser-style
//! record engine behaves:
//! - every callback runs on a dedicated event-loop thread, never on the
//!   caller's stack
//! - transactions with overlapping scopes start in creation order; read-only
//!   transactions may share a scope
//! - a transaction commits once its handles are dropped and nothing is
//!   outstanding, and a failed request aborts it and rolls back its writes
//!
//! It is suitable for tests and for ephemeral storage that does not need
//! to outlive the process.

mod event_loop;
mod store;

use crate::error::{EngineError, EngineResult};
use crate::host::{
    Callbacks, CursorCallbacks, HostDatabase, HostEngine, HostTransaction, IndexCursor,
    TransactionMode, UpgradeCallback, VersionChange,
};
use crate::key::Key;
use crate::range::KeyRange;
use crate::record::{IndexSpec, Record};
use event_loop::{dispatch, EventLoop, Job, JobSender, Request};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use store::{DatabaseData, StoreData};
use tokio::sync::mpsc;
use tracing::debug;

/// Kinds of host operation a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Opening a database.
    Open,
    /// Starting a transaction (fails synchronously).
    Transaction,
    /// `get` requests.
    Get,
    /// `add` requests.
    Add,
    /// `delete` requests.
    Delete,
    /// `clear` requests.
    Clear,
    /// `count` requests.
    Count,
    /// Opening or continuing an index cursor.
    Cursor,
}

#[derive(Debug)]
struct Fault {
    op: OpKind,
    error: EngineError,
}

/// State shared between the engine, its connections and the event loop.
pub(crate) struct Shared {
    pub(crate) data: Mutex<BTreeMap<String, DatabaseData>>,
    faults: Mutex<VecDeque<Fault>>,
    next_txn: AtomicU64,
    transactions_started: AtomicU64,
}

impl Shared {
    /// Removes and returns the first fault queued for `op`.
    pub(crate) fn take_fault(&self, op: OpKind) -> Option<EngineError> {
        let mut faults = self.faults.lock();
        let position = faults.iter().position(|f| f.op == op)?;
        faults.remove(position).map(|f| f.error)
    }
}

/// An in-memory host record engine.
///
/// # Example
///
/// ```rust,ignore
/// use kvbridge_engine::{HostEngine, InMemoryEngine};
/// use std::sync::Arc;
///
/// let engine: Arc<dyn HostEngine> = Arc::new(InMemoryEngine::new());
/// ```
pub struct InMemoryEngine {
    shared: Arc<Shared>,
    jobs: JobSender,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl InMemoryEngine {
    /// Creates an empty engine and starts its event loop.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            data: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(VecDeque::new()),
            next_txn: AtomicU64::new(1),
            transactions_started: AtomicU64::new(0),
        });
        let (jobs, receiver) = mpsc::unbounded_channel();
        let event_loop = EventLoop::new(Arc::clone(&shared), jobs.clone(), receiver);
        let worker = thread::spawn(move || event_loop.run());
        let worker_id = worker.thread().id();
        Self {
            shared,
            jobs,
            worker: Some(worker),
            worker_id,
        }
    }

    /// Makes the next operation of kind `op` fail with `error`.
    ///
    /// Faults queue up; each one is consumed by the first matching operation.
    /// A fault on a request inside a read/write transaction aborts it.
    pub fn fail_next(&self, op: OpKind, error: EngineError) {
        self.shared.faults.lock().push_back(Fault { op, error });
    }

    /// Returns the stored version of a database.
    pub fn version_of(&self, database: &str) -> Option<u32> {
        self.shared.data.lock().get(database).map(|db| db.version)
    }

    /// Returns the store names of a database, sorted.
    pub fn store_names(&self, database: &str) -> Vec<String> {
        self.shared
            .data
            .lock()
            .get(database)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the index names of a store, sorted.
    pub fn index_names(&self, database: &str, store: &str) -> Vec<String> {
        self.read_store(database, store, StoreData::index_names)
            .unwrap_or_default()
    }

    /// Returns a copy of the committed or in-flight record at `key`.
    pub fn record(&self, database: &str, store: &str, key: &Key) -> Option<Record> {
        self.read_store(database, store, |s| s.get(key)).flatten()
    }

    /// Returns the number of records in a store.
    pub fn record_count(&self, database: &str, store: &str) -> usize {
        self.read_store(database, store, StoreData::len).unwrap_or_default()
    }

    /// Returns how many transactions have been started so far.
    pub fn transactions_started(&self) -> u64 {
        self.shared.transactions_started.load(Ordering::SeqCst)
    }

    fn read_store<R>(
        &self,
        database: &str,
        store: &str,
        f: impl FnOnce(&StoreData) -> R,
    ) -> Option<R> {
        let data = self.shared.data.lock();
        data.get(database)
            .and_then(|db| db.stores.get(store))
            .map(f)
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEngine")
            .field("databases", &self.shared.data.lock().len())
            .field("transactions_started", &self.transactions_started())
            .finish()
    }
}

impl Drop for InMemoryEngine {
    fn drop(&mut self) {
        dispatch(&self.jobs, Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            // The last handle may be dropped from a callback on the loop itself.
            if thread::current().id() != self.worker_id {
                let _ = worker.join();
            }
        }
    }
}

impl HostEngine for InMemoryEngine {
    fn open(
        &self,
        name: &str,
        version: Option<u32>,
        on_upgrade: UpgradeCallback,
        callbacks: Callbacks<Arc<dyn HostDatabase>>,
    ) {
        debug!(database = name, ?version, "open requested");
        dispatch(
            &self.jobs,
            Job::Open {
                name: name.to_string(),
                version,
                on_upgrade,
                callbacks,
            },
        );
    }
}

/// A connection handed out by a successful open.
pub(crate) struct MemoryDatabase {
    name: String,
    version: u32,
    shared: Arc<Shared>,
    jobs: JobSender,
    closed: AtomicBool,
}

impl MemoryDatabase {
    pub(crate) fn new(name: String, version: u32, shared: Arc<Shared>, jobs: JobSender) -> Self {
        Self {
            name,
            version,
            shared,
            jobs,
            closed: AtomicBool::new(false),
        }
    }
}

impl HostDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.shared
            .data
            .lock()
            .get(&self.name)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn transaction(
        &self,
        stores: &[&str],
        mode: TransactionMode,
    ) -> EngineResult<Arc<dyn HostTransaction>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        if stores.is_empty() {
            return Err(EngineError::invalid_request("empty transaction scope"));
        }
        if let Some(error) = self.shared.take_fault(OpKind::Transaction) {
            return Err(error);
        }

        let data = self.shared.data.lock();
        let db = data
            .get(&self.name)
            .ok_or_else(|| EngineError::not_found(format!("database '{}'", self.name)))?;
        if let Some(missing) = stores.iter().find(|s| !db.stores.contains_key(**s)) {
            return Err(EngineError::not_found(format!("store '{missing}'")));
        }

        // Ids are allocated and announced under the data lock so the loop
        // sees transactions in creation order.
        let id = self.shared.next_txn.fetch_add(1, Ordering::SeqCst);
        self.shared.transactions_started.fetch_add(1, Ordering::SeqCst);
        let scope: Vec<String> = stores.iter().map(|s| (*s).to_string()).collect();
        dispatch(
            &self.jobs,
            Job::Begin {
                txn: id,
                db: self.name.clone(),
                scope: scope.clone(),
                mode,
            },
        );
        drop(data);

        Ok(Arc::new(MemoryTransaction {
            id,
            mode,
            scope,
            jobs: self.jobs.clone(),
        }))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Handle to a transaction. Dropping the last handle releases it.
struct MemoryTransaction {
    id: u64,
    mode: TransactionMode,
    scope: Vec<String>,
    jobs: JobSender,
}

impl MemoryTransaction {
    fn send(&self, request: Request) {
        dispatch(
            &self.jobs,
            Job::Request {
                txn: self.id,
                request,
            },
        );
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        dispatch(&self.jobs, Job::Release { txn: self.id });
    }
}

impl HostTransaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn scope(&self) -> &[String] {
        &self.scope
    }

    fn get(&self, store: &str, key: &Key, callbacks: Callbacks<Option<Record>>) {
        self.send(Request::Get {
            store: store.to_string(),
            key: key.clone(),
            callbacks,
        });
    }

    fn add(&self, store: &str, record: Record, callbacks: Callbacks<()>) {
        self.send(Request::Add {
            store: store.to_string(),
            record,
            callbacks,
        });
    }

    fn delete(&self, store: &str, key: &Key, callbacks: Callbacks<()>) {
        self.send(Request::Delete {
            store: store.to_string(),
            key: key.clone(),
            callbacks,
        });
    }

    fn clear(&self, store: &str, callbacks: Callbacks<()>) {
        self.send(Request::Clear {
            store: store.to_string(),
            callbacks,
        });
    }

    fn count(&self, store: &str, callbacks: Callbacks<u64>) {
        self.send(Request::Count {
            store: store.to_string(),
            callbacks,
        });
    }

    fn open_index_cursor(
        &self,
        store: &str,
        index: &str,
        range: KeyRange<u64>,
        callbacks: CursorCallbacks,
    ) {
        self.send(Request::OpenCursor {
            store: store.to_string(),
            index: index.to_string(),
            range,
            callbacks,
        });
    }
}

/// One delivered cursor position.
pub(crate) struct MemoryCursor {
    txn: u64,
    cursor: u64,
    store: String,
    index: String,
    range: KeyRange<u64>,
    index_key: u64,
    primary_key: Key,
    jobs: JobSender,
    advanced: bool,
}

impl MemoryCursor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        txn: u64,
        cursor: u64,
        store: String,
        index: String,
        range: KeyRange<u64>,
        index_key: u64,
        primary_key: Key,
        jobs: JobSender,
    ) -> Self {
        Self {
            txn,
            cursor,
            store,
            index,
            range,
            index_key,
            primary_key,
            jobs,
            advanced: false,
        }
    }
}

impl IndexCursor for MemoryCursor {
    fn primary_key(&self) -> &Key {
        &self.primary_key
    }

    fn index_key(&self) -> u64 {
        self.index_key
    }

    fn advance(mut self: Box<Self>) {
        self.advanced = true;
        dispatch(
            &self.jobs,
            Job::Request {
                txn: self.txn,
                request: Request::ContinueCursor {
                    cursor: self.cursor,
                    store: self.store.clone(),
                    index: self.index.clone(),
                    range: self.range.clone(),
                    after: (self.index_key, self.primary_key.clone()),
                },
            },
        );
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        if !self.advanced {
            dispatch(
                &self.jobs,
                Job::DropCursor {
                    txn: self.txn,
                    cursor: self.cursor,
                },
            );
        }
    }
}

/// The version-change transaction handed to an upgrade callback.
pub(crate) struct UpgradeTransaction<'a> {
    pub(crate) db: &'a mut DatabaseData,
    pub(crate) old_version: u32,
    pub(crate) new_version: u32,
}

impl VersionChange for UpgradeTransaction<'_> {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn new_version(&self) -> u32 {
        self.new_version
    }

    fn contains_store(&self, name: &str) -> bool {
        self.db.stores.contains_key(name)
    }

    fn create_store(&mut self, name: &str) -> EngineResult<()> {
        if self.db.stores.contains_key(name) {
            return Err(EngineError::constraint(format!("store '{name}' already exists")));
        }
        self.db.stores.insert(name.to_string(), StoreData::default());
        Ok(())
    }

    fn create_index(&mut self, store: &str, spec: IndexSpec) -> EngineResult<()> {
        self.db
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::not_found(format!("store '{store}'")))?
            .create_index(spec)
    }
}
