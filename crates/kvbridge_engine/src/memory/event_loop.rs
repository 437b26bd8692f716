//! The in-memory host's event loop.
//!
//! All requests, cursor steps and opens are jobs on one channel, processed
//! by one thread. Callbacks run on that thread after the data lock is
//! released, so they may issue further requests.

use super::store::{DatabaseData, Undo};
use super::{MemoryCursor, MemoryDatabase, OpKind, Shared, UpgradeTransaction};
use crate::error::{EngineError, EngineResult};
use crate::host::{Callbacks, CursorCallbacks, HostDatabase, TransactionMode, UpgradeCallback};
use crate::key::Key;
use crate::range::KeyRange;
use crate::record::Record;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

pub(crate) type JobSender = UnboundedSender<Job>;

/// Sends `job`, failing it with `Closed` if the loop has shut down.
pub(crate) fn dispatch(jobs: &JobSender, job: Job) {
    if let Err(rejected) = jobs.send(job) {
        rejected.0.fail(EngineError::Closed);
    }
}

pub(crate) enum Job {
    Open {
        name: String,
        version: Option<u32>,
        on_upgrade: UpgradeCallback,
        callbacks: Callbacks<Arc<dyn HostDatabase>>,
    },
    Begin {
        txn: u64,
        db: String,
        scope: Vec<String>,
        mode: TransactionMode,
    },
    Request {
        txn: u64,
        request: Request,
    },
    Release {
        txn: u64,
    },
    DropCursor {
        txn: u64,
        cursor: u64,
    },
    Shutdown,
}

impl Job {
    fn fail(self, error: EngineError) {
        match self {
            Self::Open { callbacks, .. } => callbacks.fail(error),
            Self::Request { request, .. } => request.fail(error),
            Self::Begin { .. }
            | Self::Release { .. }
            | Self::DropCursor { .. }
            | Self::Shutdown => {}
        }
    }
}

pub(crate) enum Request {
    Get {
        store: String,
        key: Key,
        callbacks: Callbacks<Option<Record>>,
    },
    Add {
        store: String,
        record: Record,
        callbacks: Callbacks<()>,
    },
    Delete {
        store: String,
        key: Key,
        callbacks: Callbacks<()>,
    },
    Clear {
        store: String,
        callbacks: Callbacks<()>,
    },
    Count {
        store: String,
        callbacks: Callbacks<u64>,
    },
    OpenCursor {
        store: String,
        index: String,
        range: KeyRange<u64>,
        callbacks: CursorCallbacks,
    },
    ContinueCursor {
        cursor: u64,
        store: String,
        index: String,
        range: KeyRange<u64>,
        after: (u64, Key),
    },
}

impl Request {
    fn store(&self) -> &str {
        match self {
            Self::Get { store, .. }
            | Self::Add { store, .. }
            | Self::Delete { store, .. }
            | Self::Clear { store, .. }
            | Self::Count { store, .. }
            | Self::OpenCursor { store, .. }
            | Self::ContinueCursor { store, .. } => store,
        }
    }

    fn kind(&self) -> OpKind {
        match self {
            Self::Get { .. } => OpKind::Get,
            Self::Add { .. } => OpKind::Add,
            Self::Delete { .. } => OpKind::Delete,
            Self::Clear { .. } => OpKind::Clear,
            Self::Count { .. } => OpKind::Count,
            Self::OpenCursor { .. } | Self::ContinueCursor { .. } => OpKind::Cursor,
        }
    }

    fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Add { .. } | Self::Delete { .. } | Self::Clear { .. }
        )
    }

    /// Fails the request. A continued cursor's callbacks live in its
    /// transaction and are failed there.
    fn fail(self, error: EngineError) {
        match self {
            Self::Get { callbacks, .. } => callbacks.fail(error),
            Self::Add { callbacks, .. }
            | Self::Delete { callbacks, .. }
            | Self::Clear { callbacks, .. } => callbacks.fail(error),
            Self::Count { callbacks, .. } => callbacks.fail(error),
            Self::OpenCursor { callbacks, .. } => (callbacks.on_error)(error),
            Self::ContinueCursor { .. } => {}
        }
    }
}

struct TxnState {
    db: String,
    scope: Vec<String>,
    mode: TransactionMode,
    released: bool,
    aborted: Option<String>,
    journal: Vec<Undo>,
    deferred: VecDeque<Request>,
    cursors: HashMap<u64, CursorCallbacks>,
}

impl TxnState {
    fn overlaps(&self, other: &TxnState) -> bool {
        self.db == other.db && self.scope.iter().any(|s| other.scope.contains(s))
    }
}

pub(crate) struct EventLoop {
    shared: Arc<Shared>,
    jobs: JobSender,
    receiver: UnboundedReceiver<Job>,
    txns: BTreeMap<u64, TxnState>,
    next_cursor: u64,
}

impl EventLoop {
    pub(crate) fn new(
        shared: Arc<Shared>,
        jobs: JobSender,
        receiver: UnboundedReceiver<Job>,
    ) -> Self {
        Self {
            shared,
            jobs,
            receiver,
            txns: BTreeMap::new(),
            next_cursor: 1,
        }
    }

    pub(crate) fn run(mut self) {
        while let Some(job) = self.receiver.blocking_recv() {
            match job {
                Job::Open {
                    name,
                    version,
                    on_upgrade,
                    callbacks,
                } => self.open(name, version, on_upgrade, callbacks),
                Job::Begin {
                    txn,
                    db,
                    scope,
                    mode,
                } => {
                    trace!(txn, %db, ?scope, ?mode, "transaction created");
                    self.txns.insert(
                        txn,
                        TxnState {
                            db,
                            scope,
                            mode,
                            released: false,
                            aborted: None,
                            journal: Vec::new(),
                            deferred: VecDeque::new(),
                            cursors: HashMap::new(),
                        },
                    );
                }
                Job::Request { txn, request } => self.submit(txn, request),
                Job::Release { txn } => {
                    if let Some(state) = self.txns.get_mut(&txn) {
                        state.released = true;
                    }
                    self.settle(txn);
                }
                Job::DropCursor { txn, cursor } => {
                    if let Some(state) = self.txns.get_mut(&txn) {
                        state.cursors.remove(&cursor);
                    }
                    self.settle(txn);
                }
                Job::Shutdown => break,
            }
        }
        self.shutdown();
    }

    fn open(
        &mut self,
        name: String,
        version: Option<u32>,
        on_upgrade: UpgradeCallback,
        callbacks: Callbacks<Arc<dyn HostDatabase>>,
    ) {
        if let Some(error) = self.shared.take_fault(OpKind::Open) {
            callbacks.fail(error);
            return;
        }

        let existing = self.shared.data.lock().get(&name).cloned();
        let current = existing.as_ref().map_or(0, |db| db.version);
        let target = match version {
            Some(0) => {
                callbacks.fail(EngineError::invalid_request("version must be positive"));
                return;
            }
            Some(requested) if requested < current => {
                callbacks.fail(EngineError::Version { requested, current });
                return;
            }
            Some(requested) => requested,
            None => current.max(1),
        };

        if target > current {
            let mut staging = existing.unwrap_or_default();
            let mut upgrade = UpgradeTransaction {
                db: &mut staging,
                old_version: current,
                new_version: target,
            };
            if let Err(error) = on_upgrade(&mut upgrade) {
                warn!(database = %name, %error, "upgrade aborted");
                callbacks.fail(EngineError::aborted(format!("upgrade failed: {error}")));
                return;
            }
            staging.version = target;
            debug!(database = %name, from = current, to = target, "database upgraded");
            self.shared.data.lock().insert(name.clone(), staging);
        }

        let database: Arc<dyn HostDatabase> = Arc::new(MemoryDatabase::new(
            name,
            target,
            Arc::clone(&self.shared),
            self.jobs.clone(),
        ));
        callbacks.succeed(database);
    }

    fn is_blocked(&self, txn: u64) -> bool {
        let Some(state) = self.txns.get(&txn) else {
            return false;
        };
        self.txns.range(..txn).any(|(_, earlier)| {
            earlier.overlaps(state)
                && (earlier.mode == TransactionMode::ReadWrite
                    || state.mode == TransactionMode::ReadWrite)
        })
    }

    fn submit(&mut self, txn: u64, request: Request) {
        let blocked = self.is_blocked(txn);
        match self.txns.get_mut(&txn) {
            None => request.fail(EngineError::TransactionInactive),
            Some(state) if blocked || !state.deferred.is_empty() => {
                state.deferred.push_back(request);
                if !blocked {
                    self.pump();
                }
            }
            Some(_) => self.execute(txn, request),
        }
    }

    fn execute(&mut self, txn: u64, request: Request) {
        let (db, aborted, in_scope, mode) = match self.txns.get(&txn) {
            Some(state) => (
                state.db.clone(),
                state.aborted.clone(),
                state.scope.iter().any(|s| s == request.store()),
                state.mode,
            ),
            None => {
                request.fail(EngineError::TransactionInactive);
                return;
            }
        };
        if let Some(reason) = aborted {
            request.fail(EngineError::Aborted(reason));
            return;
        }
        if !in_scope {
            let store = request.store().to_string();
            request.fail(EngineError::not_found(format!(
                "store '{store}' is outside the transaction scope"
            )));
            return;
        }
        if request.is_write() && mode == TransactionMode::ReadOnly {
            request.fail(EngineError::ReadOnly);
            return;
        }
        if let Some(error) = self.shared.take_fault(request.kind()) {
            self.fail_and_abort(txn, request, error);
            return;
        }

        match request {
            Request::Get {
                store,
                key,
                callbacks,
            } => match self.with_store(&db, &store, |s| Ok(s.get(&key))) {
                Ok(record) => callbacks.succeed(record),
                Err(error) => {
                    self.abort(txn, &error);
                    callbacks.fail(error);
                }
            },
            Request::Add {
                store,
                record,
                callbacks,
            } => {
                let key = record.key.clone();
                match self.with_store(&db, &store, |s| s.add(record)) {
                    Ok(()) => {
                        self.journal(txn, Undo::Added { store, key });
                        callbacks.succeed(());
                    }
                    Err(error) => {
                        self.abort(txn, &error);
                        callbacks.fail(error);
                    }
                }
            }
            Request::Delete {
                store,
                key,
                callbacks,
            } => match self.with_store(&db, &store, |s| Ok(s.delete(&key))) {
                Ok(removed) => {
                    if let Some(record) = removed {
                        self.journal(txn, Undo::Deleted { store, record });
                    }
                    callbacks.succeed(());
                }
                Err(error) => {
                    self.abort(txn, &error);
                    callbacks.fail(error);
                }
            },
            Request::Clear { store, callbacks } => {
                match self.with_store(&db, &store, |s| Ok(s.clear())) {
                    Ok(records) => {
                        self.journal(txn, Undo::Cleared { store, records });
                        callbacks.succeed(());
                    }
                    Err(error) => {
                        self.abort(txn, &error);
                        callbacks.fail(error);
                    }
                }
            }
            Request::Count { store, callbacks } => {
                match self.with_store(&db, &store, |s| Ok(s.len() as u64)) {
                    Ok(count) => callbacks.succeed(count),
                    Err(error) => {
                        self.abort(txn, &error);
                        callbacks.fail(error);
                    }
                }
            }
            Request::OpenCursor {
                store,
                index,
                range,
                callbacks,
            } => {
                let cursor = self.next_cursor;
                self.next_cursor += 1;
                if let Some(state) = self.txns.get_mut(&txn) {
                    state.cursors.insert(cursor, callbacks);
                }
                self.step_cursor(txn, &db, cursor, store, index, range, None);
            }
            Request::ContinueCursor {
                cursor,
                store,
                index,
                range,
                after,
            } => self.step_cursor(txn, &db, cursor, store, index, range, Some(after)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step_cursor(
        &mut self,
        txn: u64,
        db: &str,
        cursor: u64,
        store: String,
        index: String,
        range: KeyRange<u64>,
        after: Option<(u64, Key)>,
    ) {
        let Some(mut callbacks) = self
            .txns
            .get_mut(&txn)
            .and_then(|state| state.cursors.remove(&cursor))
        else {
            return;
        };

        match self.with_store(db, &store, |s| s.next_in_index(&index, &range, after.as_ref())) {
            Ok(Some((index_key, primary_key))) => {
                let entry = MemoryCursor::new(
                    txn,
                    cursor,
                    store,
                    index,
                    range,
                    index_key,
                    primary_key,
                    self.jobs.clone(),
                );
                (callbacks.on_step)(Some(Box::new(entry)));
                if let Some(state) = self.txns.get_mut(&txn) {
                    state.cursors.insert(cursor, callbacks);
                }
            }
            Ok(None) => {
                (callbacks.on_step)(None);
                drop(callbacks);
                self.settle(txn);
            }
            Err(error) => {
                self.abort(txn, &error);
                (callbacks.on_error)(error);
            }
        }
    }

    fn with_store<R>(
        &self,
        db: &str,
        store: &str,
        f: impl FnOnce(&mut super::store::StoreData) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut data = self.shared.data.lock();
        let store_data = data
            .get_mut(db)
            .and_then(|d| d.stores.get_mut(store))
            .ok_or_else(|| EngineError::not_found(format!("store '{store}'")))?;
        f(store_data)
    }

    fn journal(&mut self, txn: u64, undo: Undo) {
        if let Some(state) = self.txns.get_mut(&txn) {
            state.journal.push(undo);
        }
    }

    fn fail_and_abort(&mut self, txn: u64, request: Request, error: EngineError) {
        self.abort(txn, &error);
        request.fail(error);
    }

    /// Rolls back the transaction's writes and fails its open cursors.
    fn abort(&mut self, txn: u64, cause: &EngineError) {
        let Some(state) = self.txns.get_mut(&txn) else {
            return;
        };
        if state.aborted.is_some() {
            return;
        }
        let reason = cause.to_string();
        state.aborted = Some(reason.clone());
        let journal = std::mem::take(&mut state.journal);
        let cursors = std::mem::take(&mut state.cursors);
        let db_name = state.db.clone();

        {
            let mut data = self.shared.data.lock();
            if let Some(db) = data.get_mut(&db_name) {
                rollback(db, journal);
            }
        }
        warn!(txn, database = %db_name, %reason, "transaction aborted");

        for (_, callbacks) in cursors {
            (callbacks.on_error)(EngineError::Aborted(reason.clone()));
        }
    }

    /// Finishes `txn` if nothing keeps it alive, then runs whatever that unblocks.
    fn settle(&mut self, txn: u64) {
        let finished = match self.txns.get(&txn) {
            Some(state) => {
                state.released && state.deferred.is_empty() && state.cursors.is_empty()
            }
            None => false,
        };
        if !finished {
            return;
        }
        if let Some(state) = self.txns.remove(&txn) {
            if state.aborted.is_none() {
                trace!(txn, writes = state.journal.len(), "transaction committed");
            }
        }
        self.pump();
    }

    fn pump(&mut self) {
        loop {
            let ready = self
                .txns
                .iter()
                .filter(|(_, state)| !state.deferred.is_empty())
                .map(|(id, _)| *id)
                .find(|id| !self.is_blocked(*id));
            let Some(txn) = ready else {
                break;
            };
            let requests = self
                .txns
                .get_mut(&txn)
                .map(|state| std::mem::take(&mut state.deferred))
                .unwrap_or_default();
            for request in requests {
                self.execute(txn, request);
            }
            let finished = self.txns.get(&txn).is_some_and(|state| {
                state.released && state.deferred.is_empty() && state.cursors.is_empty()
            });
            if finished {
                self.txns.remove(&txn);
            }
        }
    }

    fn shutdown(mut self) {
        debug!(pending = self.txns.len(), "host event loop stopping");
        for (_, state) in std::mem::take(&mut self.txns) {
            for request in state.deferred {
                request.fail(EngineError::Closed);
            }
            for (_, callbacks) in state.cursors {
                (callbacks.on_error)(EngineError::Closed);
            }
        }
        self.receiver.close();
        while let Ok(job) = self.receiver.try_recv() {
            job.fail(EngineError::Closed);
        }
    }
}

fn rollback(db: &mut DatabaseData, journal: Vec<Undo>) {
    for undo in journal.into_iter().rev() {
        undo.revert(db);
    }
}
