//! # kvbridge Engine
//!
//! Host record engine contract and an in-memory reference host.
//!
//! The host engine is the platform-provided, transactional, keyed record
//! store that kvbridge wraps. Its native interface is callback based:
//! every request carries a success/error callback pair and the host fires
//! exactly one of them later, from its own event loop.
//!
//! ## Design Principles
//!
//! - Payloads are opaque bytes; the engine never interprets values
//! - Every request belongs to a transaction scoped to named stores
//! - Stores are keyed by [`Record::key`] and may carry secondary indexes
//!   over the `created` and `accessed` timestamps
//! - Implementations must be `Send + Sync`
//!
//! ## Available Hosts
//!
//! - [`InMemoryEngine`] - event-loop host for tests and ephemeral storage

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod host;
mod key;
mod memory;
mod range;
mod record;

pub use error::{EngineError, EngineResult};
pub use host::{
    Callbacks, CursorCallbacks, CursorStepCallback, ErrorCallback, HostDatabase, HostEngine,
    HostTransaction, IndexCursor, SuccessCallback, TransactionMode, UpgradeCallback,
    VersionChange,
};
pub use key::Key;
pub use memory::{InMemoryEngine, OpKind};
pub use range::KeyRange;
pub use record::{IndexField, IndexSpec, Record};
