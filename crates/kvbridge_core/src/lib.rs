//! # kvbridge Core
//!
//! Sequential key-value storage over a callback-based host record engine.
//!
//! This crate provides:
//! - [`Storage`], an owned handle to one host database with `set_item`,
//!   `get_item`, `remove_item`, `clear` and `purge`
//! - [`Partition`], the same operations on a named store
//! - A synchronization bridge ([`PendingOperation`]) that turns host
//!   callbacks into awaitable results
//! - Schema initialization with `created` and `accessed` indexes
//! - Age-based purge along the `created` index
//!
//! ## Example
//!
//! ```no_run
//! use kvbridge_core::{Config, Storage};
//! use kvbridge_engine::InMemoryEngine;
//! use std::sync::Arc;
//!
//! # async fn run() -> kvbridge_core::StorageResult<()> {
//! let storage = Storage::open(Arc::new(InMemoryEngine::new()), Config::default()).await?;
//! storage.set_item("greeting", b"hello".to_vec()).await?;
//! assert_eq!(storage.get_item("greeting").await?, Some(b"hello".to_vec()));
//! storage.purge(Some(3600)).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod clock;
mod config;
mod error;
mod partition;
mod purge;
mod schema;
mod storage;

pub use bridge::{PendingOperation, Signal};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{StorageError, StorageResult};
pub use partition::Partition;
pub use purge::cutoff_millis;
pub use schema::{
    SchemaInitializer, SchemaOperation, UpgradeReport, ACCESSED_INDEX, CREATED_INDEX,
};
pub use storage::Storage;

pub use kvbridge_engine::{EngineError, Key};
