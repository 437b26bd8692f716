//! Schema initialization run inside the host's upgrade transaction.
//!
//! Every configured store is created if missing and gets a non-unique
//! `created` index (and, when enabled, an `accessed` index). Existing stores
//! are left untouched. The initializer records what it did in an
//! [`UpgradeReport`].

use kvbridge_engine::{EngineResult, IndexField, IndexSpec, UpgradeCallback, VersionChange};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Name of the creation-time index.
pub const CREATED_INDEX: &str = "created";

/// Name of the last-access-time index.
pub const ACCESSED_INDEX: &str = "accessed";

/// One schema change applied during an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOperation {
    /// A store was created.
    CreateStore {
        /// Store name.
        store: String,
    },
    /// An index was attached to a store.
    CreateIndex {
        /// Store name.
        store: String,
        /// Index name.
        index: String,
    },
}

/// What an upgrade did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Version before the upgrade (0 for a new database).
    pub old_version: u32,
    /// Version after the upgrade.
    pub new_version: u32,
    /// Changes in the order they were applied.
    pub operations: Vec<SchemaOperation>,
}

impl UpgradeReport {
    /// Names of the stores created by this upgrade.
    pub fn created_stores(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().filter_map(|op| match op {
            SchemaOperation::CreateStore { store } => Some(store.as_str()),
            SchemaOperation::CreateIndex { .. } => None,
        })
    }
}

/// Creates the configured stores and their indexes.
#[derive(Debug, Clone)]
pub struct SchemaInitializer {
    stores: Vec<String>,
    track_accessed: bool,
}

impl SchemaInitializer {
    /// Creates an initializer for `stores`.
    #[must_use]
    pub fn new(stores: Vec<String>, track_accessed: bool) -> Self {
        Self {
            stores,
            track_accessed,
        }
    }

    fn index_specs(&self) -> Vec<IndexSpec> {
        let mut specs = vec![IndexSpec::non_unique(CREATED_INDEX, IndexField::Created)];
        if self.track_accessed {
            specs.push(IndexSpec::non_unique(ACCESSED_INDEX, IndexField::Accessed));
        }
        specs
    }

    /// Applies the schema to `change`.
    ///
    /// # Errors
    ///
    /// Propagates the first host failure; the host then aborts the upgrade.
    pub fn apply(&self, change: &mut dyn VersionChange) -> EngineResult<UpgradeReport> {
        let mut operations = Vec::new();
        for store in &self.stores {
            if change.contains_store(store) {
                continue;
            }
            change.create_store(store)?;
            operations.push(SchemaOperation::CreateStore {
                store: store.clone(),
            });
            for spec in self.index_specs() {
                let index = spec.name.clone();
                change.create_index(store, spec)?;
                operations.push(SchemaOperation::CreateIndex {
                    store: store.clone(),
                    index,
                });
            }
        }
        debug!(
            old_version = change.old_version(),
            new_version = change.new_version(),
            operations = operations.len(),
            "schema upgrade applied"
        );
        Ok(UpgradeReport {
            old_version: change.old_version(),
            new_version: change.new_version(),
            operations,
        })
    }

    /// Wraps the initializer in a host upgrade callback that stores its
    /// report in `slot`.
    #[must_use]
    pub fn into_upgrade_callback(self, slot: Arc<Mutex<Option<UpgradeReport>>>) -> UpgradeCallback {
        Box::new(move |change: &mut dyn VersionChange| {
            let report = self.apply(change)?;
            *slot.lock() = Some(report);
            Ok(())
        })
    }
}
