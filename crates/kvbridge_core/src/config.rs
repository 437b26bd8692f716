//! Storage configuration.

use crate::error::{StorageError, StorageResult};
use std::time::Duration;

/// Configuration for opening a [`crate::Storage`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Database name passed to the host.
    pub database_name: String,

    /// Object stores that must exist after open.
    pub stores: Vec<String>,

    /// Schema version requested from the host.
    pub version: u32,

    /// Store used by the `Storage`-level record operations.
    pub default_store: String,

    /// Whether stores also get an `accessed` index.
    pub track_accessed_index: bool,

    /// Whether `remove_item` returns delete failures instead of logging them.
    pub propagate_remove_errors: bool,

    /// Max age used by `purge_expired` (`None` = purging disabled).
    pub default_max_age: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_name: "kvbridge".to_string(),
            stores: vec!["default".to_string()],
            version: 1,
            default_store: "default".to_string(),
            track_accessed_index: true,
            propagate_remove_errors: false,
            default_max_age: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the database name.
    #[must_use]
    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    /// Sets the object stores.
    ///
    /// If the current default store is not among them, the first store
    /// becomes the default.
    #[must_use]
    pub fn stores<I, S>(mut self, stores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stores = stores.into_iter().map(Into::into).collect();
        if !self.stores.contains(&self.default_store) {
            if let Some(first) = self.stores.first() {
                self.default_store = first.clone();
            }
        }
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the default store.
    #[must_use]
    pub fn default_store(mut self, store: impl Into<String>) -> Self {
        self.default_store = store.into();
        self
    }

    /// Sets whether to create the `accessed` index.
    #[must_use]
    pub const fn track_accessed_index(mut self, value: bool) -> Self {
        self.track_accessed_index = value;
        self
    }

    /// Sets whether `remove_item` propagates delete failures.
    #[must_use]
    pub const fn propagate_remove_errors(mut self, value: bool) -> Self {
        self.propagate_remove_errors = value;
        self
    }

    /// Sets the max age used by `purge_expired`.
    #[must_use]
    pub const fn default_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.default_max_age = max_age;
        self
    }

    /// Checks the configuration for values the host would reject.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty database name, an empty or
    /// duplicated store name, version 0, or a default store that is not
    /// listed in `stores`.
    pub fn validate(&self) -> StorageResult<()> {
        if self.database_name.is_empty() {
            return Err(StorageError::invalid_config("database name is empty"));
        }
        if self.stores.is_empty() {
            return Err(StorageError::invalid_config("no object stores configured"));
        }
        for (i, store) in self.stores.iter().enumerate() {
            if store.is_empty() {
                return Err(StorageError::invalid_config("store name is empty"));
            }
            if self.stores[..i].contains(store) {
                return Err(StorageError::invalid_config(format!(
                    "store '{store}' listed twice"
                )));
            }
        }
        if self.version == 0 {
            return Err(StorageError::invalid_config("version must be at least 1"));
        }
        if !self.stores.contains(&self.default_store) {
            return Err(StorageError::invalid_config(format!(
                "default store '{}' is not configured",
                self.default_store
            )));
        }
        Ok(())
    }
}
