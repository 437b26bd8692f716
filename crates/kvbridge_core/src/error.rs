//! Error types for kvbridge core.

use kvbridge_engine::EngineError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by [`crate::Storage`] operations.
///
/// Misses are not errors: `get_item` on an absent key returns `Ok(None)`.
/// Failed deletes in `remove_item` are logged rather than returned unless
/// [`crate::Config::propagate_remove_errors`] is set.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The host denied or failed the open request. The handle is unusable.
    #[error("failed to open database '{database}': {source}")]
    Connection {
        /// Database name.
        database: String,
        /// Host failure.
        #[source]
        source: EngineError,
    },

    /// A write (set, remove, clear or purge) failed.
    #[error("{operation} on store '{store}' failed: {source}")]
    Write {
        /// Store the write targeted.
        store: String,
        /// Operation name.
        operation: &'static str,
        /// Host failure.
        #[source]
        source: EngineError,
    },

    /// A lookup failed at the host level.
    #[error("read from store '{store}' failed: {source}")]
    Read {
        /// Store the read targeted.
        store: String,
        /// Host failure.
        #[source]
        source: EngineError,
    },

    /// A typed value could not be encoded or decoded.
    #[error("value codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl StorageError {
    /// Creates a connection error.
    pub fn connection(database: impl Into<String>, source: EngineError) -> Self {
        Self::Connection {
            database: database.into(),
            source,
        }
    }

    /// Creates a write error.
    pub fn write(store: impl Into<String>, operation: &'static str, source: EngineError) -> Self {
        Self::Write {
            store: store.into(),
            operation,
            source,
        }
    }

    /// Creates a read error.
    pub fn read(store: impl Into<String>, source: EngineError) -> Self {
        Self::Read {
            store: store.into(),
            source,
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns the underlying host failure, if any.
    #[must_use]
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Connection { source, .. }
            | Self::Write { source, .. }
            | Self::Read { source, .. } => Some(source),
            Self::Codec { .. } | Self::InvalidConfig { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_message_names_operation() {
        let err = StorageError::write("default", "set_item", EngineError::QuotaExceeded);
        assert_eq!(
            err.to_string(),
            "set_item on store 'default' failed: storage quota exceeded"
        );
    }

    #[test]
    fn engine_error_exposes_source() {
        let err = StorageError::read("s", EngineError::Closed);
        assert_eq!(err.engine_error(), Some(&EngineError::Closed));
        assert_eq!(StorageError::codec("bad").engine_error(), None);
    }
}
