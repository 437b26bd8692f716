//! Error types for host engine operations.

use thiserror::Error;

/// Result type for host engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors a host engine reports through a request's error callback.
///
/// The type is `Clone` so a host can hand the same failure to several
/// outstanding requests (for example when a transaction aborts).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The named object store, index or database does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated (for example a duplicate key on add).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// The requested version is lower than the stored version.
    #[error("requested version {requested} is lower than the current version {current}")]
    Version {
        /// The version the caller asked for.
        requested: u32,
        /// The version the database is stored at.
        current: u32,
    },

    /// The origin's storage quota is exhausted.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// A write was issued against a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction has already finished.
    #[error("transaction is not active")]
    TransactionInactive,

    /// The transaction was aborted and its writes rolled back.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// The engine or the database connection is closed.
    #[error("engine is closed")]
    Closed,

    /// The host refused the request (disabled storage, blocked upgrade, ...).
    #[error("request denied: {0}")]
    Denied(String),

    /// The request was malformed (empty scope, version 0, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Every completion handle was dropped before a terminal signal fired.
    #[error("completion abandoned before a terminal signal fired")]
    Abandoned,
}

impl EngineError {
    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint(message.into())
    }

    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    /// Creates a denied error.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied(reason.into())
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
