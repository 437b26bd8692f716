//! # kvbridge Testkit
//!
//! Test utilities for kvbridge.
//!
//! This crate provides:
//! - Storage fixtures over the in-memory engine with a manual clock
//! - Property-based test generators using proptest
//! - A `tracing` subscriber for test output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kvbridge_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_storage() {
//!     let test = TestStorage::open().await;
//!     test.set_item("k", b"v".to_vec()).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
