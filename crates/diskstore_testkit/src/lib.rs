//! # diskstore testkit
//!
//! Test utilities for diskstore.
//!
//! This crate provides:
//! - Temporary store fixtures
//! - Sample record types
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use diskstore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     let store = temp_store::<Point>();
//!     store.set("p", &Point { x: 1, y: 2 }).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod records;

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::records::*;
}

pub use fixtures::*;
pub use generators::*;
pub use records::*;

/// Installs a test subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
