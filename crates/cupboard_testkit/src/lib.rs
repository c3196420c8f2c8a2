//! # Cupboard Testkit
//!
//! Test utilities for Cupboard.
//!
//! This crate provides:
//! - [`TestCupboard`]: an attached cupboard over a temporary directory
//! - Property-based test generators using proptest
//! - [`init_tracing`] for log output in tests
//!
//! ## Usage
//!
//! ```rust
//! use cupboard_testkit::prelude::*;
//!
//! let mut fixture = TestCupboard::new();
//! let id = fixture
//!     .table("crumbs")
//!     .unwrap()
//!     .set("", crumb("Implement X", "draft"))
//!     .unwrap();
//!
//! fixture.reattach();
//! assert!(fixture.table("crumbs").unwrap().get(&id).is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
mod logging;

pub use fixtures::*;
pub use generators::*;
pub use logging::init_tracing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::init_tracing;
}
