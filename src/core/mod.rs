//! Core Module
//!
//! The native binding layer, the error translator and the database
//! lifecycle built on top of them.

pub mod db;
pub mod error;
pub mod native;

// Re-export commonly used types for convenience
pub use error::{DriverError, Result, SqlAnywhereError};
