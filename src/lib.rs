//! A blocking SQL Anywhere driver layer.
//!
//! The connection / statement / result lifecycle, transaction handling and
//! error translation, running over a pluggable native client library.

// Core infrastructure modules
pub mod core;

// Consumer-facing modules
pub mod adapter;
pub mod config;
pub mod platform;
pub mod profiler;

pub use adapter::Adapter;
pub use crate::core::db::{
    Connection, ConnectionParameters, Driver, ParameterContainer, Parameters, ResultSet, Row,
    Statement, StatementSource, TransactionState, Value,
};
pub use crate::core::error::{DriverError, Result, SqlAnywhereError};
pub use crate::core::native::memory::MemoryClient;
pub use crate::core::native::sqlite::SqliteClient;
pub use platform::Platform;
pub use profiler::{Profiler, QueryProfiler, SharedProfiler};
