//! Database Module
//!
//! The connection / statement / result lifecycle of the SQL Anywhere driver,
//! split into focused submodules:
//!
//! - **Values** (`value.rs`): scalar values and fetched rows
//! - **Parameters** (`params.rs`): logical connection options and the connection string
//! - **Connection Management** (`connection.rs`): session ownership, options and transactions
//! - **Statements** (`statement.rs`): prepare, positional binding and execution
//! - **Results** (`result.rs`): the lazy forward cursor over a native row set
//! - **Driver** (`driver.rs`): factory wiring and capability metadata
//!
//! ## Error Handling
//!
//! Every operation returns the crate's `SqlAnywhereError`, carrying a
//! translated `DriverError` whenever the native layer reported the failure.
pub mod connection;
pub mod driver;
pub mod params;
pub mod result;
pub mod statement;
pub mod value;

pub use connection::*;
pub use driver::*;
pub use params::*;
pub use result::*;
pub use statement::*;
pub use value::*;
