//! Driver Error Module
//!
//! Every failed native call is translated at its call site into one
//! structured [`DriverError`] (SQLSTATE, native code, message) and wrapped in
//! the [`SqlAnywhereError`] variant describing which operation failed.

use crate::core::native::{NativeClient, NativeSession, NativeStatement};
use std::fmt;
use thiserror::Error;

/// Message used when the native layer reports a failure but no text.
pub const FALLBACK_MESSAGE: &str =
    "SQL Anywhere error occurred but no error message was retrieved from driver.";

/// Error state captured from the native client library.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriverError {
    /// Five-character SQLSTATE class code, empty when unknown
    pub sqlstate: String,
    /// Native error code, 0 when none was reported
    pub code: i32,
    /// Native error text
    pub message: Option<String>,
}

impl DriverError {
    /// Creates an error from explicit parts.
    pub fn new(sqlstate: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        DriverError {
            sqlstate: sqlstate.into(),
            code,
            message: Some(message.into()),
        }
    }

    /// Creates an error raised by the driver itself rather than the native layer.
    pub fn runtime(message: impl Into<String>) -> Self {
        DriverError {
            sqlstate: String::new(),
            code: 0,
            message: Some(message.into()),
        }
    }

    /// Translates native error state into a `DriverError`.
    ///
    /// The SQLSTATE comes from the session when one is given, otherwise from
    /// the process-global client state. Code and message are consulted on the
    /// statement first, then the session, then the client; the first level
    /// reporting a non-zero code wins.
    pub fn from_native(
        client: Option<&dyn NativeClient>,
        session: Option<&dyn NativeSession>,
        statement: Option<&dyn NativeStatement>,
    ) -> Self {
        let sqlstate = session
            .and_then(|s| s.sqlstate())
            .or_else(|| client.and_then(|c| c.sqlstate()))
            .unwrap_or_default();

        let mut code = 0;
        let mut message = None;

        if let Some(stmt) = statement {
            code = stmt.error_code();
            message = stmt.error_message();
        }
        if code == 0 {
            if let Some(conn) = session {
                code = conn.error_code();
                message = conn.error_message();
            }
        }
        if code == 0 {
            if let Some(global) = client {
                code = global.error_code();
                message = global.error_message();
            }
        }

        DriverError {
            sqlstate,
            code,
            message: message.filter(|m| !m.is_empty()),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            None => f.write_str(FALLBACK_MESSAGE),
            Some(message) if self.sqlstate.is_empty() && self.code == 0 => f.write_str(message),
            Some(message) => write!(f, "SQLSTATE [{}] [{}] {}", self.sqlstate, self.code, message),
        }
    }
}

impl std::error::Error for DriverError {}

/// Error type for every driver operation.
#[derive(Error, Debug)]
pub enum SqlAnywhereError {
    /// Opening a session or applying a mandatory session option failed
    #[error("Connection error: {0}")]
    Connection(DriverError),

    /// The native prepare call failed
    #[error("Prepare error: {0}")]
    Prepare(DriverError),

    /// Binding a positional parameter failed
    #[error("Bind error at position {position}: {source}")]
    Bind {
        position: usize,
        #[source]
        source: DriverError,
    },

    /// The native execute/query call failed
    #[error("Execute error: {0}")]
    Execute(DriverError),

    /// Beginning, committing or rolling back a transaction failed
    #[error("Transaction error: {0}")]
    Transaction(DriverError),

    /// A resource or argument of the wrong kind was supplied
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The native client library is not available
    #[error("Environment error: {0}")]
    Environment(String),

    /// An introspection query failed or returned no row
    #[error("Query error: {0}")]
    Query(DriverError),

    /// The driver was used in a state that does not allow the operation
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SqlAnywhereError {
    /// The native error carried by this error, if any.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            SqlAnywhereError::Connection(e)
            | SqlAnywhereError::Prepare(e)
            | SqlAnywhereError::Execute(e)
            | SqlAnywhereError::Transaction(e)
            | SqlAnywhereError::Query(e) => Some(e),
            SqlAnywhereError::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for SqlAnywhereError {
    fn from(err: toml::de::Error) -> Self {
        SqlAnywhereError::Config(err.to_string())
    }
}

/// Type alias for Result to use SqlAnywhereError as the error type.
pub type Result<T> = std::result::Result<T, SqlAnywhereError>;
