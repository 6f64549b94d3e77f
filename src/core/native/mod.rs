//! Native Binding Layer
//!
//! The driver talks to the vendor client library only through the traits in
//! this module. Calls report success as `bool`/`Option` the way the client
//! library does, and the details of a failure are read back afterwards
//! through [`ErrorState`] on the object that failed.
//!
//! Two bindings ship with the crate:
//! - [`memory::MemoryClient`]: scriptable, records every call
//! - [`sqlite::SqliteClient`]: backed by the embedded SQLite engine

pub mod memory;
pub mod sqlite;

use crate::core::db::{Row, Value};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Last-error accessors shared by every native object.
pub trait ErrorState {
    /// Native code of the last failed call, 0 when none.
    fn error_code(&self) -> i32;

    /// Native text of the last failed call.
    fn error_message(&self) -> Option<String>;

    /// SQLSTATE of the last failed call. Statements do not carry one.
    fn sqlstate(&self) -> Option<String> {
        None
    }
}

/// Entry point of a native client library.
///
/// Its [`ErrorState`] is the process-global error state, consulted only when
/// no session or statement can explain a failure.
pub trait NativeClient: ErrorState + Send + Sync {
    /// Version string of the client library, `None` when it is not loaded.
    fn client_info(&self) -> Option<String>;

    fn is_loaded(&self) -> bool {
        self.client_info().is_some()
    }

    /// Opens a session from a `KEY=value;...` connection string.
    fn connect(&self, connection_string: &str) -> Option<Box<dyn NativeSession>>;
}

/// An open native session.
pub trait NativeSession: ErrorState {
    fn set_option(&self, option: SessionOption) -> bool;

    /// Runs SQL directly without preparing it.
    fn query(&self, sql: &str) -> Option<RawResult>;

    fn prepare(&self, sql: &str) -> Option<Box<dyn NativeStatement>>;

    fn commit(&self) -> bool;

    fn rollback(&self) -> bool;

    /// Last identity value generated on this session, 0 when none.
    fn insert_id(&self) -> i64;

    /// Rows touched by the last data-modifying statement.
    fn affected_rows(&self) -> i64;

    /// Releases the session.
    fn close(self: Box<Self>);
}

/// A prepared native statement.
pub trait NativeStatement: ErrorState {
    /// Binds a value to the 0-based `position`.
    fn bind_param(&self, position: usize, value: &Value, bind_type: BindType, is_null: bool)
        -> bool;

    fn execute(&self) -> bool;

    /// The row set produced by the last execution, `None` for statements
    /// that produce no columns.
    fn result_metadata(&self) -> Option<Box<dyn NativeResult>>;
}

/// A native row set.
pub trait NativeResult {
    /// Fetches the next row as a column-name mapping.
    fn fetch_assoc(&mut self) -> Option<Row>;

    /// Number of rows in the set. Exact only while the `row_counts` session
    /// option is on; otherwise the client may return a negative estimate.
    fn num_rows(&self) -> i64;

    fn num_fields(&self) -> usize;
}

/// Session options understood by the client library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionOption {
    /// Surface native warnings on every error
    VerboseErrors(bool),
    /// Commit after every statement
    AutoCommit(bool),
    /// Compute exact row counts instead of estimates
    RowCounts(bool),
}

impl SessionOption {
    /// Native option name.
    pub fn name(&self) -> &'static str {
        match self {
            SessionOption::VerboseErrors(_) => "verbose_errors",
            SessionOption::AutoCommit(_) => "auto_commit",
            SessionOption::RowCounts(_) => "row_counts",
        }
    }

    pub fn enabled(&self) -> bool {
        match *self {
            SessionOption::VerboseErrors(on)
            | SessionOption::AutoCommit(on)
            | SessionOption::RowCounts(on) => on,
        }
    }
}

impl fmt::Display for SessionOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.enabled() { "on" } else { "off" };
        write!(f, "{}={}", self.name(), value)
    }
}

/// Wire type tag passed with every bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindType {
    /// String
    S,
    /// Integer
    I,
    /// Double
    D,
    /// Binary, also used for NULL and anything unrecognised
    B,
}

impl BindType {
    /// Infers the tag from a value's variant.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Text(_) => BindType::S,
            Value::Int(_) => BindType::I,
            Value::Float(_) => BindType::D,
            Value::Null | Value::Bool(_) | Value::Bytes(_) => BindType::B,
        }
    }

    pub fn tag(&self) -> char {
        match self {
            BindType::S => 's',
            BindType::I => 'i',
            BindType::D => 'd',
            BindType::B => 'b',
        }
    }
}

/// What a native execution hands back: a bare acknowledgement for
/// statements without columns, or a row set.
pub enum RawResult {
    Done,
    Rows(Box<dyn NativeResult>),
}

impl RawResult {
    pub fn is_rows(&self) -> bool {
        matches!(self, RawResult::Rows(_))
    }
}

impl From<Option<Box<dyn NativeResult>>> for RawResult {
    fn from(result: Option<Box<dyn NativeResult>>) -> Self {
        match result {
            Some(rows) => RawResult::Rows(rows),
            None => RawResult::Done,
        }
    }
}

impl fmt::Debug for RawResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawResult::Done => f.write_str("Done"),
            RawResult::Rows(r) => f
                .debug_struct("Rows")
                .field("num_rows", &r.num_rows())
                .field("num_fields", &r.num_fields())
                .finish(),
        }
    }
}

/// Any native resource a statement may be initialized from.
pub enum NativeHandle<'conn> {
    /// A live session; the statement is not prepared yet
    Session(&'conn dyn NativeSession),
    /// An already prepared statement
    Statement(Box<dyn NativeStatement>),
    /// A row set, which is never a valid statement resource
    Result(Box<dyn NativeResult>),
}

impl NativeHandle<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            NativeHandle::Session(_) => "session",
            NativeHandle::Statement(_) => "statement",
            NativeHandle::Result(_) => "result",
        }
    }
}

/// A fully materialised row set.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedResult {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
    total: usize,
}

impl BufferedResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let total = rows.len();
        BufferedResult {
            columns,
            rows: rows.into(),
            total,
        }
    }
}

impl NativeResult for BufferedResult {
    fn fetch_assoc(&mut self) -> Option<Row> {
        let values = self.rows.pop_front()?;
        Some(Row::new(self.columns.clone(), values))
    }

    fn num_rows(&self) -> i64 {
        self.total as i64
    }

    fn num_fields(&self) -> usize {
        self.columns.len()
    }
}
