//! SQLite-backed native binding.
//!
//! Runs the driver protocol against the embedded SQLite engine so the full
//! lifecycle can be exercised on a real database without the vendor client
//! library. `DBN` in the connection string names a database file under the
//! client's root directory.

use super::{
    BindType, BufferedResult, ErrorState, NativeClient, NativeResult, NativeSession,
    NativeStatement, RawResult, SessionOption,
};
use crate::core::db::Value;
use crate::core::error::DriverError;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, ToSql};
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Major version reported to the driver; always speaks the modern dialect.
const CLIENT_MAJOR_VERSION: &str = "17.0.0";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Bytes(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

/// Translates a SQLite failure into native error state.
fn translate(err: &rusqlite::Error) -> DriverError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let sqlstate = match failure.code {
                ErrorCode::ConstraintViolation => "23000",
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => "40001",
                ErrorCode::CannotOpen | ErrorCode::NotADatabase => "08001",
                ErrorCode::PermissionDenied | ErrorCode::ReadOnly => "42501",
                ErrorCode::Unknown => "42000",
                _ => "HY000",
            };
            let message = message.clone().unwrap_or_else(|| failure.to_string());
            DriverError::new(sqlstate, -failure.extended_code, message)
        }
        other => DriverError::new("HY000", -1, other.to_string()),
    }
}

/// Native client over SQLite database files.
#[derive(Debug, Default)]
pub struct SqliteClient {
    root: Option<PathBuf>,
    global_error: Mutex<Option<DriverError>>,
}

impl SqliteClient {
    /// Databases live in `root` as `<DBN>.db`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SqliteClient {
            root: Some(root.into()),
            global_error: Mutex::new(None),
        }
    }

    /// Every session gets its own private in-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    fn set_global_error(&self, error: Option<DriverError>) {
        *self.global_error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn global_error(&self) -> Option<DriverError> {
        self.global_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn open(&self, connection_string: &str) -> rusqlite::Result<Connection> {
        let database = connection_string
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("DBN"))
            .map(|(_, value)| value.trim().to_string());

        match (&self.root, database) {
            (Some(root), Some(database)) => Connection::open(root.join(format!("{}.db", database))),
            _ => Connection::open_in_memory(),
        }
    }
}

impl ErrorState for SqliteClient {
    fn error_code(&self) -> i32 {
        self.global_error().map_or(0, |e| e.code)
    }

    fn error_message(&self) -> Option<String> {
        self.global_error().and_then(|e| e.message)
    }

    fn sqlstate(&self) -> Option<String> {
        self.global_error().map(|e| e.sqlstate)
    }
}

impl NativeClient for SqliteClient {
    fn client_info(&self) -> Option<String> {
        Some(format!("{} (SQLite {})", CLIENT_MAJOR_VERSION, rusqlite::version()))
    }

    fn connect(&self, connection_string: &str) -> Option<Box<dyn NativeSession>> {
        match self.open(connection_string) {
            Ok(conn) => {
                self.set_global_error(None);
                debug!(in_memory = self.root.is_none(), "sqlite session opened");
                Some(Box::new(SqliteSession {
                    shared: Rc::new(SessionShared {
                        conn,
                        error: RefCell::new(None),
                        auto_commit: Cell::new(true),
                        affected_rows: Cell::new(0),
                    }),
                }))
            }
            Err(err) => {
                let error = translate(&err);
                warn!(error = %error, "sqlite open failed");
                self.set_global_error(Some(error));
                None
            }
        }
    }
}

/// State of one session, shared with the statements prepared on it.
struct SessionShared {
    conn: Connection,
    error: RefCell<Option<DriverError>>,
    auto_commit: Cell<bool>,
    affected_rows: Cell<i64>,
}

impl SessionShared {
    /// Runs `sql` with positional `params`, opening an implicit transaction
    /// first when auto-commit is off.
    fn run(&self, sql: &str, params: &[Value]) -> rusqlite::Result<Option<BufferedResult>> {
        if !self.auto_commit.get() && self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }

        let mut stmt = self.conn.prepare_cached(sql)?;
        let column_count = stmt.column_count();
        if column_count == 0 {
            let changed = stmt.execute(params_from_iter(params.iter()))?;
            self.affected_rows.set(changed as i64);
            return Ok(None);
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut data = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            data.push(values);
        }
        self.affected_rows.set(data.len() as i64);
        Ok(Some(BufferedResult::new(columns, data)))
    }

    fn end_transaction(&self, sql: &str) -> bool {
        if self.conn.is_autocommit() {
            return self.record(Ok(()));
        }
        self.record(self.conn.execute_batch(sql))
    }

    fn record<T>(&self, outcome: rusqlite::Result<T>) -> bool {
        match outcome {
            Ok(_) => {
                *self.error.borrow_mut() = None;
                true
            }
            Err(err) => {
                *self.error.borrow_mut() = Some(translate(&err));
                false
            }
        }
    }
}

struct SqliteSession {
    shared: Rc<SessionShared>,
}

impl ErrorState for SqliteSession {
    fn error_code(&self) -> i32 {
        self.shared.error.borrow().as_ref().map_or(0, |e| e.code)
    }

    fn error_message(&self) -> Option<String> {
        self.shared.error.borrow().as_ref().and_then(|e| e.message.clone())
    }

    fn sqlstate(&self) -> Option<String> {
        self.shared.error.borrow().as_ref().map(|e| e.sqlstate.clone())
    }
}

impl NativeSession for SqliteSession {
    fn set_option(&self, option: SessionOption) -> bool {
        if let SessionOption::AutoCommit(on) = option {
            self.shared.auto_commit.set(on);
        }
        self.shared.record(Ok(()))
    }

    fn query(&self, sql: &str) -> Option<RawResult> {
        match self.shared.run(sql, &[]) {
            Ok(rows) => {
                self.shared.record(Ok(()));
                Some(RawResult::from(rows.map(|r| Box::new(r) as Box<dyn NativeResult>)))
            }
            Err(err) => {
                self.shared.record::<()>(Err(err));
                None
            }
        }
    }

    fn prepare(&self, sql: &str) -> Option<Box<dyn NativeStatement>> {
        let checked = self.shared.conn.prepare_cached(sql).map(|_| ());
        if !self.shared.record(checked) {
            return None;
        }
        Some(Box::new(SqliteStatement {
            session: self.shared.clone(),
            sql: sql.to_string(),
            params: RefCell::new(Vec::new()),
            error: RefCell::new(None),
            result: RefCell::new(None),
        }))
    }

    fn commit(&self) -> bool {
        self.shared.end_transaction("COMMIT")
    }

    fn rollback(&self) -> bool {
        self.shared.end_transaction("ROLLBACK")
    }

    fn insert_id(&self) -> i64 {
        self.shared.conn.last_insert_rowid()
    }

    fn affected_rows(&self) -> i64 {
        self.shared.affected_rows.get()
    }

    fn close(self: Box<Self>) {
        debug!("sqlite session closed");
    }
}

struct SqliteStatement {
    session: Rc<SessionShared>,
    sql: String,
    params: RefCell<Vec<Value>>,
    error: RefCell<Option<DriverError>>,
    result: RefCell<Option<BufferedResult>>,
}

impl SqliteStatement {
    /// Records a failure on the statement and mirrors it into the session.
    fn fail(&self, error: DriverError) -> bool {
        *self.session.error.borrow_mut() = Some(error.clone());
        *self.error.borrow_mut() = Some(error);
        false
    }
}

impl ErrorState for SqliteStatement {
    fn error_code(&self) -> i32 {
        self.error.borrow().as_ref().map_or(0, |e| e.code)
    }

    fn error_message(&self) -> Option<String> {
        self.error.borrow().as_ref().and_then(|e| e.message.clone())
    }
}

impl NativeStatement for SqliteStatement {
    fn bind_param(&self, position: usize, value: &Value, bind_type: BindType, is_null: bool) -> bool {
        if bind_type != BindType::infer(value) {
            return self.fail(DriverError::new(
                "07006",
                -157,
                format!("Cannot bind {} as type '{}'", value, bind_type.tag()),
            ));
        }
        let mut params = self.params.borrow_mut();
        if params.len() <= position {
            params.resize(position + 1, Value::Null);
        }
        params[position] = if is_null { Value::Null } else { value.clone() };
        *self.error.borrow_mut() = None;
        true
    }

    fn execute(&self) -> bool {
        let params = self.params.borrow();
        match self.session.run(&self.sql, &params) {
            Ok(rows) => {
                *self.result.borrow_mut() = rows;
                *self.error.borrow_mut() = None;
                true
            }
            Err(err) => self.fail(translate(&err)),
        }
    }

    fn result_metadata(&self) -> Option<Box<dyn NativeResult>> {
        self.result
            .borrow_mut()
            .take()
            .map(|rows| Box::new(rows) as Box<dyn NativeResult>)
    }
}
