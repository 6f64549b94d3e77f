//! In-memory native binding.
//!
//! A scriptable stand-in for the vendor client library. Responses are keyed
//! by SQL text, failures are injected per call site, and every native call is
//! recorded so tests can assert on exactly what the driver asked for.

use super::{
    BindType, BufferedResult, ErrorState, NativeClient, NativeResult, NativeSession,
    NativeStatement, RawResult, SessionOption,
};
use crate::core::db::Value;
use crate::core::error::DriverError;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Client version reported by [`MemoryClient::new`].
pub const DEFAULT_CLIENT_VERSION: &str = "17.0.4.2053";

/// One call made against the native layer.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    Connect(String),
    SetOption(SessionOption),
    Query(String),
    Prepare(String),
    Bind {
        position: usize,
        value: Value,
        bind_type: BindType,
        is_null: bool,
    },
    Execute(String),
    Commit,
    Rollback,
    Close,
}

/// Scripted outcome of a query or statement execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryResponse {
    columns: Option<Vec<String>>,
    rows: Vec<Vec<Value>>,
    insert_id: i64,
    affected_rows: i64,
}

impl MemoryResponse {
    /// An acknowledgement without columns.
    pub fn done() -> Self {
        Self::default()
    }

    /// A row set with the given columns and no rows yet.
    pub fn rows(columns: &[&str]) -> Self {
        MemoryResponse {
            columns: Some(columns.iter().map(|c| c.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn row<V: Into<Value>>(mut self, values: Vec<V>) -> Self {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_insert_id(mut self, id: i64) -> Self {
        self.insert_id = id;
        self
    }

    pub fn with_affected_rows(mut self, rows: i64) -> Self {
        self.affected_rows = rows;
        self
    }

    fn affected(&self) -> i64 {
        match self.columns {
            Some(_) => self.rows.len() as i64,
            None => self.affected_rows,
        }
    }

    fn result(&self) -> Option<Box<dyn NativeResult>> {
        self.columns.as_ref().map(|columns| {
            Box::new(BufferedResult::new(columns.clone(), self.rows.clone())) as Box<dyn NativeResult>
        })
    }
}

#[derive(Debug, Default)]
struct Failures {
    connect: Option<DriverError>,
    options: HashMap<SessionOption, DriverError>,
    queries: HashMap<String, DriverError>,
    prepares: HashMap<String, DriverError>,
    binds: HashMap<usize, DriverError>,
    execute: Option<DriverError>,
    commit: Option<DriverError>,
    rollback: Option<DriverError>,
}

#[derive(Debug, Default)]
struct MemoryState {
    calls: Vec<NativeCall>,
    responses: HashMap<String, MemoryResponse>,
    failures: Failures,
    global_error: Option<DriverError>,
    open_sessions: usize,
    connect_count: usize,
    last_connection_string: Option<String>,
    auto_commit: bool,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scriptable native client. Clones of the `Arc` handed to a driver share
/// the same script and call log.
#[derive(Debug)]
pub struct MemoryClient {
    client_version: Option<String>,
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::with_client_version(DEFAULT_CLIENT_VERSION)
    }

    pub fn with_client_version(version: &str) -> Self {
        MemoryClient {
            client_version: Some(version.to_string()),
            state: Arc::default(),
        }
    }

    /// A client whose library is not loaded.
    pub fn unloaded() -> Self {
        MemoryClient {
            client_version: None,
            state: Arc::default(),
        }
    }

    /// Scripts the response for `sql`, used by both direct queries and
    /// prepared executions. Unscripted SQL acknowledges with no rows.
    pub fn on_query(&self, sql: &str, response: MemoryResponse) {
        lock(&self.state).responses.insert(sql.trim().to_string(), response);
    }

    /// Makes the next connects fail, reporting `error` as global state.
    pub fn fail_connect(&self, error: DriverError) {
        lock(&self.state).failures.connect = Some(error);
    }

    /// Makes setting `option` to exactly this value fail.
    pub fn fail_option(&self, option: SessionOption, error: DriverError) {
        lock(&self.state).failures.options.insert(option, error);
    }

    pub fn fail_query(&self, sql: &str, error: DriverError) {
        lock(&self.state).failures.queries.insert(sql.trim().to_string(), error);
    }

    pub fn fail_prepare(&self, sql: &str, error: DriverError) {
        lock(&self.state).failures.prepares.insert(sql.trim().to_string(), error);
    }

    /// Makes binding the 0-based `position` fail on every statement.
    pub fn fail_bind(&self, position: usize, error: DriverError) {
        lock(&self.state).failures.binds.insert(position, error);
    }

    pub fn fail_execute(&self, error: DriverError) {
        lock(&self.state).failures.execute = Some(error);
    }

    pub fn fail_commit(&self, error: DriverError) {
        lock(&self.state).failures.commit = Some(error);
    }

    pub fn fail_rollback(&self, error: DriverError) {
        lock(&self.state).failures.rollback = Some(error);
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failures = Failures::default();
    }

    /// Sets the process-global error state directly.
    pub fn set_global_error(&self, error: Option<DriverError>) {
        lock(&self.state).global_error = error;
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn open_sessions(&self) -> usize {
        lock(&self.state).open_sessions
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.state).connect_count
    }

    pub fn last_connection_string(&self) -> Option<String> {
        lock(&self.state).last_connection_string.clone()
    }

    /// The auto-commit option as last set on any session.
    pub fn auto_commit(&self) -> bool {
        lock(&self.state).auto_commit
    }
}

impl ErrorState for MemoryClient {
    fn error_code(&self) -> i32 {
        lock(&self.state).global_error.as_ref().map_or(0, |e| e.code)
    }

    fn error_message(&self) -> Option<String> {
        lock(&self.state)
            .global_error
            .as_ref()
            .and_then(|e| e.message.clone())
    }

    fn sqlstate(&self) -> Option<String> {
        lock(&self.state)
            .global_error
            .as_ref()
            .map(|e| e.sqlstate.clone())
            .filter(|s| !s.is_empty())
    }
}

impl NativeClient for MemoryClient {
    fn client_info(&self) -> Option<String> {
        self.client_version.clone()
    }

    fn connect(&self, connection_string: &str) -> Option<Box<dyn NativeSession>> {
        let mut state = lock(&self.state);
        state.calls.push(NativeCall::Connect(connection_string.to_string()));
        state.last_connection_string = Some(connection_string.to_string());

        if let Some(error) = state.failures.connect.clone() {
            state.global_error = Some(error);
            return None;
        }

        state.global_error = None;
        state.connect_count += 1;
        state.open_sessions += 1;
        Some(Box::new(MemorySession {
            shared: Rc::new(SessionShared {
                state: self.state.clone(),
                error: RefCell::new(None),
                insert_id: Cell::new(0),
                affected_rows: Cell::new(0),
            }),
        }))
    }
}

/// Session state shared with the statements prepared on it, so their
/// failures surface in the session's SQLSTATE as well.
#[derive(Debug)]
struct SessionShared {
    state: Arc<Mutex<MemoryState>>,
    error: RefCell<Option<DriverError>>,
    insert_id: Cell<i64>,
    affected_rows: Cell<i64>,
}

impl SessionShared {
    fn record(&self, call: NativeCall) -> MutexGuard<'_, MemoryState> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        state
    }

    fn outcome(&self, failure: Option<DriverError>) -> bool {
        let failed = failure.is_some();
        *self.error.borrow_mut() = failure;
        !failed
    }

    fn apply(&self, response: &MemoryResponse) {
        if response.insert_id != 0 {
            self.insert_id.set(response.insert_id);
        }
        self.affected_rows.set(response.affected());
    }
}

#[derive(Debug)]
struct MemorySession {
    shared: Rc<SessionShared>,
}

impl ErrorState for MemorySession {
    fn error_code(&self) -> i32 {
        self.shared.error.borrow().as_ref().map_or(0, |e| e.code)
    }

    fn error_message(&self) -> Option<String> {
        self.shared.error.borrow().as_ref().and_then(|e| e.message.clone())
    }

    fn sqlstate(&self) -> Option<String> {
        self.shared
            .error
            .borrow()
            .as_ref()
            .map(|e| e.sqlstate.clone())
            .filter(|s| !s.is_empty())
    }
}

impl NativeSession for MemorySession {
    fn set_option(&self, option: SessionOption) -> bool {
        let mut state = self.shared.record(NativeCall::SetOption(option));
        let failure = state.failures.options.get(&option).cloned();
        if failure.is_none() {
            if let SessionOption::AutoCommit(on) = option {
                state.auto_commit = on;
            }
        }
        drop(state);
        self.shared.outcome(failure)
    }

    fn query(&self, sql: &str) -> Option<RawResult> {
        let key = sql.trim();
        let state = self.shared.record(NativeCall::Query(sql.to_string()));
        let failure = state.failures.queries.get(key).cloned();
        let response = state.responses.get(key).cloned().unwrap_or_default();
        drop(state);

        if !self.shared.outcome(failure) {
            return None;
        }
        self.shared.apply(&response);
        Some(RawResult::from(response.result()))
    }

    fn prepare(&self, sql: &str) -> Option<Box<dyn NativeStatement>> {
        let state = self.shared.record(NativeCall::Prepare(sql.to_string()));
        let failure = state.failures.prepares.get(sql.trim()).cloned();
        drop(state);

        if !self.shared.outcome(failure) {
            return None;
        }
        Some(Box::new(MemoryStatement {
            session: self.shared.clone(),
            sql: sql.to_string(),
            error: RefCell::new(None),
            last_response: RefCell::new(None),
        }))
    }

    fn commit(&self) -> bool {
        let state = self.shared.record(NativeCall::Commit);
        let failure = state.failures.commit.clone();
        drop(state);
        self.shared.outcome(failure)
    }

    fn rollback(&self) -> bool {
        let state = self.shared.record(NativeCall::Rollback);
        let failure = state.failures.rollback.clone();
        drop(state);
        self.shared.outcome(failure)
    }

    fn insert_id(&self) -> i64 {
        self.shared.insert_id.get()
    }

    fn affected_rows(&self) -> i64 {
        self.shared.affected_rows.get()
    }

    fn close(self: Box<Self>) {
        let mut state = self.shared.record(NativeCall::Close);
        state.open_sessions = state.open_sessions.saturating_sub(1);
    }
}

#[derive(Debug)]
struct MemoryStatement {
    session: Rc<SessionShared>,
    sql: String,
    error: RefCell<Option<DriverError>>,
    last_response: RefCell<Option<MemoryResponse>>,
}

impl MemoryStatement {
    /// Records a failure on the statement and mirrors it into the session.
    fn outcome(&self, failure: Option<DriverError>) -> bool {
        if failure.is_some() {
            *self.session.error.borrow_mut() = failure.clone();
        }
        let failed = failure.is_some();
        *self.error.borrow_mut() = failure;
        !failed
    }
}

impl ErrorState for MemoryStatement {
    fn error_code(&self) -> i32 {
        self.error.borrow().as_ref().map_or(0, |e| e.code)
    }

    fn error_message(&self) -> Option<String> {
        self.error.borrow().as_ref().and_then(|e| e.message.clone())
    }
}

impl NativeStatement for MemoryStatement {
    fn bind_param(&self, position: usize, value: &Value, bind_type: BindType, is_null: bool) -> bool {
        let state = self.session.record(NativeCall::Bind {
            position,
            value: value.clone(),
            bind_type,
            is_null,
        });
        let failure = state.failures.binds.get(&position).cloned();
        drop(state);
        self.outcome(failure)
    }

    fn execute(&self) -> bool {
        let key = self.sql.trim();
        let state = self.session.record(NativeCall::Execute(self.sql.clone()));
        let failure = state.failures.execute.clone();
        let response = state.responses.get(key).cloned().unwrap_or_default();
        drop(state);

        if !self.outcome(failure) {
            return false;
        }
        self.session.apply(&response);
        *self.last_response.borrow_mut() = Some(response);
        true
    }

    fn result_metadata(&self) -> Option<Box<dyn NativeResult>> {
        self.last_response.borrow().as_ref().and_then(MemoryResponse::result)
    }
}
