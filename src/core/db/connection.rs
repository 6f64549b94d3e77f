//! Connection Management Module
//!
//! Owns the native session handle, applies the mandatory session options,
//! and drives the transaction lifecycle.

use crate::core::db::params::is_legacy_client;
use crate::core::db::{ConnectionParameters, Driver, ResultSet, Row, Statement, StatementSource, Value};
use crate::core::error::{DriverError, Result, SqlAnywhereError};
use crate::core::native::{NativeSession, RawResult, SessionOption};
use crate::profiler::SharedProfiler;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{debug, info, warn};

/// Options applied, in order, to every new session.
pub const SESSION_OPTIONS: [SessionOption; 3] = [
    SessionOption::VerboseErrors(false),
    SessionOption::AutoCommit(true),
    SessionOption::RowCounts(true),
];

const CURRENT_SCHEMA_SQL: &str = "SELECT DB_NAME()";

/// Sequence names accepted by `last_generated_value`, optionally owner-qualified.
static SEQUENCE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#@]*(\.[A-Za-z_][A-Za-z0-9_$#@]*)?$")
        .expect("sequence name pattern is valid")
});

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No active transaction (autocommit mode)
    #[default]
    Autocommit,
    /// Auto-commit is off until the next commit or rollback
    Transaction,
}

/// A logical session with the database.
///
/// Either disconnected (no handle) or connected (exactly one live handle).
/// Operations that need a session connect on demand.
pub struct Connection {
    parameters: ConnectionParameters,
    driver: Option<Driver>,
    resource: Option<Box<dyn NativeSession>>,
    profiler: Option<SharedProfiler>,
    transaction_state: TransactionState,
}

impl Connection {
    /// Creates a disconnected connection. It needs a driver before it can
    /// connect; see [`Driver::connection`].
    pub fn new(parameters: ConnectionParameters) -> Self {
        Connection {
            parameters,
            driver: None,
            resource: None,
            profiler: None,
            transaction_state: TransactionState::default(),
        }
    }

    /// Adopts an already open native session.
    pub fn from_session(session: Box<dyn NativeSession>) -> Self {
        let mut connection = Connection::new(ConnectionParameters::default());
        connection.resource = Some(session);
        connection
    }

    pub fn set_driver(&mut self, driver: Driver) -> &mut Self {
        self.driver = Some(driver);
        self
    }

    pub fn driver(&self) -> Option<&Driver> {
        self.driver.as_ref()
    }

    pub fn parameters(&self) -> &ConnectionParameters {
        &self.parameters
    }

    /// The live native session, if connected.
    pub fn resource(&self) -> Option<&dyn NativeSession> {
        self.resource.as_deref()
    }

    pub fn profiler(&self) -> Option<&SharedProfiler> {
        self.profiler.as_ref()
    }

    pub fn set_profiler(&mut self, profiler: SharedProfiler) -> &mut Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction_state
    }

    pub fn is_connected(&self) -> bool {
        self.resource.is_some()
    }

    /// Opens the native session. A no-op when already connected.
    ///
    /// # Errors
    ///
    /// `Runtime` when no driver is set, `Connection` when the session cannot
    /// be opened or a mandatory session option cannot be applied. A session
    /// whose options failed is closed again.
    pub fn connect(&mut self) -> Result<()> {
        if self.resource.is_some() {
            return Ok(());
        }

        let driver = self.driver.as_ref().ok_or_else(missing_driver)?;
        let legacy = is_legacy_client(driver.int_client_version());
        let connection_string = self.parameters.connection_string(legacy);

        let session = match driver.native().connect(&connection_string) {
            Some(session) => session,
            None => {
                let err = DriverError::from_native(Some(driver.native()), None, None);
                warn!(error = %err, "failed to open session");
                return Err(SqlAnywhereError::Connection(err));
            }
        };

        for option in SESSION_OPTIONS {
            if !session.set_option(option) {
                let err = DriverError::from_native(Some(driver.native()), Some(session.as_ref()), None);
                warn!(%option, error = %err, "failed to apply session option");
                session.close();
                return Err(SqlAnywhereError::Connection(err));
            }
        }

        info!(
            server = self.parameters.servername.as_deref().unwrap_or(""),
            database = self.parameters.databasename.as_deref().unwrap_or(""),
            legacy,
            "connected"
        );
        self.resource = Some(session);
        self.transaction_state = TransactionState::Autocommit;
        Ok(())
    }

    /// Closes the native session. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.resource.take() {
            session.close();
            self.transaction_state = TransactionState::Autocommit;
            info!("disconnected");
        }
    }

    /// Runs `sql` directly, without preparing it.
    pub fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        self.connect()?;
        let driver = self.driver.as_ref().ok_or_else(missing_driver)?;
        let session = self.live_session()?;

        debug!(sql, "execute");
        if let Some(profiler) = &self.profiler {
            profiler.profiler_start(sql, None);
        }
        let resource = session.query(sql);
        if let Some(profiler) = &self.profiler {
            profiler.profiler_finish();
        }

        match resource {
            Some(resource) => Ok(driver.create_result(Some(session), resource)),
            None => Err(SqlAnywhereError::Execute(self.native_error())),
        }
    }

    /// Creates a statement for `sql` bound to this connection's session.
    pub fn prepare(&mut self, sql: &str) -> Result<Statement<'_>> {
        self.connect()?;
        let driver = self.driver.clone().ok_or_else(missing_driver)?;
        driver.create_statement(self, StatementSource::Sql(sql.to_string()))
    }

    /// Turns auto-commit off until the next commit or rollback.
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.connect()?;
        if !self.live_session()?.set_option(SessionOption::AutoCommit(false)) {
            return Err(SqlAnywhereError::Transaction(self.native_error()));
        }
        self.transaction_state = TransactionState::Transaction;
        debug!("transaction started");
        Ok(())
    }

    /// Commits and turns auto-commit back on.
    pub fn commit(&mut self) -> Result<()> {
        self.connect()?;
        if !self.live_session()?.commit() {
            return Err(SqlAnywhereError::Transaction(self.native_error()));
        }
        self.end_transaction()?;
        debug!("transaction committed");
        Ok(())
    }

    /// Rolls back and turns auto-commit back on.
    ///
    /// # Errors
    ///
    /// `Transaction` when not connected: there is nothing to roll back.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Err(SqlAnywhereError::Transaction(DriverError::runtime(
                "Must be connected before you can rollback.",
            )));
        }
        if !self.live_session()?.rollback() {
            return Err(SqlAnywhereError::Transaction(self.native_error()));
        }
        self.end_transaction()?;
        debug!("transaction rolled back");
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<()> {
        if !self.live_session()?.set_option(SessionOption::AutoCommit(true)) {
            return Err(SqlAnywhereError::Transaction(self.native_error()));
        }
        self.transaction_state = TransactionState::Autocommit;
        Ok(())
    }

    /// Last generated identifier.
    ///
    /// Without a name this is the session's last identity value. With a name
    /// it is the current value of that sequence.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `name` is not an identifier or `owner.identifier`
    /// (it is spliced into SQL), `Query` when the sequence query fails or returns no row.
    pub fn last_generated_value(&mut self, name: Option<&str>) -> Result<Value> {
        self.connect()?;
        let session = self.live_session()?;

        let Some(name) = name else {
            return Ok(Value::Int(session.insert_id()));
        };

        if !SEQUENCE_NAME.is_match(name) {
            return Err(SqlAnywhereError::InvalidArgument(format!(
                "'{}' is not a valid sequence name",
                name
            )));
        }

        let sql = format!("SELECT {}.CURRVAL AS Current_Identity", name);
        let row = self.fetch_first_row(&sql)?;
        row.get("Current_Identity")
            .or_else(|| row.get_index(0))
            .cloned()
            .ok_or_else(|| SqlAnywhereError::Query(self.native_error()))
    }

    /// Name of the database this session is attached to.
    pub fn current_schema(&mut self) -> Result<String> {
        self.connect()?;
        let row = self.fetch_first_row(CURRENT_SCHEMA_SQL)?;
        match row.get_index(0) {
            Some(Value::Text(name)) => Ok(name.clone()),
            Some(Value::Null) | None => Err(SqlAnywhereError::Query(self.native_error())),
            Some(other) => Ok(other.to_string()),
        }
    }

    fn fetch_first_row(&self, sql: &str) -> Result<Row> {
        let session = self.live_session()?;
        let mut rows = match session.query(sql) {
            Some(RawResult::Rows(rows)) => rows,
            _ => return Err(SqlAnywhereError::Query(self.native_error())),
        };
        rows.fetch_assoc()
            .ok_or_else(|| SqlAnywhereError::Query(self.native_error()))
    }

    fn live_session(&self) -> Result<&dyn NativeSession> {
        self.resource
            .as_deref()
            .ok_or_else(|| SqlAnywhereError::Runtime("Connection is not connected".to_string()))
    }

    /// Translates the session's error state, falling back to the client's.
    fn native_error(&self) -> DriverError {
        DriverError::from_native(
            self.driver.as_ref().map(|d| d.native()),
            self.resource.as_deref(),
            None,
        )
    }
}

fn missing_driver() -> SqlAnywhereError {
    SqlAnywhereError::Runtime("Connection is missing an instance of Driver".to_string())
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("parameters", &self.parameters)
            .field("connected", &self.is_connected())
            .field("transaction_state", &self.transaction_state)
            .finish()
    }
}
