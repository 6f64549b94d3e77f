//! Driver Module
//!
//! The driver wires connections, statements and results to one native
//! client and describes its capabilities to the consuming layer.

use crate::core::db::{Connection, ConnectionParameters, ResultSet, Statement, Value};
use crate::core::error::{Result, SqlAnywhereError};
use crate::core::native::{NativeClient, NativeHandle, NativeSession, RawResult};
use crate::profiler::SharedProfiler;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Key identifying this driver among others in a multi-driver adapter.
pub const DRIVER_NAME: &str = "sqlanywhere";

/// Placeholder style of prepared SQL. The native client only binds by
/// ordinal position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameterization {
    /// `?` markers bound by ordinal position
    Positional,
}

/// Spelling of the platform name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameFormat {
    /// `SqlAnywhere`
    CamelCase,
    /// `SQLAnywhere`
    Natural,
}

/// What a statement is created from.
pub enum StatementSource<'conn> {
    /// Nothing yet; SQL is supplied later through `set_sql` or `prepare`
    Empty,
    Sql(String),
    /// A native resource to initialize the statement directly against
    Handle(NativeHandle<'conn>),
}

impl From<&str> for StatementSource<'_> {
    fn from(sql: &str) -> Self {
        StatementSource::Sql(sql.to_string())
    }
}

impl From<String> for StatementSource<'_> {
    fn from(sql: String) -> Self {
        StatementSource::Sql(sql)
    }
}

/// Factory for connections, statements and results over one native client.
///
/// Cloning is cheap; every clone talks to the same native client.
#[derive(Clone)]
pub struct Driver {
    native: Arc<dyn NativeClient>,
    extension_loaded: bool,
    profiler: Option<SharedProfiler>,
}

impl Driver {
    pub fn new(native: Arc<dyn NativeClient>) -> Self {
        let extension_loaded = native.is_loaded();
        Driver {
            native,
            extension_loaded,
            profiler: None,
        }
    }

    pub fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    /// Whether `name` selects this driver. Case-insensitive.
    pub fn matches_name(name: &str) -> bool {
        name.eq_ignore_ascii_case(DRIVER_NAME)
    }

    pub fn native(&self) -> &dyn NativeClient {
        self.native.as_ref()
    }

    pub fn platform_name(&self, format: NameFormat) -> &'static str {
        match format {
            NameFormat::CamelCase => "SqlAnywhere",
            NameFormat::Natural => "SQLAnywhere",
        }
    }

    pub fn prepare_type(&self) -> Parameterization {
        Parameterization::Positional
    }

    /// Placeholder for a parameter. Names are not supported, so it is always `?`.
    pub fn format_parameter_name(&self, _name: &str) -> String {
        "?".to_string()
    }

    pub fn profiler(&self) -> Option<&SharedProfiler> {
        self.profiler.as_ref()
    }

    /// Sets the profiler handed to every connection and statement created
    /// from now on.
    pub fn set_profiler(&mut self, profiler: SharedProfiler) -> &mut Self {
        self.profiler = Some(profiler);
        self
    }

    /// Fails when the native client library is not loaded.
    pub fn check_environment(&self) -> Result<()> {
        if !self.extension_loaded {
            return Err(SqlAnywhereError::Environment(
                "The SQL Anywhere client library is required for this driver but it is not loaded"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Major version of the native client, 0 when it is not loaded.
    pub fn int_client_version(&self) -> i32 {
        if !self.extension_loaded {
            return 0;
        }
        self.native
            .client_info()
            .map(|info| leading_int(&info))
            .unwrap_or(0)
    }

    /// Creates a connection wired back to this driver.
    pub fn connection(&self, parameters: ConnectionParameters) -> Connection {
        let mut connection = Connection::new(parameters);
        connection.set_driver(self.clone());
        if let Some(profiler) = &self.profiler {
            connection.set_profiler(profiler.clone());
        }
        connection
    }

    /// Creates a statement on `connection`.
    ///
    /// A native handle initializes the statement directly. Anything else
    /// connects first and binds the statement to the live session.
    pub fn create_statement<'conn>(
        &self,
        connection: &'conn mut Connection,
        source: StatementSource<'conn>,
    ) -> Result<Statement<'conn>> {
        let mut statement = Statement::new(self.clone());
        if let Some(profiler) = &self.profiler {
            statement.set_profiler(profiler.clone());
        }

        match source {
            StatementSource::Handle(handle) => {
                let connection: &'conn Connection = connection;
                statement.initialize(handle)?;
                if let Some(session) = connection.resource() {
                    statement.attach_session(session);
                }
            }
            source => {
                connection.connect()?;
                let connection: &'conn Connection = connection;
                let session = connection.resource().ok_or_else(|| {
                    SqlAnywhereError::Runtime("Connection has no live session".to_string())
                })?;
                statement.initialize(NativeHandle::Session(session))?;
                if let StatementSource::Sql(sql) = source {
                    statement.set_sql(sql)?;
                }
            }
        }
        Ok(statement)
    }

    /// Wraps a raw native result, capturing affected rows and the generated
    /// identifier once. Without a session both fall back to "none".
    pub fn create_result(&self, session: Option<&dyn NativeSession>, resource: RawResult) -> ResultSet {
        let affected_rows = match &resource {
            RawResult::Done => session.map_or(0, |s| s.affected_rows()),
            RawResult::Rows(rows) => rows.num_rows(),
        };
        let generated_value = match session.map_or(0, |s| s.insert_id()) {
            0 => None,
            id => Some(Value::Int(id)),
        };
        debug!(affected_rows, ?generated_value, "result created");
        ResultSet::new(resource, affected_rows, generated_value)
    }

    /// Last generated identity on `connection`.
    pub fn last_generated_value(&self, connection: &mut Connection) -> Result<Value> {
        connection.last_generated_value(None)
    }
}

/// Leading integer component of a version string, 0 when there is none.
fn leading_int(version: &str) -> i32 {
    let digits: String = version
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("name", &DRIVER_NAME)
            .field("extension_loaded", &self.extension_loaded)
            .field("profiler", &self.profiler.is_some())
            .finish()
    }
}
