//! Statement Module
//!
//! Prepared execution: one-shot prepare, positional binding with inferred
//! wire types, and execution into a [`ResultSet`].

use crate::core::db::{Driver, ResultSet, Value};
use crate::core::error::{DriverError, Result, SqlAnywhereError};
use crate::core::native::{BindType, NativeHandle, NativeSession, NativeStatement, RawResult};
use crate::profiler::SharedProfiler;
use std::fmt;
use tracing::{debug, trace, warn};

/// Ordered statement parameters. Entries may carry a name, but binding is
/// always by position in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterContainer {
    entries: Vec<(Option<String>, Value)>,
}

impl ParameterContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an unnamed value.
    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        self.entries.push((None, value.into()));
        self
    }

    /// Replaces the value stored under `name`, or appends it.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.as_deref() == Some(name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((Some(name.to_string()), value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key.as_deref() == Some(name))
            .map(|(_, value)| value)
    }

    /// Replaces every entry with the given unnamed values.
    pub fn set_from_values<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.entries = values.into_iter().map(|v| (None, v.into())).collect();
        self
    }

    /// Values in binding order.
    pub fn positional(&self) -> impl Iterator<Item = &Value> + '_ {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Value>> for ParameterContainer {
    fn from(values: Vec<Value>) -> Self {
        let mut container = ParameterContainer::new();
        container.set_from_values(values);
        container
    }
}

/// Parameters accepted by [`Statement::execute_with`].
#[derive(Debug, Clone, PartialEq)]
pub enum Parameters {
    Container(ParameterContainer),
    /// Raw ordered values, folded into a container before binding
    Values(Vec<Value>),
}

impl From<ParameterContainer> for Parameters {
    fn from(container: ParameterContainer) -> Self {
        Parameters::Container(container)
    }
}

impl From<Vec<Value>> for Parameters {
    fn from(values: Vec<Value>) -> Self {
        Parameters::Values(values)
    }
}

impl From<Parameters> for ParameterContainer {
    fn from(parameters: Parameters) -> Self {
        match parameters {
            Parameters::Container(container) => container,
            Parameters::Values(values) => ParameterContainer::from(values),
        }
    }
}

/// A SQL command run against a session borrowed from its [`Connection`].
///
/// Prepare happens at most once. After it, the SQL text is fixed.
///
/// [`Connection`]: crate::core::db::Connection
pub struct Statement<'conn> {
    driver: Driver,
    session: Option<&'conn dyn NativeSession>,
    resource: Option<Box<dyn NativeStatement>>,
    sql: String,
    parameter_container: Option<ParameterContainer>,
    profiler: Option<SharedProfiler>,
}

impl<'conn> Statement<'conn> {
    pub fn new(driver: Driver) -> Self {
        Statement {
            driver,
            session: None,
            resource: None,
            sql: String::new(),
            parameter_container: None,
            profiler: None,
        }
    }

    /// Binds the statement to a native resource.
    ///
    /// A session leaves the statement unprepared; a prepared native statement
    /// is adopted as is. A row set is rejected.
    pub fn initialize(&mut self, handle: NativeHandle<'conn>) -> Result<&mut Self> {
        match handle {
            NativeHandle::Session(session) => {
                self.session = Some(session);
            }
            NativeHandle::Statement(statement) => {
                self.resource = Some(statement);
            }
            NativeHandle::Result(_) => {
                return Err(SqlAnywhereError::InvalidArgument(
                    "Invalid statement resource: expected a session or a prepared statement, got a result"
                        .to_string(),
                ));
            }
        }
        Ok(self)
    }

    /// Session used for prepare and for result metadata.
    pub fn attach_session(&mut self, session: &'conn dyn NativeSession) -> &mut Self {
        self.session = Some(session);
        self
    }

    pub fn set_sql(&mut self, sql: impl Into<String>) -> Result<&mut Self> {
        if self.is_prepared() {
            return Err(SqlAnywhereError::Runtime(
                "The SQL of a prepared statement cannot be changed".to_string(),
            ));
        }
        self.sql = sql.into();
        Ok(self)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_container(&self) -> Option<&ParameterContainer> {
        self.parameter_container.as_ref()
    }

    pub fn set_parameter_container(&mut self, container: ParameterContainer) -> &mut Self {
        self.parameter_container = Some(container);
        self
    }

    /// The native prepared handle, once prepared.
    pub fn resource(&self) -> Option<&dyn NativeStatement> {
        self.resource.as_deref()
    }

    pub fn is_prepared(&self) -> bool {
        self.resource.is_some()
    }

    pub fn set_profiler(&mut self, profiler: SharedProfiler) -> &mut Self {
        self.profiler = Some(profiler);
        self
    }

    /// Prepares `sql`, or the stored SQL when `None`. The stored SQL is
    /// replaced only once the native prepare succeeds.
    ///
    /// # Errors
    ///
    /// `Runtime` when already prepared or when no session is attached,
    /// `Prepare` when the native prepare fails.
    pub fn prepare(&mut self, sql: Option<&str>) -> Result<&mut Self> {
        if self.is_prepared() {
            return Err(SqlAnywhereError::Runtime(
                "This statement has already been prepared".to_string(),
            ));
        }
        let session = self.session.ok_or_else(|| {
            SqlAnywhereError::Runtime("Statement has no session to prepare against".to_string())
        })?;
        let sql = sql.unwrap_or(self.sql.as_str()).to_string();

        debug!(sql = %sql, "prepare");
        match session.prepare(&sql) {
            Some(statement) => {
                self.sql = sql;
                self.resource = Some(statement);
                Ok(self)
            }
            None => {
                let err = DriverError::from_native(Some(self.driver.native()), Some(session), None);
                warn!(sql = %sql, error = %err, "prepare failed");
                Err(SqlAnywhereError::Prepare(err))
            }
        }
    }

    /// Executes with the stored parameter container, if any.
    ///
    /// An unprepared statement is prepared first, inside the profiled span.
    pub fn execute(&mut self) -> Result<ResultSet> {
        if let Some(profiler) = &self.profiler {
            profiler.profiler_start(&self.sql, self.parameter_container.as_ref());
        }
        let outcome = self.prepare_and_execute();
        if let Some(profiler) = &self.profiler {
            profiler.profiler_finish();
        }
        outcome
    }

    /// Replaces the stored parameters and executes.
    pub fn execute_with(&mut self, parameters: impl Into<Parameters>) -> Result<ResultSet> {
        self.parameter_container = Some(ParameterContainer::from(parameters.into()));
        self.execute()
    }

    fn prepare_and_execute(&mut self) -> Result<ResultSet> {
        if !self.is_prepared() {
            self.prepare(None)?;
        }
        self.bind_and_execute()
    }

    fn bind_and_execute(&self) -> Result<ResultSet> {
        let statement = self.resource.as_deref().ok_or_else(|| {
            SqlAnywhereError::Runtime("Statement is not prepared".to_string())
        })?;

        if let Some(container) = &self.parameter_container {
            for (position, value) in container.positional().enumerate() {
                let bind_type = BindType::infer(value);
                let is_null = value.is_null();
                trace!(position, bind_type = %bind_type.tag(), is_null, "bind");
                if !statement.bind_param(position, value, bind_type, is_null) {
                    let source = self.native_error(statement);
                    warn!(position, error = %source, "bind failed");
                    return Err(SqlAnywhereError::Bind { position, source });
                }
            }
        }

        debug!(sql = %self.sql, "execute");
        if !statement.execute() {
            let err = self.native_error(statement);
            warn!(sql = %self.sql, error = %err, "execute failed");
            return Err(SqlAnywhereError::Execute(err));
        }

        let raw = RawResult::from(statement.result_metadata());
        Ok(self.driver.create_result(self.session, raw))
    }

    fn native_error(&self, statement: &dyn NativeStatement) -> DriverError {
        DriverError::from_native(Some(self.driver.native()), self.session, Some(statement))
    }
}

impl fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("prepared", &self.is_prepared())
            .field("parameters", &self.parameter_container)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::ConnectionParameters;
    use crate::core::native::memory::{MemoryClient, MemoryResponse, NativeCall};
    use crate::core::native::{BufferedResult, NativeClient, NativeSession};
    use crate::profiler::QueryProfiler;
    use std::sync::Arc;

    #[test]
    fn test_parameter_container() {
        let mut params = ParameterContainer::new();
        params.push(1).set("name", "alice").set("name", "bob").push(Value::Null);
        assert_eq!(params.count(), 3);
        assert_eq!(params.get("name"), Some(&Value::from("bob")));
        assert_eq!(params.get("missing"), None);
        let values: Vec<&Value> = params.positional().collect();
        assert_eq!(values, vec![&Value::Int(1), &Value::from("bob"), &Value::Null]);

        params.set_from_values(vec![2.5]);
        assert_eq!(params.count(), 1);
        assert!(params.get("name").is_none());
        assert!(!params.is_empty());
    }

    #[test]
    fn test_result_handle_is_rejected() {
        let driver = Driver::new(Arc::new(MemoryClient::new()));
        let mut statement = Statement::new(driver);
        let rows = Box::new(BufferedResult::new(vec![], vec![]));
        let err = statement.initialize(NativeHandle::Result(rows)).unwrap_err();
        assert!(matches!(err, SqlAnywhereError::InvalidArgument(_)));
        assert!(!statement.is_prepared());
    }

    #[test]
    fn test_prepare_is_one_shot() {
        let client = Arc::new(MemoryClient::new());
        let mut conn = Driver::new(client.clone()).connection(ConnectionParameters::new());
        let mut statement = conn.prepare("SELECT 1").unwrap();

        statement.prepare(None).unwrap();
        assert!(statement.is_prepared());
        assert!(matches!(
            statement.prepare(Some("SELECT 2")),
            Err(SqlAnywhereError::Runtime(_))
        ));
        assert!(matches!(statement.set_sql("SELECT 2"), Err(SqlAnywhereError::Runtime(_))));
        assert_eq!(statement.sql(), "SELECT 1");
    }

    #[test]
    fn test_prepare_without_session() {
        let driver = Driver::new(Arc::new(MemoryClient::new()));
        let mut statement = Statement::new(driver);
        statement.set_sql("SELECT 1").unwrap();
        assert!(matches!(statement.prepare(None), Err(SqlAnywhereError::Runtime(_))));
        assert!(matches!(statement.execute(), Err(SqlAnywhereError::Runtime(_))));
    }

    #[test]
    fn test_adopts_prepared_handle() {
        let client = Arc::new(MemoryClient::new());
        let session = client.connect("").unwrap();
        let prepared = session.prepare("DELETE FROM t").unwrap();

        let mut statement = Statement::new(Driver::new(client.clone()));
        statement.initialize(NativeHandle::Statement(prepared)).unwrap();
        assert!(statement.is_prepared());

        let result = statement.execute().unwrap();
        assert!(!result.is_query_result());
        assert_eq!(result.generated_value(), None);
    }

    #[test]
    fn test_binds_with_inferred_types_and_null_flag() {
        let client = Arc::new(MemoryClient::new());
        let mut conn = Driver::new(client.clone()).connection(ConnectionParameters::new());
        let sql = "INSERT INTO t (a, b, c, d) VALUES (?, ?, ?, ?)";
        client.on_query(sql, MemoryResponse::done().with_affected_rows(1).with_insert_id(9));

        let mut statement = conn.prepare(sql).unwrap();
        let result = statement
            .execute_with(vec![
                Value::from("x"),
                Value::Int(2),
                Value::Float(0.5),
                Value::Null,
            ])
            .unwrap();
        assert_eq!(result.affected_rows(), 1);
        assert_eq!(result.generated_value(), Some(&Value::Int(9)));
        assert_eq!(statement.parameter_container().map(|p| p.count()), Some(4));

        let binds: Vec<(usize, BindType, bool)> = client
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                NativeCall::Bind { position, bind_type, is_null, .. } => {
                    Some((position, bind_type, is_null))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            binds,
            vec![
                (0, BindType::S, false),
                (1, BindType::I, false),
                (2, BindType::D, false),
                (3, BindType::B, true),
            ]
        );
    }

    #[test]
    fn test_bind_failure_reports_position() {
        let client = Arc::new(MemoryClient::new());
        client.fail_bind(1, DriverError::new("07006", -157, "Cannot convert 'x' to a numeric"));
        let mut conn = Driver::new(client.clone()).connection(ConnectionParameters::new());
        let mut statement = conn.prepare("UPDATE t SET a = ? WHERE id = ?").unwrap();

        match statement.execute_with(vec![Value::Int(1), Value::from("x")]) {
            Err(SqlAnywhereError::Bind { position, source }) => {
                assert_eq!(position, 1);
                assert_eq!(source.code, -157);
                assert_eq!(source.sqlstate, "07006");
            }
            other => panic!("expected bind error, got {:?}", other),
        }
        assert!(!client.calls().iter().any(|c| matches!(c, NativeCall::Execute(_))));
    }

    #[test]
    fn test_execute_failure_and_profiling() {
        let client = Arc::new(MemoryClient::new());
        let profiler = QueryProfiler::shared();
        let mut driver = Driver::new(client.clone());
        driver.set_profiler(profiler.clone());
        let mut conn = driver.connection(ConnectionParameters::new());

        client.on_query("SELECT id FROM t", MemoryResponse::rows(&["id"]).row(vec![7]));
        let mut statement = conn.prepare("SELECT id FROM t").unwrap();
        let rows: Vec<_> = statement.execute().unwrap().collect();
        assert_eq!(rows.len(), 1);
        assert!(profiler.last_profile().and_then(|p| p.elapsed).is_some());

        client.fail_execute(DriverError::new("40001", -306, "Deadlock detected"));
        let err = statement.execute().unwrap_err();
        assert!(matches!(err, SqlAnywhereError::Execute(_)));
        assert_eq!(profiler.profiles().len(), 2);
    }

    #[test]
    fn test_failed_prepare_keeps_stored_sql() {
        let client = Arc::new(MemoryClient::new());
        client.fail_prepare("SELEC 2", DriverError::new("42000", -131, "Syntax error near 'SELEC'"));
        let mut conn = Driver::new(client.clone()).connection(ConnectionParameters::new());
        let mut statement = conn.prepare("SELECT 1").unwrap();

        let err = statement.prepare(Some("SELEC 2")).unwrap_err();
        assert!(matches!(err, SqlAnywhereError::Prepare(_)));
        assert_eq!(statement.sql(), "SELECT 1");
        assert!(!statement.is_prepared());

        statement.prepare(None).unwrap();
        assert_eq!(statement.sql(), "SELECT 1");
    }

    #[test]
    fn test_implicit_prepare_is_profiled() {
        let client = Arc::new(MemoryClient::new());
        client.fail_prepare("SELEC 1", DriverError::new("42000", -131, "Syntax error near 'SELEC'"));
        let profiler = QueryProfiler::shared();
        let mut driver = Driver::new(client.clone());
        driver.set_profiler(profiler.clone());
        let mut conn = driver.connection(ConnectionParameters::new());

        let mut statement = conn.prepare("SELEC 1").unwrap();
        assert!(matches!(statement.execute(), Err(SqlAnywhereError::Prepare(_))));

        let profiles = profiler.profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].sql, "SELEC 1");
        assert!(profiles[0].elapsed.is_some());
    }
}
