//! Adapter Module
//!
//! Entry point for consumers: resolves a driver by name and wires the
//! driver, its connection and the quoting platform together.

use crate::config::Config;
use crate::core::db::{Connection, ConnectionParameters, Driver, ResultSet, Statement, Value};
use crate::core::error::{Result, SqlAnywhereError};
use crate::core::native::NativeClient;
use crate::platform::Platform;
use crate::profiler::QueryProfiler;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Adapter {
    driver: Driver,
    connection: Connection,
    platform: Platform,
}

impl Adapter {
    /// Builds an adapter for `driver_name` over `native`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when no driver answers to `driver_name`.
    pub fn new(
        driver_name: &str,
        parameters: ConnectionParameters,
        native: Arc<dyn NativeClient>,
    ) -> Result<Self> {
        Self::build(driver_name, parameters, native, false)
    }

    /// Builds an adapter from a loaded configuration, attaching a
    /// [`QueryProfiler`] when profiling is enabled.
    pub fn from_config(config: &Config, native: Arc<dyn NativeClient>) -> Result<Self> {
        Self::build(
            &config.driver.name,
            config.connection.clone(),
            native,
            config.driver.profiling,
        )
    }

    fn build(
        driver_name: &str,
        parameters: ConnectionParameters,
        native: Arc<dyn NativeClient>,
        profiling: bool,
    ) -> Result<Self> {
        if !Driver::matches_name(driver_name) {
            return Err(SqlAnywhereError::InvalidArgument(format!(
                "Unknown driver '{}'",
                driver_name
            )));
        }

        let mut driver = Driver::new(native);
        if profiling {
            driver.set_profiler(QueryProfiler::shared());
        }
        let connection = driver.connection(parameters);
        debug!(driver = driver.name(), profiling, "adapter ready");

        Ok(Adapter {
            driver,
            connection,
            platform: Platform::new(),
        })
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Runs `sql` directly on the connection.
    pub fn query(&mut self, sql: &str) -> Result<ResultSet> {
        self.connection.execute(sql)
    }

    /// Prepares `sql` and executes it with `values` bound by position.
    pub fn query_with(&mut self, sql: &str, values: Vec<Value>) -> Result<ResultSet> {
        self.connection.prepare(sql)?.execute_with(values)
    }

    pub fn create_statement(&mut self, sql: &str) -> Result<Statement<'_>> {
        self.driver
            .create_statement(&mut self.connection, sql.into())
    }
}
