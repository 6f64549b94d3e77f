//! End-to-end tests running the driver over the SQLite-backed native client

use sqlanywhere_driver::{
    Adapter, ConnectionParameters, Driver, SqlAnywhereError, SqliteClient, TransactionState, Value,
};
use std::sync::Arc;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Creates a driver over a fresh database directory
fn setup() -> (TempDir, Driver) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let driver = Driver::new(Arc::new(SqliteClient::new(dir.path())));
    (dir, driver)
}

fn params() -> ConnectionParameters {
    ConnectionParameters::new()
        .with_userid("dba")
        .with_password("sql")
        .with_databasename("inventory")
}

#[test]
fn test_ddl_dml_and_query() {
    let (dir, driver) = setup();
    let mut conn = driver.connection(params());

    conn.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, price REAL)")
        .unwrap();
    assert!(dir.path().join("inventory.db").exists());

    {
        let mut insert = conn
            .prepare("INSERT INTO items (name, price) VALUES (?, ?)")
            .unwrap();
        let result = insert
            .execute_with(vec![Value::from("bolt"), Value::Float(0.25)])
            .unwrap();
        assert_eq!(result.affected_rows(), 1);
        assert_eq!(result.generated_value(), Some(&Value::Int(1)));
    }

    conn.prepare("INSERT INTO items (name, price) VALUES (?, ?)")
        .unwrap()
        .execute_with(vec![Value::from("nut"), Value::Null])
        .unwrap();

    let rows: Vec<_> = conn
        .execute("SELECT id, name, price FROM items ORDER BY id")
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&Value::from("bolt")));
    assert_eq!(rows[0].get("price"), Some(&Value::Float(0.25)));
    assert_eq!(rows[1].get("PRICE"), Some(&Value::Null));

    let updated = conn.execute("UPDATE items SET price = 1.0").unwrap();
    assert!(!updated.is_query_result());
    assert_eq!(updated.affected_rows(), 2);
}

#[test]
fn test_rollback_discards_changes() {
    let (_dir, driver) = setup();
    let mut conn = driver.connection(params());
    conn.execute("CREATE TABLE t (n INTEGER)").unwrap();

    conn.begin_transaction().unwrap();
    assert_eq!(conn.transaction_state(), TransactionState::Transaction);
    conn.execute("INSERT INTO t VALUES (1)").unwrap();
    conn.rollback().unwrap();

    conn.begin_transaction().unwrap();
    conn.execute("INSERT INTO t VALUES (2)").unwrap();
    conn.commit().unwrap();
    assert_eq!(conn.transaction_state(), TransactionState::Autocommit);

    let values: Vec<Value> = conn
        .execute("SELECT n FROM t")
        .unwrap()
        .filter_map(|row| row.get("n").cloned())
        .collect();
    assert_eq!(values, vec![Value::Int(2)]);
}

#[test]
fn test_committed_data_survives_reconnect() {
    let (_dir, driver) = setup();
    {
        let mut conn = driver.connection(params());
        conn.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)").unwrap();
        conn.execute("INSERT INTO kv VALUES ('a', 'b')").unwrap();
    }

    let mut conn = driver.connection(params());
    let mut result = conn.execute("SELECT v FROM kv WHERE k = 'a'").unwrap();
    assert_eq!(result.current().and_then(|row| row.get("v")).cloned(), Some(Value::from("b")));
}

#[test]
fn test_constraint_violation_is_translated() {
    let (_dir, driver) = setup();
    let mut conn = driver.connection(params());
    conn.execute("CREATE TABLE u (id INTEGER PRIMARY KEY)").unwrap();
    conn.execute("INSERT INTO u VALUES (1)").unwrap();

    let err = conn
        .prepare("INSERT INTO u VALUES (?)")
        .unwrap()
        .execute_with(vec![Value::Int(1)])
        .unwrap_err();
    assert!(matches!(err, SqlAnywhereError::Execute(_)));
    let source = err.driver_error().unwrap();
    assert_eq!(source.sqlstate, "23000");
    assert!(source.code < 0);
}

#[test]
fn test_syntax_error_fails_prepare() {
    let (_dir, driver) = setup();
    let mut conn = driver.connection(params());
    let mut statement = conn.prepare("SELEC 1").unwrap();
    assert!(matches!(statement.execute(), Err(SqlAnywhereError::Prepare(_))));
}

#[test]
fn test_adapter_over_sqlite() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut adapter = Adapter::new(
        "SqlAnywhere",
        params(),
        Arc::new(SqliteClient::new(dir.path())),
    )
    .unwrap();

    adapter.query("CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT)").unwrap();
    adapter
        .query_with("INSERT INTO t (label) VALUES (?)", vec![Value::from("x")])
        .unwrap();
    assert_eq!(adapter.connection_mut().last_generated_value(None).unwrap(), Value::Int(1));

    let count: Vec<_> = adapter.query("SELECT COUNT(*) AS n FROM t").unwrap().collect();
    assert_eq!(count[0].get("n"), Some(&Value::Int(1)));
}
