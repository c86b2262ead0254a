//! Tests for result-set cursors against the scripted interface

use std::sync::Arc;

use zero_odbc::api::{Api, DiagRecord, ScriptedApi, ScriptedColumn, ScriptedResult, SqlType};
use zero_odbc::state::CursorState;
use zero_odbc::sync::{Conn, Env};
use zero_odbc::{Decimal, Error, Opts, Value, ValueKind};

fn shared(api: &Arc<ScriptedApi>) -> Arc<dyn Api> {
    let api: Arc<dyn Api> = Arc::<ScriptedApi>::clone(api);
    api
}

fn connect(api: &Arc<ScriptedApi>, opts: Opts) -> Conn {
    let env = Env::new(shared(api), &opts).expect("Failed to create environment");
    Conn::new(&env, opts).expect("Failed to connect")
}

fn get_conn() -> (Arc<ScriptedApi>, Conn) {
    let api = Arc::new(ScriptedApi::new());
    let opts = Opts {
        connection_string: "DSN=test".into(),
        ..Opts::default()
    };
    let conn = connect(&api, opts);
    (api, conn)
}

fn users() -> ScriptedResult {
    ScriptedResult::rows(
        vec![
            ScriptedColumn::new("id", SqlType::INTEGER, 10),
            ScriptedColumn::new("name", SqlType::VARCHAR, 50),
        ],
        vec![
            vec![Value::I32(1), Value::Text("alice".into())],
            vec![Value::I32(2), Value::Text("bob".into())],
            vec![Value::I32(3), Value::Null],
        ],
    )
}

#[test]
fn test_rows_lifecycle() {
    let (api, mut conn) = get_conn();
    api.script("SELECT id, name FROM users", vec![users()]);

    let mut rows = conn.query_rows("SELECT id, name FROM users").unwrap();
    let stmt = api.live_statements()[0];
    assert_eq!(rows.state(), CursorState::Open);
    assert_eq!(rows.column_names(), ["id", "name"]);

    let first = rows.next().unwrap().unwrap();
    assert_eq!(first.get::<i32>(0).unwrap(), 1);
    assert_eq!(first.get_by_name::<String>("name").unwrap(), "alice");
    assert_eq!(rows.state(), CursorState::FetchedRow);

    let second = rows.next().unwrap().unwrap();
    assert_eq!(second.values(), &[Value::I32(2), Value::Text("bob".into())]);
    // rows own their values
    assert_eq!(first.get::<i32>(0).unwrap(), 1);

    let third = rows.next().unwrap().unwrap();
    assert_eq!(third.get::<Option<String>>(1).unwrap(), None);

    assert!(rows.next().unwrap().is_none());
    assert_eq!(rows.state(), CursorState::Exhausted);
    let fetches = api.calls("SQLFetch");
    for _ in 0..3 {
        assert!(rows.next().unwrap().is_none());
    }
    assert_eq!(api.calls("SQLFetch"), fetches);

    rows.close().unwrap();
    assert_eq!(rows.state(), CursorState::Closed);
    rows.close().unwrap();
    drop(rows);
    assert_eq!(api.free_count(stmt), 1);
    assert!(api.live_statements().is_empty());
}

#[test]
fn test_single_result_set() {
    let (api, mut conn) = get_conn();
    api.script("SELECT id, name FROM users", vec![users()]);

    let mut rows = conn.query_rows("SELECT id, name FROM users").unwrap();
    while rows.next().unwrap().is_some() {}
    let describes = api.calls("SQLDescribeCol");
    let counts = api.calls("SQLNumResultCols");
    assert_eq!(describes, 2);

    assert!(rows.has_next_result_set());
    assert!(!rows.next_result_set().unwrap());
    assert!(!rows.next_result_set().unwrap());
    assert_eq!(api.calls("SQLDescribeCol"), describes);
    assert_eq!(api.calls("SQLNumResultCols"), counts);
    assert_eq!(rows.column_names(), ["id", "name"]);
}

#[test]
fn test_multiple_result_sets() {
    let (api, mut conn) = get_conn();
    api.script(
        "EXEC report",
        vec![
            ScriptedResult::rows(
                vec![ScriptedColumn::new("n", SqlType::INTEGER, 10)],
                vec![vec![Value::I32(1)], vec![Value::I32(2)], vec![Value::I32(3)]],
            ),
            ScriptedResult::rows(
                vec![
                    ScriptedColumn::new("label", SqlType::WVARCHAR, 20),
                    ScriptedColumn::new("total", SqlType::BIGINT, 19),
                ],
                vec![
                    vec![Value::Text("a".into()), Value::I64(10)],
                    vec![Value::Text("b".into()), Value::I64(20)],
                ],
            ),
        ],
    );

    let mut rows = conn.query_rows("EXEC report").unwrap();
    let mut first = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        first.push(row.get::<i32>(0).unwrap());
    }
    assert_eq!(first, vec![1, 2, 3]);

    assert!(rows.next_result_set().unwrap());
    assert_eq!(rows.state(), CursorState::Open);
    assert_eq!(rows.column_names(), ["label", "total"]);
    assert_eq!(rows.column_type_scan_type(1).unwrap(), ValueKind::I64);

    let mut second = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        second.push((row.get::<String>(0).unwrap(), row.get::<i64>(1).unwrap()));
    }
    assert_eq!(second, vec![("a".to_string(), 10), ("b".to_string(), 20)]);

    assert!(!rows.next_result_set().unwrap());
    assert_eq!(api.calls("SQLDescribeCol"), 3);
    assert_eq!(api.calls("SQLFreeStmt(SQL_UNBIND)"), 1);
}

#[test]
fn test_columns_stable_across_fetches() {
    let (api, mut conn) = get_conn();
    api.script("SELECT id, name FROM users", vec![users()]);

    let mut rows = conn.query_rows("SELECT id, name FROM users").unwrap();
    let before: Vec<String> = rows.columns().iter().map(|c| c.name().to_string()).collect();
    while rows.next().unwrap().is_some() {}
    let after: Vec<String> = rows.columns().iter().map(|c| c.name().to_string()).collect();
    assert_eq!(before, after);
    assert_eq!(rows.columns().len(), 2);
}

#[test]
fn test_column_introspection() {
    let (api, mut conn) = get_conn();
    api.script(
        "SELECT price, code FROM items",
        vec![ScriptedResult::rows(
            vec![
                ScriptedColumn::new("price", SqlType::DECIMAL, 10).decimal_digits(2),
                ScriptedColumn::new("code", SqlType::VARCHAR, 8)
                    .nullable(zero_odbc::api::Nullable::No),
            ],
            vec![],
        )],
    );

    let rows = conn.query_rows("SELECT price, code FROM items").unwrap();
    assert_eq!(rows.column_type_database_type_name(0).unwrap(), "DECIMAL");
    assert_eq!(rows.column_type_precision_scale(0).unwrap(), Some((10, 2)));
    assert_eq!(rows.column_type_scan_type(0).unwrap(), ValueKind::Decimal);
    assert_eq!(rows.column_type_nullable(0).unwrap(), None);
    assert_eq!(rows.column_type_length(1).unwrap(), Some(8));
    assert_eq!(rows.column_type_nullable(1).unwrap(), Some(false));
    assert!(matches!(
        rows.column_type_length(2),
        Err(Error::InvalidUsage(_))
    ));
}

#[test]
fn test_decimal_with_leading_zero() {
    let (api, mut conn) = get_conn();
    api.script(
        "SELECT ratio FROM readings",
        vec![ScriptedResult::rows(
            vec![ScriptedColumn::new("ratio", SqlType::NUMERIC, 3).decimal_digits(3)],
            vec![
                vec![Value::Decimal(Decimal::new(-123, 3).unwrap())],
                vec![Value::Decimal(Decimal::new(999, 3).unwrap())],
            ],
        )],
    );

    let mut rows = conn.query_rows("SELECT ratio FROM readings").unwrap();
    let first = rows.next().unwrap().unwrap();
    let ratio: Decimal = first.get(0).unwrap();
    assert_eq!(ratio.to_string(), "-0.123");
    let second = rows.next().unwrap().unwrap();
    assert_eq!(second.get::<Decimal>(0).unwrap().to_string(), "0.999");
    assert!(rows.next().unwrap().is_none());
}

#[test]
fn test_result_without_columns() {
    let (api, mut conn) = get_conn();
    api.script("DELETE FROM users", vec![ScriptedResult::affected(4)]);

    let mut rows = conn.query_rows("DELETE FROM users").unwrap();
    assert!(rows.columns().is_empty());
    assert!(rows.next().unwrap().is_none());
    assert_eq!(rows.rows_affected().unwrap(), Some(4));
    assert_eq!(api.calls("SQLFetch"), 0);
    drop(rows);

    assert_eq!(conn.query_drop("DELETE FROM users").unwrap(), Some(4));
}

#[test]
fn test_deferred_columns_in_chunks() {
    let api = Arc::new(ScriptedApi::new());
    let opts = Opts {
        connection_string: "DSN=test".into(),
        chunk_size: 8,
        max_chunk_size: 32,
        ..Opts::default()
    };
    let mut conn = connect(&api, opts);
    let body: String = "The quick brown fox jumps over the lazy dog. ".repeat(6);
    api.script(
        "SELECT id, body, version FROM docs",
        vec![ScriptedResult::rows(
            vec![
                ScriptedColumn::new("id", SqlType::INTEGER, 10),
                ScriptedColumn::new("body", SqlType::LONGVARCHAR, 0),
                ScriptedColumn::new("version", SqlType::INTEGER, 10),
            ],
            vec![
                vec![Value::I32(1), Value::Text(body.clone()), Value::I32(7)],
                vec![Value::I32(2), Value::Null, Value::I32(8)],
            ],
        )],
    );

    let mut rows = conn.query_rows("SELECT id, body, version FROM docs").unwrap();
    let bound: Vec<bool> = rows.columns().iter().map(|c| c.is_bound()).collect();
    // everything after the first deferred column is deferred too
    assert_eq!(bound, vec![true, false, false]);

    let row = rows.next().unwrap().unwrap();
    assert_eq!(row.get::<String>(1).unwrap(), body);
    assert_eq!(row.get::<i32>(2).unwrap(), 7);
    assert!(api.calls("SQLGetData") > 2);

    let row = rows.next().unwrap().unwrap();
    assert_eq!(row.get::<Option<String>>(1).unwrap(), None);
    assert_eq!(row.get::<i32>(2).unwrap(), 8);
}

#[test]
fn test_deferred_columns_unknown_length() {
    let (api, mut conn) = get_conn();
    api.report_unknown_lengths(true);
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    api.script(
        "SELECT blob FROM files",
        vec![ScriptedResult::rows(
            vec![ScriptedColumn::new("blob", SqlType::LONGVARBINARY, 0)],
            vec![vec![Value::Bytes(payload.clone())]],
        )],
    );

    let mut rows = conn.query_rows("SELECT blob FROM files").unwrap();
    let row = rows.next().unwrap().unwrap();
    assert_eq!(row.get::<Vec<u8>>(0).unwrap(), payload);
}

#[test]
fn test_conversion_overflow() {
    let (api, mut conn) = get_conn();
    api.script(
        "SELECT big FROM t",
        vec![ScriptedResult::rows(
            vec![ScriptedColumn::new("big", SqlType::BIGINT, 19)],
            vec![vec![Value::I64(300)], vec![Value::I64(-5)]],
        )],
    );

    let mut rows = conn.query_rows("SELECT big FROM t").unwrap();
    let row = rows.next().unwrap().unwrap();
    assert!(matches!(row.get::<i8>(0), Err(Error::Conversion(_))));
    assert_eq!(row.get::<i16>(0).unwrap(), 300);

    // a failed conversion does not affect the cursor
    let row = rows.next().unwrap().unwrap();
    assert!(matches!(row.get::<u32>(0), Err(Error::Conversion(_))));
    assert_eq!(row.get::<i64>(0).unwrap(), -5);
    assert!(rows.next().unwrap().is_none());
}

#[test]
fn test_fetch_error_breaks_cursor() {
    let (api, mut conn) = get_conn();
    api.script("SELECT id, name FROM users", vec![users()]);

    let mut rows = conn.query_rows("SELECT id, name FROM users").unwrap();
    api.fail_next(
        "SQLFetch",
        vec![DiagRecord::new("08S01", 10054, "Communication link failure")],
    );
    let err = rows.next().unwrap_err();
    assert!(matches!(err, Error::Fetch(_)));
    assert_eq!(err.sqlstate(), Some("08S01"));
    assert_eq!(rows.state(), CursorState::Broken);
    assert!(matches!(rows.next(), Err(Error::InvalidUsage(_))));
    assert!(conn.is_broken());
}

#[test]
fn test_cancel_then_close() {
    let (api, mut conn) = get_conn();
    api.script("SELECT id, name FROM users", vec![users()]);

    let mut stmt = conn.prepare("SELECT id, name FROM users").unwrap();
    let cancel = stmt.cancel_handle();
    let raw = api.live_statements()[0];
    {
        let mut rows = stmt.query(()).unwrap();
        assert!(rows.next().unwrap().is_some());

        assert!(cancel.clone().cancel_in_background().join().unwrap().unwrap());
        assert!(!cancel.cancel().unwrap());
        assert_eq!(api.calls("SQLCancel"), 1);

        let calls = api.calls_on(raw);
        assert!(matches!(rows.next(), Err(Error::Cancelled)));
        assert!(matches!(rows.next_result_set(), Err(Error::Cancelled)));
        rows.close().unwrap();
        drop(rows);
        assert_eq!(api.calls_on(raw), calls);
    }
    assert!(stmt.is_cancelled());
    assert!(matches!(stmt.query(()), Err(Error::Cancelled)));
    stmt.close().unwrap();
    assert_eq!(api.free_count(raw), 0);

    // the last owner frees the handle
    drop(cancel);
    assert_eq!(api.free_count(raw), 1);
}
