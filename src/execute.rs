//! Statement execution behind a write-policy gate.
//!
//! The gate is leading-keyword classification only. It stops the obvious
//! destructive statement a model may hallucinate; it is not a security
//! boundary and is documented as such.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, MySqlPool, PgPool, Row, SqlitePool, TypeInfo};

use crate::connect::{Database, MssqlClient};
use crate::error::ExecuteError;
use crate::generate::GeneratedQuery;

/// One scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered tabular payload: column names plus rows of scalars.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Row count before the cap was applied. The renderer reports the cap
    /// whenever it bites; it is never silent.
    pub total_rows: usize,
}

impl ResultSet {
    pub fn truncated(&self) -> bool {
        self.total_rows > self.rows.len()
    }
}

/// What a statement did.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Rows(ResultSet),
    Affected(u64),
}

/// Leading-keyword classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Read(String),
    Write(String),
}

/// Classify by the statement's first word against the configured write set.
pub fn classify(sql: &str, write_keywords: &BTreeSet<String>) -> StatementKind {
    let keyword = sql
        .trim_start()
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if write_keywords.contains(&keyword) {
        StatementKind::Write(keyword)
    } else {
        StatementKind::Read(keyword)
    }
}

/// Write-statement gate.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    pub read_only: bool,
    /// Uppercased keywords treated as writes. Deployments may extend the
    /// set (e.g. with CREATE) through configuration.
    pub write_keywords: BTreeSet<String>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            read_only: true,
            write_keywords: ["INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ExecutionPolicy {
    pub fn read_write() -> Self {
        Self {
            read_only: false,
            ..Self::default()
        }
    }

    /// Apply the gate before anything reaches a driver.
    pub fn check(&self, sql: &str) -> Result<StatementKind, ExecuteError> {
        let kind = classify(sql, &self.write_keywords);
        if self.read_only {
            if let StatementKind::Write(keyword) = &kind {
                return Err(ExecuteError::WriteNotAllowed(keyword.clone()));
            }
        }
        Ok(kind)
    }
}

/// Execution knobs.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Upper bound on captured rows.
    pub max_rows: usize,
    pub timeout: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            max_rows: 500,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Run one generated statement under `policy`.
///
/// Every failure is terminal for the turn and carries the driver's own
/// diagnostic text; the connection itself stays valid for the next turn.
pub async fn execute(
    db: &mut Database,
    query: &GeneratedQuery,
    policy: &ExecutionPolicy,
    options: &ExecOptions,
) -> Result<ExecutionOutcome, ExecuteError> {
    let kind = policy.check(&query.sql)?;
    tracing::debug!(kind = ?kind, "executing statement");

    match tokio::time::timeout(
        options.timeout,
        run_statement(db, &query.sql, &kind, options.max_rows),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => Err(ExecuteError::Timeout(options.timeout)),
    }
}

async fn run_statement(
    db: &mut Database,
    sql: &str,
    kind: &StatementKind,
    max_rows: usize,
) -> Result<ExecutionOutcome, ExecuteError> {
    let is_write = matches!(kind, StatementKind::Write(_));
    match db {
        Database::Sqlite(pool) => {
            if is_write {
                let res = sqlx::query(sql).execute(&*pool).await.map_err(classify_sqlx)?;
                Ok(ExecutionOutcome::Affected(res.rows_affected()))
            } else {
                fetch_sqlite(pool, sql, max_rows).await
            }
        }
        Database::Mysql(pool) => {
            if is_write {
                let res = sqlx::query(sql).execute(&*pool).await.map_err(classify_sqlx)?;
                Ok(ExecutionOutcome::Affected(res.rows_affected()))
            } else {
                fetch_mysql(pool, sql, max_rows).await
            }
        }
        Database::Postgres(pool) => {
            if is_write {
                let res = sqlx::query(sql).execute(&*pool).await.map_err(classify_sqlx)?;
                Ok(ExecutionOutcome::Affected(res.rows_affected()))
            } else {
                fetch_postgres(pool, sql, max_rows).await
            }
        }
        Database::Mssql(client) => {
            if is_write {
                let res = client
                    .execute(sql, &[])
                    .await
                    .map_err(classify_tiberius)?;
                Ok(ExecutionOutcome::Affected(res.total()))
            } else {
                fetch_mssql(client, sql, max_rows).await
            }
        }
    }
}

/// Sort a driver failure into the syntax/runtime split, keeping the
/// original message. Every supported backend spells "syntax" in its
/// parse-error text.
fn classify_sqlx(e: sqlx::Error) -> ExecuteError {
    match e {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            if message.to_ascii_lowercase().contains("syntax") {
                ExecuteError::Syntax(message)
            } else {
                ExecuteError::Runtime(message)
            }
        }
        other => ExecuteError::Runtime(other.to_string()),
    }
}

fn classify_tiberius(e: tiberius::error::Error) -> ExecuteError {
    let message = e.to_string();
    if message.to_ascii_lowercase().contains("syntax") {
        ExecuteError::Syntax(message)
    } else {
        ExecuteError::Runtime(message)
    }
}

fn collect<R>(
    rows: Vec<R>,
    columns_of: impl Fn(&R) -> Vec<String>,
    decode: impl Fn(&R, usize) -> Value,
    max_rows: usize,
) -> ResultSet {
    let columns = rows.first().map(&columns_of).unwrap_or_default();
    let total_rows = rows.len();
    let width = columns.len();
    let grid = rows
        .iter()
        .take(max_rows)
        .map(|row| (0..width).map(|i| decode(row, i)).collect())
        .collect();
    ResultSet {
        columns,
        rows: grid,
        total_rows,
    }
}

async fn fetch_sqlite(
    pool: &SqlitePool,
    sql: &str,
    max_rows: usize,
) -> Result<ExecutionOutcome, ExecuteError> {
    let rows = sqlx::query(sql).fetch_all(pool).await.map_err(classify_sqlx)?;
    Ok(ExecutionOutcome::Rows(collect(
        rows,
        |row| row.columns().iter().map(|c| c.name().to_string()).collect(),
        decode_sqlite,
        max_rows,
    )))
}

async fn fetch_mysql(
    pool: &MySqlPool,
    sql: &str,
    max_rows: usize,
) -> Result<ExecutionOutcome, ExecuteError> {
    let rows = sqlx::query(sql).fetch_all(pool).await.map_err(classify_sqlx)?;
    Ok(ExecutionOutcome::Rows(collect(
        rows,
        |row| row.columns().iter().map(|c| c.name().to_string()).collect(),
        decode_mysql,
        max_rows,
    )))
}

async fn fetch_postgres(
    pool: &PgPool,
    sql: &str,
    max_rows: usize,
) -> Result<ExecutionOutcome, ExecuteError> {
    let rows = sqlx::query(sql).fetch_all(pool).await.map_err(classify_sqlx)?;
    Ok(ExecutionOutcome::Rows(collect(
        rows,
        |row| row.columns().iter().map(|c| c.name().to_string()).collect(),
        decode_postgres,
        max_rows,
    )))
}

async fn fetch_mssql(
    client: &mut MssqlClient,
    sql: &str,
    max_rows: usize,
) -> Result<ExecutionOutcome, ExecuteError> {
    let rows = client
        .simple_query(sql)
        .await
        .map_err(classify_tiberius)?
        .into_first_result()
        .await
        .map_err(classify_tiberius)?;

    Ok(ExecutionOutcome::Rows(collect(
        rows,
        |row| row.columns().iter().map(|c| c.name().to_string()).collect(),
        decode_mssql,
        max_rows,
    )))
}

fn opt<T>(res: Result<Option<T>, sqlx::Error>, f: impl FnOnce(T) -> Value) -> Value {
    match res {
        Ok(Some(v)) => f(v),
        _ => Value::Null,
    }
}

fn decode_sqlite(row: &SqliteRow, i: usize) -> Value {
    let ty = row.column(i).type_info().name().to_ascii_uppercase();
    match ty.as_str() {
        "BOOLEAN" => opt(row.try_get::<Option<bool>, _>(i), Value::Bool),
        "INTEGER" | "INT8" => opt(row.try_get::<Option<i64>, _>(i), Value::Int),
        "REAL" | "NUMERIC" => opt(row.try_get::<Option<f64>, _>(i), Value::Float),
        "BLOB" => opt(row.try_get::<Option<Vec<u8>>, _>(i), |b| {
            Value::Text(format!("<{} bytes>", b.len()))
        }),
        // TEXT, DATE, DATETIME, NULL and declared-type oddities all read
        // back as text in SQLite.
        _ => opt(row.try_get::<Option<String>, _>(i), Value::Text),
    }
}

fn decode_mysql(row: &MySqlRow, i: usize) -> Value {
    let ty = row.column(i).type_info().name().to_ascii_uppercase();
    match ty.as_str() {
        "BOOLEAN" => opt(row.try_get::<Option<bool>, _>(i), Value::Bool),
        "FLOAT" | "DOUBLE" => opt(row.try_get::<Option<f64>, _>(i), Value::Float),
        "DATE" => opt(row.try_get::<Option<chrono::NaiveDate>, _>(i), |v| {
            Value::Text(v.to_string())
        }),
        "TIME" => opt(row.try_get::<Option<chrono::NaiveTime>, _>(i), |v| {
            Value::Text(v.to_string())
        }),
        "DATETIME" => opt(row.try_get::<Option<chrono::NaiveDateTime>, _>(i), |v| {
            Value::Text(v.to_string())
        }),
        "TIMESTAMP" => opt(
            row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i),
            |v| Value::Text(v.to_string()),
        ),
        t if t.contains("INT") => match row.try_get::<Option<i64>, _>(i) {
            Ok(v) => v.map_or(Value::Null, Value::Int),
            // BIGINT UNSIGNED beyond i64 range still renders.
            Err(_) => opt(row.try_get::<Option<u64>, _>(i), |v| {
                Value::Text(v.to_string())
            }),
        },
        _ => opt(row.try_get::<Option<String>, _>(i), Value::Text),
    }
}

fn decode_postgres(row: &PgRow, i: usize) -> Value {
    let ty = row.column(i).type_info().name().to_ascii_uppercase();
    match ty.as_str() {
        "BOOL" => opt(row.try_get::<Option<bool>, _>(i), Value::Bool),
        "INT2" => opt(row.try_get::<Option<i16>, _>(i), |v| Value::Int(v.into())),
        "INT4" => opt(row.try_get::<Option<i32>, _>(i), |v| Value::Int(v.into())),
        "INT8" => opt(row.try_get::<Option<i64>, _>(i), Value::Int),
        "FLOAT4" => opt(row.try_get::<Option<f32>, _>(i), |v| {
            Value::Float(v.into())
        }),
        "FLOAT8" => opt(row.try_get::<Option<f64>, _>(i), Value::Float),
        "UUID" => opt(row.try_get::<Option<uuid::Uuid>, _>(i), |v| {
            Value::Text(v.to_string())
        }),
        "DATE" => opt(row.try_get::<Option<chrono::NaiveDate>, _>(i), |v| {
            Value::Text(v.to_string())
        }),
        "TIME" => opt(row.try_get::<Option<chrono::NaiveTime>, _>(i), |v| {
            Value::Text(v.to_string())
        }),
        "TIMESTAMP" => opt(row.try_get::<Option<chrono::NaiveDateTime>, _>(i), |v| {
            Value::Text(v.to_string())
        }),
        "TIMESTAMPTZ" => opt(
            row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i),
            |v| Value::Text(v.to_string()),
        ),
        _ => opt(row.try_get::<Option<String>, _>(i), Value::Text),
    }
}

fn decode_mssql(row: &tiberius::Row, i: usize) -> Value {
    if let Ok(Some(v)) = row.try_get::<bool, _>(i) {
        return Value::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<u8, _>(i) {
        return Value::Int(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<i16, _>(i) {
        return Value::Int(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(i) {
        return Value::Int(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<i64, _>(i) {
        return Value::Int(v);
    }
    if let Ok(Some(v)) = row.try_get::<f32, _>(i) {
        return Value::Float(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(i) {
        return Value::Float(v);
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(i) {
        return Value::Text(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(i) {
        return Value::Text(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDate, _>(i) {
        return Value::Text(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<uuid::Uuid, _>(i) {
        return Value::Text(v.to_string());
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sql(text: &str) -> GeneratedQuery {
        GeneratedQuery {
            sql: text.to_string(),
            raw: text.to_string(),
        }
    }

    #[test]
    fn test_classify_leading_keyword() {
        let policy = ExecutionPolicy::default();
        assert_eq!(
            classify("SELECT * FROM t", &policy.write_keywords),
            StatementKind::Read("SELECT".into())
        );
        assert_eq!(
            classify("  delete from t", &policy.write_keywords),
            StatementKind::Write("DELETE".into())
        );
        assert_eq!(
            classify("TRUNCATE TABLE t", &policy.write_keywords),
            StatementKind::Write("TRUNCATE".into())
        );
    }

    #[test]
    fn test_read_only_gate_rejects_writes() {
        let policy = ExecutionPolicy::default();
        let err = policy.check("DELETE FROM PATIENTS").unwrap_err();
        match err {
            ExecuteError::WriteNotAllowed(keyword) => assert_eq!(keyword, "DELETE"),
            other => panic!("expected WriteNotAllowed, got {other:?}"),
        }
    }

    #[test]
    fn test_read_write_mode_admits_writes() {
        let policy = ExecutionPolicy::read_write();
        assert_eq!(
            policy.check("DELETE FROM PATIENTS").unwrap(),
            StatementKind::Write("DELETE".into())
        );
    }

    #[test]
    fn test_create_is_not_gated_by_default() {
        let policy = ExecutionPolicy::default();
        assert!(policy.check("CREATE TABLE t (id INTEGER)").is_ok());
    }

    #[test]
    fn test_extended_write_set() {
        let mut policy = ExecutionPolicy::default();
        policy.write_keywords.insert("CREATE".into());
        assert!(matches!(
            policy.check("CREATE TABLE t (id INTEGER)"),
            Err(ExecuteError::WriteNotAllowed(_))
        ));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Text("Alice".into()).to_string(), "Alice");
    }

    #[test]
    fn test_result_set_truncation_flag() {
        let rs = ResultSet {
            columns: vec!["n".into()],
            rows: vec![vec![Value::Int(1)]],
            total_rows: 10,
        };
        assert!(rs.truncated());
    }

    #[test]
    fn test_gate_fires_before_any_driver_work() {
        // The gate rejects from the policy alone; no connection involved.
        let policy = ExecutionPolicy::default();
        let query = sql("DROP TABLE PATIENTS;");
        assert!(matches!(
            policy.check(&query.sql),
            Err(ExecuteError::WriteNotAllowed(_))
        ));
    }
}
