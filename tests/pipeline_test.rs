//! End-to-end pipeline tests over SQLite.
//!
//! A scripted model backend stands in for the real ones, so every stage
//! from prompt to rendered rows runs exactly as in production, minus the
//! network.

use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use askdb::connect::{self, BackendKind, ConnectionSpec, Database};
use askdb::error::{AskdbError, ConnectError, ExecuteError, GenerateError};
use askdb::execute::{ExecOptions, ExecutionOutcome, ExecutionPolicy, Value};
use askdb::introspect;
use askdb::model::ModelBackend;
use askdb::session::{Session, SessionOptions};

struct Scripted(String);

#[async_trait]
impl ModelBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }
    async fn complete(&self, _prompt: &str) -> Result<String, GenerateError> {
        Ok(self.0.clone())
    }
}

struct Stalled;

#[async_trait]
impl ModelBackend for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String, GenerateError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(String::new())
    }
}

fn memory_spec() -> ConnectionSpec {
    let mut spec = ConnectionSpec::new(BackendKind::Sqlite);
    spec.path = Some(":memory:".into());
    spec
}

/// In-memory database with `PATIENTS(patient_id, first_name)` = `(1, "Alice")`,
/// plus a clone of the pool for out-of-band assertions.
async fn clinic_db() -> (Database, sqlx::SqlitePool) {
    let db = connect::connect(&memory_spec()).await.expect("connect");
    let Database::Sqlite(pool) = &db else {
        panic!("expected a sqlite handle");
    };
    let pool = pool.clone();
    sqlx::query("CREATE TABLE PATIENTS (patient_id INTEGER PRIMARY KEY, first_name TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO PATIENTS (patient_id, first_name) VALUES (1, 'Alice')")
        .execute(&pool)
        .await
        .unwrap();
    (db, pool)
}

fn session_with(db: Database, response: &str, policy: ExecutionPolicy) -> Session {
    Session::new(
        db,
        Box::new(Scripted(response.to_string())),
        policy,
        SessionOptions::default(),
    )
}

async fn patient_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM PATIENTS")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn ask_executes_generated_select() {
    let (db, _pool) = clinic_db().await;
    let mut session = session_with(
        db,
        "```sql\nSELECT first_name FROM PATIENTS WHERE patient_id = 1;\n```",
        ExecutionPolicy::default(),
    );

    let turn = session.ask("what is patient 1 called?").await.unwrap();
    assert_eq!(
        turn.query.sql,
        "SELECT first_name FROM PATIENTS WHERE patient_id = 1;"
    );

    match turn.outcome {
        ExecutionOutcome::Rows(rs) => {
            assert_eq!(rs.columns, vec!["first_name".to_string()]);
            assert_eq!(rs.rows, vec![vec![Value::Text("Alice".into())]]);
            assert_eq!(rs.total_rows, 1);
            assert!(!rs.truncated());
        }
        other => panic!("expected rows, got {other:?}"),
    }
    session.close().await;
}

#[tokio::test]
async fn write_statement_is_gated_and_database_untouched() {
    let (db, pool) = clinic_db().await;
    let mut session = session_with(db, "DELETE FROM PATIENTS;", ExecutionPolicy::default());

    let err = session.ask("remove everyone").await.unwrap_err();
    match err {
        AskdbError::Execute(ExecuteError::WriteNotAllowed(keyword)) => {
            assert_eq!(keyword, "DELETE");
        }
        other => panic!("expected WriteNotAllowed, got {other:?}"),
    }

    assert_eq!(patient_count(&pool).await, 1);
    session.close().await;
}

#[tokio::test]
async fn read_write_mode_executes_the_delete() {
    let (db, pool) = clinic_db().await;
    let mut session = session_with(db, "DELETE FROM PATIENTS;", ExecutionPolicy::read_write());

    let turn = session.ask("remove everyone").await.unwrap();
    assert_eq!(turn.outcome, ExecutionOutcome::Affected(1));
    assert_eq!(patient_count(&pool).await, 0);
    session.close().await;
}

#[tokio::test]
async fn multi_statement_response_is_rejected() {
    let (db, pool) = clinic_db().await;
    let mut session = session_with(
        db,
        "SELECT 1; DELETE FROM PATIENTS;",
        ExecutionPolicy::read_write(),
    );

    let err = session.ask("anything").await.unwrap_err();
    assert!(matches!(
        err,
        AskdbError::Generate(GenerateError::MultiStatement(2))
    ));
    // Nothing ran, not even the harmless first statement.
    assert_eq!(patient_count(&pool).await, 1);
    session.close().await;
}

#[tokio::test]
async fn introspection_is_deterministic() {
    let (mut db, pool) = clinic_db().await;
    sqlx::query("CREATE TABLE VISITS (visit_id INTEGER, patient_id INTEGER)")
        .execute(&pool)
        .await
        .unwrap();

    let first = introspect::introspect(&mut db).await.unwrap();
    let second = introspect::introspect(&mut db).await.unwrap();
    assert_eq!(first.render(), second.render());
    assert_eq!(
        first.render(),
        "PATIENTS (patient_id INTEGER, first_name TEXT)\n\
         VISITS (visit_id INTEGER, patient_id INTEGER)\n"
    );
    db.close().await;
}

#[tokio::test]
async fn schema_is_memoized_per_connection() {
    let (db, pool) = clinic_db().await;
    let mut session = session_with(db, "SELECT 1;", ExecutionPolicy::default());

    let before = session.schema().await.unwrap().clone();
    sqlx::query("DROP TABLE PATIENTS").execute(&pool).await.unwrap();
    let after = session.schema().await.unwrap().clone();

    // Still the description captured at first use; a reconnect (new
    // session) is the only invalidation.
    assert_eq!(before, after);
    session.close().await;
}

#[tokio::test]
async fn connect_then_close_leaves_no_open_pool() {
    let db = connect::connect(&memory_spec()).await.unwrap();
    let Database::Sqlite(pool) = &db else {
        panic!("expected a sqlite handle");
    };
    let pool = pool.clone();
    assert!(!pool.is_closed());

    db.close().await;
    assert!(pool.is_closed());
}

#[tokio::test]
async fn file_backed_database_connects_and_closes() {
    // A zero-length file is a valid (empty) SQLite database.
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut spec = ConnectionSpec::new(BackendKind::Sqlite);
    spec.path = Some(file.path().to_string_lossy().into_owned());

    let mut db = connect::connect(&spec).await.unwrap();
    let schema = introspect::introspect(&mut db).await.unwrap();
    assert!(schema.tables.is_empty());
    db.close().await;
}

#[tokio::test]
async fn missing_fields_fail_before_any_io() {
    let spec = ConnectionSpec::new(BackendKind::Sqlite);
    match connect::connect(&spec).await {
        Err(ConnectError::MissingField { field, .. }) => assert_eq!(field, "path"),
        other => panic!("expected MissingField, got {other:?}"),
    }

    let mut spec = ConnectionSpec::new(BackendKind::Postgres);
    spec.username = Some("app".into());
    match connect::connect(&spec).await {
        Err(ConnectError::MissingField { field, .. }) => assert_eq!(field, "host"),
        other => panic!("expected MissingField, got {other:?}"),
    }
}

#[tokio::test]
async fn row_cap_is_reported_not_silent() {
    let (db, pool) = clinic_db().await;
    for i in 2..=10 {
        sqlx::query("INSERT INTO PATIENTS (patient_id, first_name) VALUES (?, 'P')")
            .bind(i)
            .execute(&pool)
            .await
            .unwrap();
    }

    let options = SessionOptions {
        exec: ExecOptions {
            max_rows: 3,
            timeout: Duration::from_secs(5),
        },
        ..SessionOptions::default()
    };
    let mut session = Session::new(
        db,
        Box::new(Scripted("SELECT * FROM PATIENTS;".into())),
        ExecutionPolicy::default(),
        options,
    );

    let turn = session.ask("everyone").await.unwrap();
    match turn.outcome {
        ExecutionOutcome::Rows(rs) => {
            assert_eq!(rs.rows.len(), 3);
            assert_eq!(rs.total_rows, 10);
            assert!(rs.truncated());
        }
        other => panic!("expected rows, got {other:?}"),
    }
    session.close().await;
}

#[tokio::test]
async fn runtime_error_preserves_driver_text() {
    let (db, _pool) = clinic_db().await;
    let mut session = session_with(
        db,
        "SELECT * FROM NO_SUCH_TABLE;",
        ExecutionPolicy::default(),
    );

    let err = session.ask("anything").await.unwrap_err();
    match err {
        AskdbError::Execute(ExecuteError::Runtime(message)) => {
            assert!(message.contains("NO_SUCH_TABLE"), "message was: {message}");
        }
        other => panic!("expected Runtime, got {other:?}"),
    }
    session.close().await;
}

#[tokio::test]
async fn syntax_error_is_classified() {
    let (db, _pool) = clinic_db().await;
    let mut session = session_with(db, "SELECT * FROM WHERE;", ExecutionPolicy::default());

    let err = session.ask("anything").await.unwrap_err();
    assert!(matches!(
        err,
        AskdbError::Execute(ExecuteError::Syntax(_))
    ));
    session.close().await;
}

#[tokio::test]
async fn stalled_model_times_out_instead_of_hanging() {
    let (db, _pool) = clinic_db().await;
    let options = SessionOptions {
        generation_timeout: Duration::from_millis(50),
        ..SessionOptions::default()
    };
    let mut session = Session::new(db, Box::new(Stalled), ExecutionPolicy::default(), options);

    let err = session.ask("anything").await.unwrap_err();
    assert!(matches!(
        err,
        AskdbError::Generate(GenerateError::Timeout(_))
    ));
    session.close().await;
}
