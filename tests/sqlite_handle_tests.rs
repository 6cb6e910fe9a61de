/// Integration tests for the serialized SQLite handle
use dbkit::database::{Arguments, Row, SqliteArguments};
use dbkit::{Context, DatabaseHandle, DbError, Phase, SqliteDb};
use std::sync::Arc;
use std::time::Duration;

fn no_args() -> SqliteArguments<'static> {
    SqliteArguments::default()
}

fn text_args(values: &[&'static str]) -> SqliteArguments<'static> {
    let mut args = SqliteArguments::default();
    for value in values {
        args.add(*value).unwrap();
    }
    args
}

async fn open_with_people(path: &str) -> SqliteDb {
    let db = SqliteDb::open(path).await.unwrap();
    db.execute(
        "CREATE TABLE IF NOT EXISTS people (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        no_args(),
    )
    .await
    .unwrap();
    db
}

async fn count_people(db: &SqliteDb) -> i64 {
    let row = db
        .query_row("SELECT COUNT(*) FROM people", no_args())
        .await
        .unwrap()
        .unwrap();
    row.get::<i64, _>(0)
}

#[tokio::test]
async fn test_insert_then_select_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.db");
    let path = path.to_str().unwrap();

    let db = open_with_people(path).await;
    let result = db
        .execute("INSERT INTO people (name) VALUES (?)", text_args(&["ada"]))
        .await
        .unwrap();
    assert_eq!(result.rows_affected(), 1);
    assert_eq!(result.last_insert_rowid(), 1);

    let row = db
        .query_row("SELECT name FROM people WHERE id = 1", no_args())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get::<String, _>("name"), "ada");

    // The file outlives the handle
    db.close().await.unwrap();
    let reopened = SqliteDb::open(path).await.unwrap();
    assert_eq!(count_people(&reopened).await, 1);
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_query_streams_all_rows() {
    let db = open_with_people(":memory:").await;
    for name in ["ada", "grace", "linus"] {
        db.execute("INSERT INTO people (name) VALUES (?)", text_args(&[name]))
            .await
            .unwrap();
    }

    let mut rows = db
        .query("SELECT name FROM people ORDER BY name", no_args())
        .await
        .unwrap();
    let mut names = Vec::new();
    while let Some(row) = rows.next().await.unwrap() {
        names.push(row.get::<String, _>("name"));
    }
    assert_eq!(names, vec!["ada", "grace", "linus"]);

    // Exhausted rows give the connection back
    db.execute("DELETE FROM people", no_args()).await.unwrap();
    assert_eq!(count_people(&db).await, 0);
}

#[tokio::test]
async fn test_query_row_without_match_is_none() {
    let db = open_with_people(":memory:").await;
    let row = db
        .query_row("SELECT name FROM people WHERE name = ?", text_args(&["nobody"]))
        .await
        .unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn test_dropped_rows_release_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.db");
    let db = open_with_people(path.to_str().unwrap()).await;
    db.execute(
        "INSERT INTO people (name) SELECT 'p' || value FROM \
         (WITH RECURSIVE n(value) AS (SELECT 1 UNION ALL SELECT value + 1 FROM n WHERE value < 500) \
         SELECT value FROM n)",
        no_args(),
    )
    .await
    .unwrap();

    let mut rows = db.query("SELECT name FROM people", no_args()).await.unwrap();
    assert!(rows.next().await.unwrap().is_some());
    rows.close();

    assert_eq!(count_people(&db).await, 500);
}

#[tokio::test]
async fn test_bad_statement_fails_at_query_time() {
    let db = SqliteDb::open(":memory:").await.unwrap();
    let err = db
        .query("SELECT * FROM missing_table", no_args())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Execution {
            phase: Phase::Query,
            ..
        }
    ));

    let err = db
        .execute("INSERT INTO missing_table VALUES (1)", no_args())
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Execute));
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let db = SqliteDb::open(":memory:").await.unwrap();

    let row = db
        .query_row("PRAGMA foreign_keys", no_args())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get::<i64, _>(0), 1);

    db.execute("CREATE TABLE authors (id INTEGER PRIMARY KEY)", no_args())
        .await
        .unwrap();
    db.execute(
        "CREATE TABLE books (id INTEGER PRIMARY KEY, author_id INTEGER NOT NULL REFERENCES authors(id))",
        no_args(),
    )
    .await
    .unwrap();

    let err = db
        .execute("INSERT INTO books (author_id) VALUES (42)", no_args())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Execution {
            phase: Phase::Execute,
            ..
        }
    ));
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() {
    let db = open_with_people(":memory:").await;

    let mut tx = db.begin().await.unwrap();
    sqlx::query("INSERT INTO people (name) VALUES ('kept')")
        .execute(&mut *tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = db.begin().await.unwrap();
    sqlx::query("INSERT INTO people (name) VALUES ('discarded')")
        .execute(&mut *tx)
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(count_people(&db).await, 1);
}

#[tokio::test]
async fn test_operations_after_close_fail_not_connected() {
    let db = open_with_people(":memory:").await;
    db.close().await.unwrap();

    let err = db.execute("DELETE FROM people", no_args()).await.unwrap_err();
    assert!(err.is_not_connected());

    let err = db.query("SELECT * FROM people", no_args()).await.unwrap_err();
    assert!(err.is_not_connected());

    let err = db
        .query_row("SELECT * FROM people", no_args())
        .await
        .err().expect("expected an error");
    assert!(err.is_not_connected());

    assert!(db.begin().await.unwrap_err().is_not_connected());
    assert!(db
        .ping(&Context::background())
        .await
        .unwrap_err()
        .is_not_connected());

    // Closing again is a no-op
    db.close().await.unwrap();
    assert!(!db.is_connected().await);
}

#[tokio::test]
async fn test_unopenable_path_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing/child/app.db");

    let err = SqliteDb::open(path.to_str().unwrap()).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Connection {
            phase: Phase::Open,
            ..
        }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concurrent.db");
    let db = Arc::new(open_with_people(path.to_str().unwrap()).await);

    let mut handles = Vec::new();
    for writer in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let mut args = SqliteArguments::default();
                args.add(format!("writer-{writer}-{i}")).unwrap();
                db.execute("INSERT INTO people (name) VALUES (?)", args)
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(count_people(&db).await, 200);
}

#[tokio::test]
async fn test_cancelled_context_skips_statement() {
    let db = open_with_people(":memory:").await;

    let (ctx, cancel) = Context::with_cancel();
    cancel.cancel();
    let err = db
        .execute_with(&ctx, "INSERT INTO people (name) VALUES ('x')", no_args())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Cancelled {
            phase: Phase::Execute
        }
    ));

    let expired = Context::with_timeout(Duration::ZERO);
    let err = db
        .query_row_with(&expired, "SELECT COUNT(*) FROM people", no_args())
        .await
        .err().expect("expected an error");
    assert!(matches!(err, DbError::DeadlineExceeded { .. }));

    assert_eq!(count_people(&db).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_while_queued_never_runs() {
    let db = Arc::new(open_with_people(":memory:").await);

    // An open transaction owns the only connection
    let mut tx = db.begin().await.unwrap();

    // This caller takes the lock and waits for the connection
    let blocked = {
        let db = db.clone();
        tokio::spawn(async move {
            db.execute("INSERT INTO people (name) VALUES ('second')", no_args())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // This caller queues behind it and gives up
    let (ctx, cancel) = Context::with_cancel();
    let queued = {
        let db = db.clone();
        tokio::spawn(async move {
            db.execute_with(&ctx, "INSERT INTO people (name) VALUES ('third')", no_args())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let err = queued.await.unwrap().unwrap_err();
    assert!(matches!(err, DbError::Cancelled { .. }));

    sqlx::query("INSERT INTO people (name) VALUES ('first')")
        .execute(&mut *tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    blocked.await.unwrap().unwrap();

    let mut rows = db
        .query("SELECT name FROM people ORDER BY id", no_args())
        .await
        .unwrap();
    let mut names = Vec::new();
    while let Some(row) = rows.next().await.unwrap() {
        names.push(row.get::<String, _>("name"));
    }
    assert_eq!(names, vec!["first", "second"]);
}

#[tokio::test]
async fn test_handle_reports_through_trait() {
    let db = SqliteDb::open(":memory:").await.unwrap();
    let handle: &dyn DatabaseHandle = &db;

    assert_eq!(handle.backend().as_str(), "sqlite");
    assert_eq!(handle.describe(), "sqlite::memory:");
    assert!(handle.is_connected().await);
    handle.ping(&Context::background()).await.unwrap();
    handle.close().await.unwrap();
    assert!(!handle.is_connected().await);
}
