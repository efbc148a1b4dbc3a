//! SQL batch executor behavior against the in-memory store

mod common;

use common::{progress_percents, test_config, MemoryDatabase};
use tabload_engine::{
    open_session, progress_channel, CancellationToken, EngineError, ProgressEvent,
    ScriptOutcome, Splitter, SqlBatchExecutor,
};

#[tokio::test]
async fn test_runs_statements_in_order() {
    let db = MemoryDatabase::new();
    let mut store = open_session(&db.connector(), &test_config()).await.unwrap();
    let (tx, mut rx) = progress_channel();

    let outcome = SqlBatchExecutor::default()
        .run(&mut store, "A;\n B ;\n\n;C;", &CancellationToken::new(), &tx)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ScriptOutcome::Completed {
            executed: 3,
            rows_affected: 0
        }
    );
    assert_eq!(db.executed(), vec!["A", "B", "C"]);

    let events = rx.drain();
    assert_eq!(progress_percents(&events), vec![33, 67, 100]);
    assert!(matches!(&events[0], ProgressEvent::Log { message } if message.starts_with("(1/3)")));
}

#[tokio::test]
async fn test_failure_stops_remaining_statements() {
    let db = MemoryDatabase::new();
    db.fail_statement("B");
    let mut store = open_session(&db.connector(), &test_config()).await.unwrap();
    let (tx, mut rx) = progress_channel();

    let err = SqlBatchExecutor::default()
        .run(&mut store, "A;B;C", &CancellationToken::new(), &tx)
        .await
        .unwrap_err();

    match err {
        EngineError::Statement {
            index, statement, ..
        } => {
            assert_eq!(index, 2);
            assert_eq!(statement, "B");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(db.executed(), vec!["A"]);
    assert_eq!(progress_percents(&rx.drain()), vec![33]);
}

#[tokio::test]
async fn test_cancel_stops_before_next_statement() {
    let db = MemoryDatabase::new();
    let mut store = open_session(&db.connector(), &test_config()).await.unwrap();
    let (tx, _rx) = progress_channel();
    let token = CancellationToken::new();
    token.cancel();

    let outcome = SqlBatchExecutor::default()
        .run(&mut store, "A;B", &token, &tx)
        .await
        .unwrap();

    assert_eq!(outcome, ScriptOutcome::Cancelled { executed: 0 });
    assert!(db.executed().is_empty());
}

#[tokio::test]
async fn test_empty_script_is_rejected() {
    let db = MemoryDatabase::new();
    let mut store = open_session(&db.connector(), &test_config()).await.unwrap();
    let (tx, _rx) = progress_channel();

    let err = SqlBatchExecutor::default()
        .run(&mut store, " ;\n; ", &CancellationToken::new(), &tx)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyScript));
}

#[tokio::test]
async fn test_quote_aware_splitter_keeps_literal_semicolons() {
    let db = MemoryDatabase::new();
    let mut store = open_session(&db.connector(), &test_config()).await.unwrap();
    let (tx, _rx) = progress_channel();

    let script = "INSERT INTO notes VALUES ('a;b');SELECT 1";
    SqlBatchExecutor::new(';', Splitter::QuoteAware)
        .run(&mut store, script, &CancellationToken::new(), &tx)
        .await
        .unwrap();

    assert_eq!(
        db.executed(),
        vec!["INSERT INTO notes VALUES ('a;b')", "SELECT 1"]
    );
}
