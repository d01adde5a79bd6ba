//! End-to-end protocol scenarios over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use querylink_client::{
    ClientConfig, ClientError, ConnectionConfig, ConnectionEvent, ConnectionStatus,
    MemoryConnector, MemoryServer, QueryClient, QueryEvent, QueryStatus, ServerEnd,
};
use querylink_protocol::{
    CanceledPayload, ClientMessage, DonePayload, ErrorPayload, ProgressPayload, QueryId,
    QueryStats, RequestId, RowsPayload, ServerMessage,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

// ── Harness ──

fn client() -> (QueryClient, MemoryServer) {
    let (connector, server) = MemoryConnector::pair();
    let config = ClientConfig {
        connection: ConnectionConfig::new("ws://memory.test/ws"),
        ..ClientConfig::default()
    };
    (QueryClient::new(config, Arc::new(connector)), server)
}

async fn connected() -> (QueryClient, MemoryServer, ServerEnd) {
    let (client, mut server) = client();
    client.connect(Some("t0ken")).unwrap();
    let end = server.accept().await.unwrap();
    client.wait_connected().await.unwrap();
    (client, server, end)
}

/// Next `runQuery` from the client, skipping keep-alives.
async fn next_run(end: &mut ServerEnd) -> (RequestId, String) {
    loop {
        match end.recv().await.expect("client hung up") {
            ClientMessage::RunQuery { request_id, sql } => return (request_id, sql),
            ClientMessage::Ping => {}
            other => panic!("expected runQuery, got {other:?}"),
        }
    }
}

fn qid(s: &str) -> QueryId {
    QueryId::from(s)
}

fn accepted(request_id: &RequestId, query_id: &str) -> ServerMessage {
    ServerMessage::QueryAccepted {
        request_id: request_id.clone(),
        query_id: qid(query_id),
    }
}

fn rows(query_id: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> ServerMessage {
    ServerMessage::QueryRows(RowsPayload {
        query_id: qid(query_id),
        columns: columns.iter().map(ToString::to_string).collect(),
        rows,
    })
}

fn done(query_id: &str, elapsed_ms: f64, total_rows: i64) -> ServerMessage {
    ServerMessage::QueryDone(DonePayload {
        query_id: qid(query_id),
        stats: QueryStats {
            elapsed_ms,
            total_rows,
        },
    })
}

fn failed(query_id: &str, message: &str) -> ServerMessage {
    ServerMessage::QueryError(ErrorPayload {
        query_id: qid(query_id),
        message: message.into(),
    })
}

fn canceled(query_id: &str) -> ServerMessage {
    ServerMessage::QueryCanceled(CanceledPayload {
        query_id: qid(query_id),
    })
}

fn progress(query_id: &str, rows_sent: u64) -> ServerMessage {
    ServerMessage::QueryProgress(ProgressPayload {
        query_id: qid(query_id),
        status: Some("running".into()),
        rows_sent: Some(rows_sent),
    })
}

// ── Happy path ──

#[tokio::test]
async fn select_one_end_to_end() {
    let (client, _server, mut end) = connected().await;
    assert_eq!(end.url().as_str(), "ws://memory.test/ws?token=t0ken");
    let session = client.session();

    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run("SELECT 1").await }
    });

    let (request_id, sql) = next_run(&mut end).await;
    assert_eq!(sql, "SELECT 1");
    assert_eq!(session.status(), QueryStatus::Starting);
    assert!(session.query_id().is_none());

    assert!(end.send(&accepted(&request_id, "q1")).await);
    assert!(end.send(&rows("q1", &["?column?"], vec![vec![json!(1)]])).await);
    assert!(end.send(&done("q1", 12.0, 1)).await);

    let query_id = timeout(TIMEOUT, runner).await.unwrap().unwrap().unwrap();
    assert_eq!(query_id.as_str(), "q1");

    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(result.status, QueryStatus::Done);
    assert_eq!(result.rows, vec![vec![json!(1)]]);
    assert_eq!(result.columns, vec!["?column?"]);
    assert_eq!(
        result.stats,
        Some(QueryStats {
            elapsed_ms: 12.0,
            total_rows: 1
        })
    );
    assert!(result.error.is_none());
    assert_eq!(result.query_id, Some(qid("q1")));
    assert!(client.registry().is_empty(), "finished query keeps no subscription");
}

#[tokio::test]
async fn run_query_frame_shape() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();
    let _runner = tokio::spawn({
        let session = session.clone();
        async move { session.run("SELECT 1").await }
    });

    let frame = loop {
        let text = end.recv_text().await.unwrap();
        if !text.contains("\"ping\"") {
            break text;
        }
    };
    let v: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(v["type"], "runQuery");
    assert_eq!(v["payload"], json!({"sql": "SELECT 1"}));
    assert!(v["requestId"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn rows_accumulate_in_arrival_order() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();
    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run("SELECT n FROM t").await }
    });
    let (request_id, _) = next_run(&mut end).await;

    assert!(end.send(&accepted(&request_id, "q1")).await);
    assert!(end.send(&progress("q1", 0)).await);
    assert!(end.send(&rows("q1", &["n"], vec![vec![json!(1)], vec![json!(2)]])).await);
    assert!(end.send(&rows("q1", &["n"], vec![vec![json!(3)]])).await);
    assert!(end.send(&rows("q1", &["n"], vec![vec![json!(2)]])).await);
    assert!(end.send(&progress("q1", 4)).await);
    assert!(end.send(&done("q1", 3.5, 4)).await);
    let _ = runner.await.unwrap().unwrap();

    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(
        result.rows,
        vec![vec![json!(1)], vec![json!(2)], vec![json!(3)], vec![json!(2)]]
    );
    assert_eq!(result.loaded_rows(), 4);
    assert_eq!(result.progress.and_then(|p| p.rows_sent), Some(4));
}

#[tokio::test]
async fn server_error_keeps_received_rows() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();
    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run("SELECT 1/0").await }
    });
    let (request_id, _) = next_run(&mut end).await;

    assert!(end.send(&accepted(&request_id, "q1")).await);
    assert!(end.send(&rows("q1", &["x"], vec![vec![json!("a")]])).await);
    assert!(end.send(&failed("q1", "division by zero")).await);
    assert!(end.send(&rows("q1", &["x"], vec![vec![json!("late")]])).await);
    let _ = runner.await.unwrap().unwrap();

    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(result.status, QueryStatus::Error);
    assert_eq!(result.error.as_deref(), Some("division by zero"));
    assert_eq!(result.rows, vec![vec![json!("a")]]);
    assert!(result.stats.is_none());
}

#[tokio::test]
async fn ddl_with_unknown_row_count_finishes() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();
    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run("CREATE TABLE t (id int)").await }
    });
    let (request_id, _) = next_run(&mut end).await;

    assert!(end.send(&accepted(&request_id, "q1")).await);
    assert!(
        end.send_text(
            r#"{"type":"queryDone","payload":{"queryId":"q1","stats":{"elapsedMs":3.21,"totalRows":-1}}}"#
        )
        .await
    );
    let _ = runner.await.unwrap().unwrap();

    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(result.status, QueryStatus::Done);
    assert_eq!(result.stats.and_then(|s| s.row_count()), None);
    assert_eq!(result.loaded_rows(), 0);
}

// ── Start handshake failures ──

#[tokio::test]
async fn run_while_disconnected_fails_without_transmitting() {
    let (client, server) = client();
    let session = client.session();

    let err = session.run("SELECT 1").await.unwrap_err();
    assert_matches!(
        err,
        ClientError::ConnectionUnavailable {
            status: ConnectionStatus::Disconnected
        }
    );
    assert_eq!(session.status(), QueryStatus::Error);
    assert_eq!(server.dial_count(), 0);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn start_times_out_and_late_accept_is_ignored() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();

    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run("SELECT pg_sleep(60)").await }
    });
    let (request_id, _) = next_run(&mut end).await;

    let started = tokio::time::Instant::now();
    let err = runner.await.unwrap().unwrap_err();
    assert_eq!(started.elapsed(), Duration::from_millis(5000));
    assert_matches!(err, ClientError::RequestTimeout { timeout_ms: 5000, .. });

    let failed_state = session.snapshot();
    assert_eq!(failed_state.status, QueryStatus::Error);
    assert!(failed_state.error.as_deref().unwrap().contains("timed out"));

    assert!(end.send(&accepted(&request_id, "q1")).await);
    assert!(end.send(&rows("q1", &["x"], vec![vec![json!(1)]])).await);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(session.snapshot(), failed_state);
    assert_eq!(client.pending_requests(), 0);
    assert!(client.registry().is_empty());
}

// ── Cancel ──

#[tokio::test]
async fn cancel_before_accept_is_rejected() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();
    let _runner = tokio::spawn({
        let session = session.clone();
        async move { session.run("SELECT 1").await }
    });
    let _ = next_run(&mut end).await;

    assert_matches!(session.cancel().await, Err(ClientError::QueryNotAccepted));
}

#[tokio::test]
async fn cancel_sends_frame_and_canceled_is_final() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();
    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run("SELECT * FROM big").await }
    });
    let (request_id, _) = next_run(&mut end).await;
    assert!(end.send(&accepted(&request_id, "q1")).await);
    assert!(end.send(&rows("q1", &["id"], vec![vec![json!(1)]])).await);
    let _ = runner.await.unwrap().unwrap();
    let _ = timeout(TIMEOUT, session.wait_until(|r| r.loaded_rows() == 1))
        .await
        .unwrap();

    session.cancel().await.unwrap();
    let frame = loop {
        let text = end.recv_text().await.unwrap();
        if !text.contains("\"ping\"") {
            break text;
        }
    };
    let v: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(v, json!({"type": "cancelQuery", "payload": {"queryId": "q1"}}));
    assert_eq!(session.status(), QueryStatus::Running, "canceled only on ack");

    assert!(end.send(&canceled("q1")).await);
    assert!(end.send(&rows("q1", &["id"], vec![vec![json!(2)]])).await);
    assert!(end.send(&done("q1", 1.0, 2)).await);

    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(result.status, QueryStatus::Canceled);
    tokio::task::yield_now().await;
    let after = session.snapshot();
    assert_eq!(after.status, QueryStatus::Canceled);
    assert_eq!(after.loaded_rows(), 1);
    assert!(after.stats.is_none());
}

#[tokio::test]
async fn cancel_when_idle_or_finished_is_noop() {
    let (client, _server, _end) = connected().await;
    let session = client.session();
    session.cancel().await.unwrap();
    assert_eq!(session.status(), QueryStatus::Idle);
}

#[tokio::test]
async fn facade_run_and_cancel_by_id() {
    let (client, _server, mut end) = connected().await;
    let runner = tokio::spawn(async move {
        let id = client.run_query("SELECT 1").await?;
        client.cancel_query(&id).await?;
        Ok::<_, ClientError>((client, id))
    });

    let (request_id, _) = next_run(&mut end).await;
    assert!(end.send(&accepted(&request_id, "q42")).await);
    let next = end.recv().await;
    assert_eq!(
        next,
        Some(ClientMessage::CancelQuery {
            query_id: qid("q42")
        })
    );
    let (_client, id) = runner.await.unwrap().unwrap();
    assert_eq!(id.as_str(), "q42");
}

// ── Subscriptions ──

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let (client, _server, mut end) = connected().await;
    let client = Arc::new(client);

    let (tx, mut events) = mpsc::unbounded_channel::<QueryEvent>();
    let runner = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            client
                .run_query_with("SELECT 1", move |e| {
                    let _ = tx.send(e.clone());
                })
                .await
        }
    });
    let (request_id, _) = next_run(&mut end).await;
    assert!(end.send(&accepted(&request_id, "q1")).await);
    assert!(end.send(&rows("q1", &["a"], vec![vec![json!(1)]])).await);

    let (query_id, subscription) = runner.await.unwrap().unwrap();
    assert_matches!(events.recv().await, Some(QueryEvent::Rows { .. }));

    // A second observer tells us when later frames have been routed.
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    let _observer = client.subscribe(query_id.clone(), move |e| {
        if matches!(e, QueryEvent::Done { .. }) {
            let _ = done_tx.send(());
        }
    });
    assert_eq!(client.registry().handler_count(&query_id), 2);

    subscription.unsubscribe();
    assert_eq!(client.registry().handler_count(&query_id), 1);

    assert!(end.send(&rows("q1", &["a"], vec![vec![json!(2)]])).await);
    assert!(end.send(&done("q1", 1.0, 2)).await);
    timeout(TIMEOUT, done_rx.recv()).await.unwrap().unwrap();

    assert!(events.try_recv().is_err(), "unsubscribed handler got an event");
}

#[tokio::test]
async fn registry_empties_when_last_handler_leaves() {
    let (client, _server, _end) = connected().await;
    let a = client.subscribe(qid("q1"), |_| {});
    let b = client.subscribe(qid("q1"), |_| {});
    assert!(client.registry().contains(&qid("q1")));
    a.unsubscribe();
    assert!(client.registry().contains(&qid("q1")));
    b.unsubscribe();
    assert!(!client.registry().contains(&qid("q1")));
    assert_eq!(client.registry().len(), 0);
}

#[tokio::test]
async fn concurrent_queries_do_not_interfere() {
    let (client, _server, mut end) = connected().await;
    let first = client.session();
    let second = client.session();

    let r1 = tokio::spawn({
        let s = first.clone();
        async move { s.run("SELECT 'a'").await }
    });
    let (req1, _) = next_run(&mut end).await;
    let r2 = tokio::spawn({
        let s = second.clone();
        async move { s.run("SELECT 'b'").await }
    });
    let (req2, _) = next_run(&mut end).await;

    assert!(end.send(&accepted(&req2, "qb")).await);
    assert!(end.send(&accepted(&req1, "qa")).await);
    assert!(end.send(&rows("qa", &["v"], vec![vec![json!("a1")]])).await);
    assert!(end.send(&rows("qb", &["v"], vec![vec![json!("b1")]])).await);
    assert!(end.send(&rows("qa", &["v"], vec![vec![json!("a2")]])).await);
    assert!(end.send(&failed("qb", "boom")).await);
    assert!(end.send(&done("qa", 2.0, 2)).await);

    assert_eq!(r1.await.unwrap().unwrap().as_str(), "qa");
    assert_eq!(r2.await.unwrap().unwrap().as_str(), "qb");

    let a = timeout(TIMEOUT, first.wait_terminal()).await.unwrap();
    let b = timeout(TIMEOUT, second.wait_terminal()).await.unwrap();
    assert_eq!(a.status, QueryStatus::Done);
    assert_eq!(a.rows, vec![vec![json!("a1")], vec![json!("a2")]]);
    assert_eq!(b.status, QueryStatus::Error);
    assert_eq!(b.rows, vec![vec![json!("b1")]]);
}

#[tokio::test]
async fn new_run_replaces_previous_query() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();

    let r1 = tokio::spawn({
        let s = session.clone();
        async move { s.run("SELECT 1").await }
    });
    let (req1, _) = next_run(&mut end).await;
    assert!(end.send(&accepted(&req1, "q1")).await);
    assert!(end.send(&rows("q1", &["x"], vec![vec![json!(1)]])).await);
    let _ = r1.await.unwrap().unwrap();
    let _ = timeout(TIMEOUT, session.wait_until(|r| r.loaded_rows() == 1))
        .await
        .unwrap();

    let r2 = tokio::spawn({
        let s = session.clone();
        async move { s.run("SELECT 2").await }
    });
    let (req2, _) = next_run(&mut end).await;
    let fresh = session.snapshot();
    assert_eq!(fresh.status, QueryStatus::Starting);
    assert_eq!(fresh.loaded_rows(), 0);
    assert!(fresh.query_id.is_none());
    assert!(!client.registry().contains(&qid("q1")));

    assert!(end.send(&rows("q1", &["x"], vec![vec![json!("stale")]])).await);
    assert!(end.send(&accepted(&req2, "q2")).await);
    assert!(end.send(&rows("q2", &["y"], vec![vec![json!(2)]])).await);
    assert!(end.send(&done("q1", 1.0, 2)).await);
    assert!(end.send(&done("q2", 1.0, 1)).await);
    let _ = r2.await.unwrap().unwrap();

    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(result.query_id, Some(qid("q2")));
    assert_eq!(result.rows, vec![vec![json!(2)]]);
    assert_eq!(result.columns, vec!["y"]);
}

// ── Robustness ──

#[tokio::test]
async fn malformed_frames_are_dropped_and_stream_continues() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();
    let runner = tokio::spawn({
        let s = session.clone();
        async move { s.run("SELECT 1").await }
    });
    let (request_id, _) = next_run(&mut end).await;
    assert!(end.send(&accepted(&request_id, "q1")).await);

    assert!(end.send_text("{not json").await);
    assert!(end.send_text(r#"{"type":"queryTeleported","payload":{"queryId":"q1"}}"#).await);
    assert!(end.send_text(r#"{"type":"queryRows","payload":{"queryId":"q1","rows":"nope"}}"#).await);
    assert!(end.send(&rows("q1", &["x"], vec![vec![json!(1)]])).await);
    assert!(end.send(&done("q1", 1.0, 1)).await);
    let _ = runner.await.unwrap().unwrap();

    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(result.status, QueryStatus::Done);
    assert_eq!(result.rows, vec![vec![json!(1)]]);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn connection_loss_fails_running_query() {
    let (client, _server, mut end) = connected().await;
    let mut events = client.connection_events();
    let session = client.session();
    let runner = tokio::spawn({
        let s = session.clone();
        async move { s.run("SELECT 1").await }
    });
    let (request_id, _) = next_run(&mut end).await;
    assert!(end.send(&accepted(&request_id, "q1")).await);
    assert!(end.send(&rows("q1", &["x"], vec![vec![json!(1)]])).await);
    let _ = runner.await.unwrap().unwrap();
    let _ = timeout(TIMEOUT, session.wait_until(|r| r.loaded_rows() == 1))
        .await
        .unwrap();

    end.close();

    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(result.status, QueryStatus::Error);
    assert_eq!(result.error.as_deref(), Some("connection lost"));
    assert_eq!(result.loaded_rows(), 1);

    let disconnected = timeout(TIMEOUT, async {
        loop {
            if let ConnectionEvent::Disconnected { reason } = events.recv().await.unwrap() {
                return reason;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(disconnected, "connection closed by peer");
}

#[tokio::test]
async fn explicit_disconnect_fails_running_query() {
    let (client, _server, mut end) = connected().await;
    let session = client.session();
    let runner = tokio::spawn({
        let s = session.clone();
        async move { s.run("SELECT 1").await }
    });
    let (request_id, _) = next_run(&mut end).await;
    assert!(end.send(&accepted(&request_id, "q1")).await);
    let _ = runner.await.unwrap().unwrap();

    client.disconnect();
    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(result.status, QueryStatus::Error);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn slow_close_does_not_fail_queries_on_the_next_connection() {
    let (client, mut server) = client();
    server.set_stall_close(true);
    client.connect(None).unwrap();
    let mut old_end = server.accept().await.unwrap();
    client.wait_connected().await.unwrap();

    let old = client.session();
    let runner = tokio::spawn({
        let s = old.clone();
        async move { s.run("SELECT 1").await }
    });
    let (request_id, _) = next_run(&mut old_end).await;
    assert!(old_end.send(&accepted(&request_id, "q1")).await);
    let _ = runner.await.unwrap().unwrap();

    client.disconnect();
    assert_eq!(old.status(), QueryStatus::Error);

    server.set_stall_close(false);
    client.connect(None).unwrap();
    let mut end = server.accept().await.unwrap();
    client.wait_connected().await.unwrap();

    let session = client.session();
    let runner = tokio::spawn({
        let s = session.clone();
        async move { s.run("SELECT 2").await }
    });
    let (request_id, _) = next_run(&mut end).await;
    assert!(end.send(&accepted(&request_id, "q2")).await);
    let _ = runner.await.unwrap().unwrap();

    // Long enough for the stalled close on the old transport to give up.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(old_end.recv_text().await.is_none());
    assert_eq!(session.status(), QueryStatus::Running);

    assert!(end.send(&done("q2", 1.0, 1)).await);
    let result = timeout(TIMEOUT, session.wait_terminal()).await.unwrap();
    assert_eq!(result.status, QueryStatus::Done);
}

// ── Reconnect ──

#[tokio::test(start_paused = true)]
async fn reconnects_after_drop_and_serves_new_queries() {
    let (client, mut server, mut end) = connected().await;
    let mut events = client.connection_events();
    end.close();

    let scheduled = loop {
        if let ConnectionEvent::ReconnectScheduled { attempt, delay } = events.recv().await.unwrap() {
            break (attempt, delay);
        }
    };
    assert_eq!(scheduled, (1, Duration::from_secs(1)));

    let mut end = server.accept().await.unwrap();
    client.wait_connected().await.unwrap();
    assert_eq!(end.url().query(), Some("token=t0ken"));

    let session = client.session();
    let runner = tokio::spawn({
        let s = session.clone();
        async move { s.run("SELECT 1").await }
    });
    let (request_id, _) = next_run(&mut end).await;
    assert!(end.send(&accepted(&request_id, "q9")).await);
    assert!(end.send(&done("q9", 0.5, 0)).await);
    let _ = runner.await.unwrap().unwrap();
    assert_eq!(session.wait_terminal().await.status, QueryStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_five_attempts() {
    let (client, server) = client();
    server.set_refuse(true);
    let mut events = client.connection_events();
    client.connect(None).unwrap();

    let mut delays = Vec::new();
    let attempts = loop {
        match events.recv().await.unwrap() {
            ConnectionEvent::ReconnectScheduled { delay, .. } => delays.push(delay.as_secs()),
            ConnectionEvent::ReconnectExhausted { attempts } => break attempts,
            _ => {}
        }
    };
    assert_eq!(delays, vec![1, 2, 4, 8, 10]);
    assert_eq!(attempts, 5);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(server.dial_count(), 6);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    // A fresh connect starts over.
    server.set_refuse(false);
    client.connect(None).unwrap();
    client.wait_connected().await.unwrap();
    assert_eq!(server.dial_count(), 7);
}
