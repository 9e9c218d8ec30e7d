//! Integration tests running the log-stream client against a local
//! websocket server.

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crcon::models::{
    LogMessageType, LogStreamObject, LogStreamResponse, StructuredLogLine,
};
use crcon::{BackoffConfig, LogStreamClient, ServerConnectionDetails};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("http://{addr}"))
}

/// Short delays so reconnect tests finish quickly.
fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay: 0.05,
        min_delay: 0.05,
        max_delay: 0.2,
        factor: 1.5,
        max_attempts: None,
    }
}

fn log_object(id: &str, action: LogMessageType) -> LogStreamObject {
    LogStreamObject {
        id: Some(id.to_string()),
        log: StructuredLogLine {
            version: 1,
            timestamp_ms: 1_526_919_030_474,
            event_time: Utc::now(),
            relative_time_ms: None,
            raw: String::new(),
            line_without_time: None,
            action,
            player_name_1: None,
            player_id_1: None,
            player_name_2: None,
            player_id_2: None,
            weapon: None,
            message: String::new(),
            sub_content: None,
        },
    }
}

fn frame(logs: Vec<LogStreamObject>, last_seen_id: Option<&str>, error: Option<&str>) -> Message {
    let body = serde_json::to_string(&LogStreamResponse {
        logs,
        last_seen_id: last_seen_id.map(str::to_string),
        error: error.map(str::to_string),
    })
    .unwrap();
    Message::Text(body)
}

fn client_for(url: &str, queue: mpsc::Sender<LogStreamObject>) -> LogStreamClient {
    let details = ServerConnectionDetails::new(url, "test-key", None).unwrap();
    let mut client = LogStreamClient::new(details, queue, fast_backoff());
    client.log_types = Some(vec![LogMessageType::MatchStart, LogMessageType::MatchEnd]);
    client
}

async fn read_init(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
) -> serde_json::Value {
    match ws.next().await.unwrap().unwrap() {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected init frame: {other:?}"),
    }
}

#[tokio::test]
async fn streams_logs_and_resumes_after_a_server_drop() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = mpsc::channel(16);
    let mut client = client_for(&url, tx);

    let server = tokio::spawn(async move {
        // first session: the init frame carries the action filter and a
        // null last_seen_id
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let init = read_init(&mut ws).await;
        assert_eq!(
            init["actions"],
            serde_json::json!(["MATCH START", "MATCH ENDED"])
        );
        assert!(init.as_object().unwrap().contains_key("last_seen_id"));
        assert_eq!(init["last_seen_id"], serde_json::Value::Null);

        ws.send(frame(
            vec![log_object("1-0", LogMessageType::MatchStart)],
            Some("1-0"),
            None,
        ))
        .await
        .unwrap();
        drop(ws);

        // second session: the client resumes from the observed cursor
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let init = read_init(&mut ws).await;
        assert_eq!(init["last_seen_id"], "1-0");

        ws.send(frame(
            vec![log_object("2-0", LogMessageType::MatchEnd)],
            Some("2-0"),
            None,
        ))
        .await
        .unwrap();
        // hold the session open until the client is cancelled
        while ws.next().await.is_some() {}
    });

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let run = tokio::spawn(async move { client.run(run_cancel).await });

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.log.action, LogMessageType::MatchStart);

    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.log.action, LogMessageType::MatchEnd);

    cancel.cancel();
    run.await.unwrap().unwrap();
    server.abort();
}

#[tokio::test]
async fn server_error_frame_triggers_a_reconnect() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = mpsc::channel(16);
    let mut client = client_for(&url, tx);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        read_init(&mut ws).await;
        ws.send(frame(Vec::new(), None, Some("log stream not allowed")))
            .await
            .unwrap();

        // the client reconnects after the reported error
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        read_init(&mut ws).await;
        ws.send(frame(
            vec![log_object("5-0", LogMessageType::MatchStart)],
            Some("5-0"),
            None,
        ))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let run = tokio::spawn(async move { client.run(run_cancel).await });

    let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.log.action, LogMessageType::MatchStart);

    cancel.cancel();
    run.await.unwrap().unwrap();
    server.abort();
}
