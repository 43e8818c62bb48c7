#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use wsbot::bot::Bot;
use wsbot::config::AppConfig;
use wsbot::store::{Action, FileStore, Record, read_records};
use wsbot::ws::ConnectionManager;

/// Serve one client: push `frames`, then hold the connection open until the
/// client goes away.
async fn serve_frames(frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });

    format!("ws://{addr}/ws")
}

async fn wait_for_records(path: &Path, count: usize) -> Vec<Record> {
    timeout(Duration::from_secs(5), async {
        loop {
            let records = read_records(path).unwrap();
            if records.len() >= count {
                return records;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn records_commands_received_over_websocket() {
    let frames = vec![
        r#"{"post_type":"meta_event","meta_event_type":"lifecycle","sub_type":"connect"}"#.to_owned(),
        r#"{"post_type":"message","message_type":"group","user_id":10000,"message":"上班","time":1700000000}"#
            .to_owned(),
        r#"{"post_type":"message","user_id":10001,"message":"hello"}"#.to_owned(),
        r#"[{"user_id":"10002","text":"下班"},{"post_type":"meta_event","meta_event_type":"heartbeat"}]"#
            .to_owned(),
    ];
    let url = serve_frames(frames).await;

    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "ws:\n  url: {url}\n  heartbeat_sec: 0\nstore:\n  path: {}\n",
        dir.path().join("events.jsonl").display()
    );
    let config = AppConfig::from_yaml(&yaml).unwrap();

    let bot = Arc::new(Bot::new(FileStore::open(&config.store.path).unwrap()));
    let handler = {
        let bot = Arc::clone(&bot);
        move |payload: &[u8]| bot.handle(payload)
    };
    let manager = ConnectionManager::new(config.ws.url.clone(), config.to_ws_config(), handler);

    manager.start(&CancellationToken::new()).unwrap();

    let records = wait_for_records(&config.store.path, 2).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].user_id, "10000");
    assert_eq!(records[0].action, Action::ClockIn);
    assert_eq!(records[1].user_id, "10002");
    assert_eq!(records[1].action, Action::ClockOut);
    assert!(bot.heartbeat_age() < Duration::from_secs(5), "heartbeat meta event seen");

    manager.close().await.unwrap();
}

#[test]
fn example_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.yaml");

    let config = AppConfig::load(path).unwrap();

    assert_eq!(config.ws.url, "ws://127.0.0.1:8081/ws");
    assert_eq!(config.ws.heartbeat_sec, 30);
    assert_eq!(config.to_ws_config().reconnect.max_attempts, None);
}
