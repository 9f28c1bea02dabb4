//! End-to-end tests over a real socket.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tailscope_server::{AppContext, BroadcastHub, DEFAULT_QUEUE_CAPACITY, serve, start_watcher};
use tailscope_watcher::{ChangeWatcher, WatchTarget, WatcherConfig};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn start_server(ctx: AppContext) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Arc::new(ctx)));
    format!("127.0.0.1:{}", addr.port())
}

async fn connect(addr: &str) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    client
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn next_json(client: &mut Client) -> Value {
    timeout(Duration::from_secs(10), async {
        loop {
            match client.next().await.expect("socket closed").unwrap() {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

async fn wait_for_subscribers(hub: &BroadcastHub, count: usize) {
    timeout(Duration::from_secs(5), async {
        while hub.subscriber_count() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_requests_over_websocket() {
    let hub = BroadcastHub::spawn(DEFAULT_QUEUE_CAPACITY);
    let ctx = AppContext::new(
        hub.clone(),
        WatchTarget::file("/tmp/app.log"),
        WatcherConfig::default(),
    );
    let addr = start_server(ctx).await;
    let mut client = connect(&addr).await;

    send(&mut client, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut client).await, json!({"type": "pong"}));

    // A bad request gets an error frame and the connection stays usable.
    client
        .send(Message::Text("{not json".into()))
        .await
        .unwrap();
    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");

    send(&mut client, json!({"type": "get_info"})).await;
    assert_eq!(
        next_json(&mut client).await,
        json!({"type": "info", "data": {"type": "file", "path": "/tmp/app.log"}})
    );

    client.close(None).await.unwrap();
    wait_for_subscribers(&hub, 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broadcast_reaches_every_client() {
    let hub = BroadcastHub::spawn(DEFAULT_QUEUE_CAPACITY);
    let ctx = AppContext::new(
        hub.clone(),
        WatchTarget::file("/tmp/app.log"),
        WatcherConfig::default(),
    );
    let addr = start_server(ctx).await;
    let mut first = connect(&addr).await;
    let mut second = connect(&addr).await;
    wait_for_subscribers(&hub, 2).await;

    hub.publish(r#"{"type":"log","data":{"path":"/tmp/app.log","op":"removed","line_changes":[]}}"#)
        .unwrap();

    for client in [&mut first, &mut second] {
        let message = next_json(client).await;
        assert_eq!(message["type"], "log");
        assert_eq!(message["data"]["op"], "removed");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_change_is_pushed() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("app.log");
    std::fs::write(&path, "started\n").unwrap();

    let hub = BroadcastHub::spawn(DEFAULT_QUEUE_CAPACITY);
    let target = WatchTarget::file(&path);
    let mut watcher = ChangeWatcher::with_notify(target.clone()).unwrap();
    start_watcher(&mut watcher, &hub).await.unwrap();

    let addr = start_server(AppContext::new(hub.clone(), target, WatcherConfig::default())).await;
    let mut client = connect(&addr).await;
    wait_for_subscribers(&hub, 1).await;

    std::fs::write(&path, "started\nclient connected\n").unwrap();

    // The OS may report the write more than once; look for the added line.
    let pushed = timeout(Duration::from_secs(10), async {
        loop {
            let message = next_json(&mut client).await;
            let added = message["data"]["line_changes"]
                .as_array()
                .into_iter()
                .flatten()
                .any(|change| change["new_text"] == "client connected");
            if added {
                return message;
            }
        }
    })
    .await
    .expect("no log frame for the write");

    assert_eq!(pushed["type"], "log");
    assert_eq!(pushed["data"]["op"], "modified");
    assert_eq!(pushed["data"]["path"], json!(path));
    assert!(pushed["data"].get("content").is_none());

    watcher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health() {
    let hub = BroadcastHub::spawn(DEFAULT_QUEUE_CAPACITY);
    let ctx = AppContext::new(hub, WatchTarget::file("/tmp/app.log"), WatcherConfig::default());
    let addr = start_server(ctx).await;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("OK"), "{response}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_client_is_disconnected() {
    let hub = BroadcastHub::spawn(1);
    let ctx = AppContext::new(
        hub.clone(),
        WatchTarget::file("/tmp/app.log"),
        WatcherConfig::default(),
    );
    let addr = start_server(ctx).await;

    // This client never reads, so its socket buffers and then its queue fill up.
    let mut stalled = connect(&addr).await;
    wait_for_subscribers(&hub, 1).await;

    let payload: Arc<str> = Arc::from("x".repeat(16 * 1024));
    timeout(Duration::from_secs(10), async {
        while hub.stats().dropped_subscribers == 0 {
            for _ in 0..64 {
                hub.publish(payload.clone()).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("stalled client was never dropped");
    wait_for_subscribers(&hub, 0).await;

    // Once its backlog is drained the connection ends.
    timeout(Duration::from_secs(10), async {
        loop {
            match stalled.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("stalled connection was never torn down");

    let mut healthy = connect(&addr).await;
    wait_for_subscribers(&hub, 1).await;
    hub.publish(r#"{"type":"log","data":{"path":"/tmp/app.log","op":"created","line_changes":[]}}"#)
        .unwrap();
    // Skip any tail of the burst that was still in the intake when it connected.
    let created = timeout(Duration::from_secs(10), async {
        loop {
            match healthy.next().await.expect("socket closed").unwrap() {
                Message::Text(text) if text.as_str().starts_with('{') => {
                    return serde_json::from_str::<Value>(text.as_str()).unwrap();
                }
                _ => continue,
            }
        }
    })
    .await
    .expect("healthy client received nothing");
    assert_eq!(created["data"]["op"], "created");
    assert_eq!(hub.subscriber_count(), 1);
}
