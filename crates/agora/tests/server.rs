//! Integration tests for the Agora server: subscription validation,
//! live fan-out, disconnect, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use agora::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage, http::StatusCode};
use tokio_util::sync::CancellationToken;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer<S: RoomStore = MemoryStore> {
    addr: String,
    service: RoomService<S>,
    registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), AgoraError>>,
}

async fn start() -> TestServer {
    let builder = AgoraServerBuilder::new().handshake_timeout(Duration::from_secs(2));
    start_with(builder, MemoryStore::new()).await
}

async fn start_with<S: RoomStore>(builder: AgoraServerBuilder, store: S) -> TestServer<S> {
    let server = builder
        .bind("127.0.0.1:0")
        .build(store)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let service = server.service();
    let registry = server.registry();
    let shutdown = server.shutdown_token();
    let task = tokio::spawn(server.run());
    TestServer {
        addr,
        service,
        registry,
        shutdown,
        task,
    }
}

impl<S: RoomStore> TestServer<S> {
    async fn subscribe(&self, room_id: RoomId) -> Ws {
        let before = self.registry.subscriber_count(room_id).await;
        let (ws, _) = tokio_tungstenite::connect_async(format!(
            "ws://{}/subscribe/{room_id}",
            self.addr
        ))
        .await
        .expect("subscription should be accepted");
        self.wait_for_count(room_id, before + 1).await;
        ws
    }

    async fn wait_for_count(&self, room_id: RoomId, expected: usize) {
        let reached = timeout(Duration::from_secs(2), async {
            while self.registry.subscriber_count(room_id).await != expected {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "room never reached {expected} subscribers");
    }

    async fn reject_status(&self, path: &str) -> StatusCode {
        match tokio_tungstenite::connect_async(format!("ws://{}{path}", self.addr)).await {
            Err(tungstenite::Error::Http(response)) => response.status(),
            Err(e) => panic!("expected HTTP rejection, got {e}"),
            Ok(_) => panic!("upgrade of {path} should have been refused"),
        }
    }

    /// Sends a plain HTTP/1.1 request, no upgrade headers, and returns the
    /// status code and body.
    async fn plain_request(&self, method: &str, path: &str) -> (u16, String) {
        let mut stream = tokio::net::TcpStream::connect(&self.addr).await.unwrap();
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
            self.addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut raw = String::new();
        timeout(Duration::from_secs(2), stream.read_to_string(&mut raw))
            .await
            .expect("timed out waiting for response")
            .unwrap();
        let status = raw
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("response should start with a status line");
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();
        (status, body)
    }
}

async fn next_text(ws: &mut Ws) -> String {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            WsMessage::Text(text) => return text.to_string(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn assert_silent(ws: &mut Ws) {
    let got = timeout(Duration::from_millis(100), ws.next()).await;
    assert!(got.is_err(), "expected no frame, got {got:?}");
}

// =========================================================================
// Validation before upgrade
// =========================================================================

#[tokio::test]
async fn test_malformed_room_id_is_rejected_with_400() {
    let server = start().await;
    assert_eq!(
        server.reject_status("/subscribe/not-a-uuid").await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(server.registry.total_subscribers().await, 0);
}

#[tokio::test]
async fn test_unknown_room_is_rejected_with_404() {
    let server = start().await;
    let path = format!("/subscribe/{}", RoomId::new());
    assert_eq!(server.reject_status(&path).await, StatusCode::NOT_FOUND);
    assert_eq!(server.registry.total_subscribers().await, 0);
}

#[tokio::test]
async fn test_existing_room_without_upgrade_is_rejected() {
    let server = start().await;
    let room = server.service.create_room("main", "rust").await.unwrap();

    let (status, body) = server
        .plain_request("GET", &format!("/subscribe/{}", room.id))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body, "websocket upgrade required");
    assert_eq!(server.registry.total_subscribers().await, 0);
}

#[tokio::test]
async fn test_non_get_on_subscribe_route_is_405() {
    let server = start().await;
    let room = server.service.create_room("main", "rust").await.unwrap();

    let (status, _) = server
        .plain_request("POST", &format!("/subscribe/{}", room.id))
        .await;
    assert_eq!(status, 405);
}

#[tokio::test]
async fn test_other_paths_are_rejected_with_404() {
    let server = start().await;
    assert_eq!(server.reject_status("/rooms").await, StatusCode::NOT_FOUND);
}

// =========================================================================
// Live fan-out
// =========================================================================

#[tokio::test]
async fn test_answered_reaches_room_subscribers_only() {
    let server = start().await;
    let r = server.service.create_room("main", "rust").await.unwrap();
    let r2 = server.service.create_room("side", "go").await.unwrap();
    let message = server
        .service
        .create_message(&r.id.to_string(), "is async hard?")
        .await
        .unwrap();

    let mut s1 = server.subscribe(r.id).await;
    let mut s2 = server.subscribe(r.id).await;
    let mut s3 = server.subscribe(r2.id).await;

    server
        .service
        .mark_answered(&r.id.to_string(), &message.id.to_string())
        .await
        .unwrap();

    let expected = format!(r#"{{"type":"answered","message_id":"{}"}}"#, message.id);
    assert_eq!(next_text(&mut s1).await, expected);
    assert_eq!(next_text(&mut s2).await, expected);
    assert_silent(&mut s3).await;
}

#[tokio::test]
async fn test_room_activity_streams_in_order() {
    let server = start().await;
    let room = server.service.create_room("main", "rust").await.unwrap();
    let rid = room.id.to_string();
    let mut ws = server.subscribe(room.id).await;

    let message = server.service.create_message(&rid, "first?").await.unwrap();
    let mid = message.id.to_string();
    server.service.react_to_message(&rid, &mid).await.unwrap();
    server.service.remove_reaction(&rid, &mid).await.unwrap();
    server.service.mark_answered(&rid, &mid).await.unwrap();

    let kinds: Vec<String> = {
        let mut kinds = Vec::new();
        for _ in 0..4 {
            let value: serde_json::Value =
                serde_json::from_str(&next_text(&mut ws).await).unwrap();
            assert_eq!(value["message_id"], mid);
            kinds.push(value["type"].as_str().unwrap().to_string());
        }
        kinds
    };
    assert_eq!(
        kinds,
        ["message_created", "reaction_added", "reaction_removed", "answered"]
    );
}

// =========================================================================
// Idle timeout
// =========================================================================

async fn start_with_idle_timeout(idle: Duration) -> TestServer {
    let builder = AgoraServerBuilder::new().broadcast_config(BroadcastConfig {
        idle_timeout: Some(idle),
        ..BroadcastConfig::default()
    });
    start_with(builder, MemoryStore::new()).await
}

#[tokio::test]
async fn test_client_that_only_pings_is_not_idle_timed_out() {
    let server = start_with_idle_timeout(Duration::from_millis(300)).await;
    let room = server.service.create_room("main", "rust").await.unwrap();
    let mut ws = server.subscribe(room.id).await;

    for _ in 0..10 {
        ws.send(WsMessage::Ping(Default::default())).await.unwrap();
        sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(server.registry.subscriber_count(room.id).await, 1);
}

#[tokio::test]
async fn test_reading_client_answers_server_pings_and_stays() {
    let server = start_with_idle_timeout(Duration::from_millis(300)).await;
    let room = server.service.create_room("main", "rust").await.unwrap();
    let mut ws = server.subscribe(room.id).await;

    // Never sends anything itself; pongs go out as it reads.
    let (pings_tx, mut pings_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, WsMessage::Ping(_)) {
                let _ = pings_tx.send(());
            }
        }
    });

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(server.registry.subscriber_count(room.id).await, 1);
    assert!(pings_rx.try_recv().is_ok(), "server never pinged");
}

#[tokio::test]
async fn test_silent_client_is_idle_timed_out() {
    let server = start_with_idle_timeout(Duration::from_millis(200)).await;
    let room = server.service.create_room("main", "rust").await.unwrap();
    // Neither reads nor writes, so server pings go unanswered.
    let _ws = server.subscribe(room.id).await;

    server.wait_for_count(room.id, 0).await;
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn test_client_disconnect_deregisters() {
    let server = start().await;
    let room = server.service.create_room("main", "rust").await.unwrap();
    let mut ws = server.subscribe(room.id).await;
    let _stay = server.subscribe(room.id).await;

    ws.send(WsMessage::Close(None)).await.unwrap();
    drop(ws);

    server.wait_for_count(room.id, 1).await;

    // Publishing afterwards is unaffected.
    let rid = room.id.to_string();
    assert!(server.service.create_message(&rid, "anyone?").await.is_ok());
}

#[tokio::test]
async fn test_shutdown_closes_subscriptions_and_stops_server() {
    let server = start().await;
    let room = server.service.create_room("main", "rust").await.unwrap();
    let mut ws = server.subscribe(room.id).await;

    server.shutdown.cancel();

    let ended = timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "client was not disconnected");

    let result = timeout(Duration::from_secs(2), server.task)
        .await
        .expect("server did not stop")
        .expect("server task panicked");
    assert!(result.is_ok());
    assert_eq!(server.registry.total_subscribers().await, 0);
}

/// Delegates to [`MemoryStore`], except that room lookups never finish.
struct StalledStore(MemoryStore);

impl RoomStore for StalledStore {
    async fn create_room(&self, name: &str, theme: &str) -> Result<Room, StoreError> {
        self.0.create_room(name, theme).await
    }

    async fn get_room(&self, _id: RoomId) -> Result<Room, StoreError> {
        std::future::pending().await
    }

    async fn list_rooms(&self, limit: usize, offset: usize) -> Result<Vec<Room>, StoreError> {
        self.0.list_rooms(limit, offset).await
    }

    async fn create_message(&self, room_id: RoomId, text: &str) -> Result<Message, StoreError> {
        self.0.create_message(room_id, text).await
    }

    async fn get_message(&self, id: MessageId) -> Result<Message, StoreError> {
        self.0.get_message(id).await
    }

    async fn list_messages(&self, room_id: RoomId) -> Result<Vec<Message>, StoreError> {
        self.0.list_messages(room_id).await
    }

    async fn add_reaction(&self, id: MessageId) -> Result<Message, StoreError> {
        self.0.add_reaction(id).await
    }

    async fn remove_reaction(&self, id: MessageId) -> Result<Message, StoreError> {
        self.0.remove_reaction(id).await
    }

    async fn mark_answered(&self, id: MessageId) -> Result<Message, StoreError> {
        self.0.mark_answered(id).await
    }
}

#[tokio::test]
async fn test_shutdown_does_not_wait_for_requests_still_validating() {
    let builder = AgoraServerBuilder::new().handshake_timeout(Duration::from_secs(30));
    let server = start_with(builder, StalledStore(MemoryStore::new())).await;

    let url = format!("ws://{}/subscribe/{}", server.addr, RoomId::new());
    let client = tokio::spawn(async move { tokio_tungstenite::connect_async(url).await });
    // Give the request time to reach the stalled lookup.
    sleep(Duration::from_millis(100)).await;

    server.shutdown.cancel();

    let result = timeout(Duration::from_secs(2), server.task)
        .await
        .expect("server waited on a validating request")
        .expect("server task panicked");
    assert!(result.is_ok());

    match timeout(Duration::from_secs(2), client).await.unwrap().unwrap() {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        Err(_) => {}
        Ok(_) => panic!("a request for an unchecked room was upgraded"),
    }
    assert_eq!(server.registry.total_subscribers().await, 0);
}
