//! Shared harness: an in-process server on a random port backed by a
//! throwaway SQLite file.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use grindhub_server::{build_router, AppState, ServerConfig};
use grindhub_shared::{ClientEvent, RoomId, ServerEvent, UserId};
use grindhub_store::Database;

pub struct TestServer {
    pub addr: SocketAddr,
    pub http: reqwest::Client,
    _dir: tempfile::TempDir,
}

pub async fn start_test_server() -> TestServer {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = Database::open_at(&dir.path().join("grindhub.db")).expect("Failed to open DB");

    let config = ServerConfig {
        presence_coalesce: false,
        message_burst: 100.0,
        http_burst: 1000.0,
        ..ServerConfig::default()
    };
    let state = AppState::new(config, db);

    let app = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        addr,
        http: reqwest::Client::new(),
        _dir: dir,
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}/api{}", self.addr, path)
    }

    pub async fn get(&self, user: &str, path: &str) -> reqwest::Response {
        self.http
            .get(self.url(path))
            .header("x-user-id", user)
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, user: &str, path: &str, body: Value) -> reqwest::Response {
        self.http
            .post(self.url(path))
            .header("x-user-id", user)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, user: &str, path: &str, body: Value) -> reqwest::Response {
        self.http
            .put(self.url(path))
            .header("x-user-id", user)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Create a room owned by `creator` and add `members` to it.
    pub async fn room_with(&self, creator: &str, members: &[&str]) -> RoomId {
        let resp = self
            .post(
                creator,
                "/rooms",
                json!({
                    "name": "Graphs",
                    "description": "BFS and friends",
                    "category": "algorithms",
                }),
            )
            .await;
        assert_eq!(resp.status(), 201);
        let room: Value = resp.json().await.unwrap();
        let room_id: RoomId = room["id"].as_str().unwrap().parse().unwrap();

        for member in members {
            let resp = self
                .post(member, &format!("/rooms/{room_id}/join"), json!({}))
                .await;
            assert_eq!(resp.status(), 200);
        }
        room_id
    }

    /// Open a socket. A `None` user connects without identity.
    pub async fn connect(&self, user: Option<&str>) -> WsClient {
        let url = match user {
            Some(user) => format!("ws://{}/ws?userId={user}", self.addr),
            None => format!("ws://{}/ws", self.addr),
        };
        let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        WsClient { stream }
    }

    /// Open a socket for `user` and wait until the server lists it online.
    pub async fn connect_online(&self, user: &str) -> WsClient {
        let mut client = self.connect(Some(user)).await;
        let me = UserId::new(user);
        client
            .expect(|event| matches!(event, ServerEvent::OnlineUsersChanged(users) if users.contains(&me)))
            .await;
        client
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, event: ClientEvent) {
        let json = event.to_json().unwrap();
        self.stream.send(Message::Text(json.into())).await.unwrap();
    }

    /// Next server event, or `None` if nothing arrives within `wait`.
    pub async fn next_within(&mut self, wait: Duration) -> Option<ServerEvent> {
        loop {
            match tokio::time::timeout(wait, self.stream.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    return Some(ServerEvent::from_json(text.as_str()).unwrap());
                }
                Ok(Some(Ok(_))) => continue,
                _ => return None,
            }
        }
    }

    /// Skip events until one matches, failing after two seconds.
    pub async fn expect(&mut self, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_within(left).await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("timed out waiting for event"),
            }
        }
    }

    /// Everything that arrives in the next `wait`.
    pub async fn drain(&mut self, wait: Duration) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.next_within(wait).await {
            out.push(event);
        }
        out
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Poll `path` until it returns a non-empty JSON array.
pub async fn poll_history(server: &TestServer, user: &str, path: &str) -> Vec<Value> {
    for _ in 0..50 {
        let resp = server.get(user, path).await;
        assert_eq!(resp.status(), 200);
        let items: Vec<Value> = resp.json().await.unwrap();
        if !items.is_empty() {
            return items;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("history stayed empty: {path}");
}
