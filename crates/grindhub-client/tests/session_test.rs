//! Drives full client sessions against an in-process server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use grindhub_client::{
    spawn_session, ChatMessage, ClientConfig, Context, SessionCommand, SessionNotification,
    SessionState,
};
use grindhub_server::{build_router, AppState, ServerConfig};
use grindhub_shared::{MessageKind, RoomId, UserId};
use grindhub_store::Database;

async fn start_test_server() -> (SocketAddr, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = Database::open_at(&dir.path().join("grindhub.db")).expect("Failed to open DB");
    let config = ServerConfig {
        presence_coalesce: false,
        ..ServerConfig::default()
    };
    let app = build_router(AppState::new(config, db));

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
    (addr, dir)
}

/// TCP relay in front of the server whose links can be cut and restored.
struct Relay {
    addr: SocketAddr,
    accepting: Arc<AtomicBool>,
    links: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Relay {
    async fn start(upstream: SocketAddr) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepting = Arc::new(AtomicBool::new(true));
        let links: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::default();

        let (flag, held) = (accepting.clone(), links.clone());
        tokio::spawn(async move {
            while let Ok((mut inbound, _)) = listener.accept().await {
                if !flag.load(Ordering::SeqCst) {
                    continue;
                }
                let link = tokio::spawn(async move {
                    if let Ok(mut outbound) = TcpStream::connect(upstream).await {
                        let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
                held.lock().unwrap().push(link);
            }
        });

        Self {
            addr,
            accepting,
            links,
        }
    }

    fn cut(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        for link in self.links.lock().unwrap().drain(..) {
            link.abort();
        }
    }

    fn restore(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        server_url: format!("http://{addr}"),
        reconnect_interval: Duration::from_millis(20),
        max_reconnect_attempts: 2,
        ..ClientConfig::default()
    }
}

async fn expect(
    rx: &mut mpsc::Receiver<SessionNotification>,
    pred: impl Fn(&SessionNotification) -> bool,
) -> SessionNotification {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(left, rx.recv()).await {
            Ok(Some(n)) if pred(&n) => return n,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("session ended"),
            Err(_) => panic!("timed out waiting for notification"),
        }
    }
}

#[tokio::test]
async fn test_session_connects_backfills_and_receives() {
    let (addr, _dir) = start_test_server().await;
    let http = reqwest::Client::new();

    let room: Value = http
        .post(format!("http://{addr}/api/rooms"))
        .header("x-user-id", "alice")
        .json(&json!({ "name": "Heaps", "description": "k-way merge", "category": "algorithms" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let room_id: RoomId = room["id"].as_str().unwrap().parse().unwrap();
    http.post(format!("http://{addr}/api/rooms/{room_id}/join"))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();

    let (alice, mut alice_rx) = spawn_session(config_for(addr), UserId::new("alice")).unwrap();
    expect(&mut alice_rx, |n| {
        matches!(n, SessionNotification::StateChanged(SessionState::Connected))
    })
    .await;

    alice.send(SessionCommand::OpenRoom(room_id)).await.unwrap();
    match expect(&mut alice_rx, |n| matches!(n, SessionNotification::History { .. })).await {
        SessionNotification::History { context, messages } => {
            assert_eq!(context, Context::Room(room_id));
            assert!(messages.is_empty());
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    let (bob, mut bob_rx) = spawn_session(config_for(addr), UserId::new("bob")).unwrap();
    expect(&mut bob_rx, |n| {
        matches!(n, SessionNotification::StateChanged(SessionState::Connected))
    })
    .await;

    let both = vec![UserId::new("alice"), UserId::new("bob")];
    expect(&mut alice_rx, |n| matches!(n, SessionNotification::OnlineUsers(u) if *u == both)).await;

    bob.send(SessionCommand::SendRoomMessage {
        room_id,
        body: "merge k sorted lists?".into(),
        kind: MessageKind::Text,
        code_language: None,
    })
    .await
    .unwrap();

    match expect(&mut alice_rx, |n| matches!(n, SessionNotification::Message { .. })).await {
        SessionNotification::Message { context, message } => {
            assert_eq!(context, Context::Room(room_id));
            assert_eq!(message.sender_id, UserId::new("bob"));
            assert_eq!(message.body, "merge k sorted lists?");
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    bob.send(SessionCommand::Logout).await.unwrap();
    expect(&mut bob_rx, |n| {
        matches!(n, SessionNotification::StateChanged(SessionState::Disconnected))
    })
    .await;

    let alone = vec![UserId::new("alice")];
    expect(&mut alice_rx, |n| matches!(n, SessionNotification::OnlineUsers(u) if *u == alone)).await;
}

#[tokio::test]
async fn test_session_gives_up_after_bounded_retries() {
    // Reserve a port, then free it so every connect is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (_cmd, mut rx) = spawn_session(config_for(addr), UserId::new("alice")).unwrap();

    let mut states = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(3), rx.recv()).await {
            Ok(Some(SessionNotification::StateChanged(state))) => states.push(state),
            Ok(Some(SessionNotification::Offline)) => break,
            Ok(Some(_)) => {}
            other => panic!("session did not give up: {other:?}"),
        }
    }

    assert_eq!(
        states,
        vec![
            SessionState::Connecting,
            SessionState::Reconnecting { attempt: 1 },
            SessionState::Reconnecting { attempt: 2 },
            SessionState::Disconnected,
        ]
    );
}

#[tokio::test]
async fn test_send_while_offline_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (cmd, mut rx) = spawn_session(config_for(addr), UserId::new("alice")).unwrap();
    expect(&mut rx, |n| matches!(n, SessionNotification::Offline)).await;

    cmd.send(SessionCommand::SendDirectMessage {
        receiver_id: UserId::new("bob"),
        body: "are you there?".into(),
        kind: MessageKind::Text,
        image: None,
    })
    .await
    .unwrap();
    expect(&mut rx, |n| matches!(n, SessionNotification::NotSent(_))).await;
}

#[tokio::test]
async fn test_reconnect_refetches_messages_missed_while_away() {
    let (addr, _dir) = start_test_server().await;
    let relay = Relay::start(addr).await;
    let http = reqwest::Client::new();

    let room: Value = http
        .post(format!("http://{addr}/api/rooms"))
        .header("x-user-id", "alice")
        .json(&json!({ "name": "Graphs", "description": "shortest paths", "category": "algorithms" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let room_id: RoomId = room["id"].as_str().unwrap().parse().unwrap();
    http.post(format!("http://{addr}/api/rooms/{room_id}/join"))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();

    let patient = ClientConfig {
        server_url: format!("http://{}", relay.addr),
        reconnect_interval: Duration::from_millis(100),
        max_reconnect_attempts: 50,
        ..ClientConfig::default()
    };
    let (alice, mut alice_rx) = spawn_session(patient, UserId::new("alice")).unwrap();
    expect(&mut alice_rx, |n| {
        matches!(n, SessionNotification::StateChanged(SessionState::Connected))
    })
    .await;
    alice.send(SessionCommand::OpenRoom(room_id)).await.unwrap();
    expect(&mut alice_rx, |n| matches!(n, SessionNotification::History { .. })).await;

    let (bob, mut bob_rx) = spawn_session(config_for(addr), UserId::new("bob")).unwrap();
    expect(&mut bob_rx, |n| {
        matches!(n, SessionNotification::StateChanged(SessionState::Connected))
    })
    .await;

    relay.cut();
    expect(&mut alice_rx, |n| {
        matches!(n, SessionNotification::StateChanged(SessionState::Reconnecting { .. }))
    })
    .await;

    // Wait until the server has dropped alice, so the relay skips her.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let online: Vec<UserId> = http
            .get(format!("http://{addr}/api/presence"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if online == vec![UserId::new("bob")] {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "alice never went offline");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    bob.send(SessionCommand::SendRoomMessage {
        room_id,
        body: "dijkstra or bellman-ford?".into(),
        kind: MessageKind::Text,
        code_language: None,
    })
    .await
    .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let stored: Vec<Value> = http
            .get(format!("http://{addr}/api/rooms/{room_id}/messages"))
            .header("x-user-id", "bob")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if !stored.is_empty() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "message was never stored");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    relay.restore();
    let missed = |messages: &[ChatMessage]| {
        messages.iter().any(|m| m.body == "dijkstra or bellman-ford?")
    };
    match expect(&mut alice_rx, |n| {
        matches!(n, SessionNotification::History { messages, .. } if missed(messages.as_slice()))
    })
    .await
    {
        SessionNotification::History { context, messages } => {
            assert_eq!(context, Context::Room(room_id));
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].sender_id, UserId::new("bob"));
        }
        other => panic!("unexpected notification: {other:?}"),
    }
}
