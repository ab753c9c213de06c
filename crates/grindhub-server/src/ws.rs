//! WebSocket endpoint and the per-connection actor.
//!
//! Each socket is split into a writer task, which owns the sink and drains
//! both the hub's event queue and local control frames, and a reader loop
//! that decodes [`ClientEvent`]s strictly in arrival order. A ping task
//! closes the socket when a pong does not come back in time.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use grindhub_shared::{ClientEvent, ConnectionId, RejectReason, RoomId, ServerEvent, UserId};

use crate::hub::{EventSink, HubCommand};
use crate::relay;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// `GET /ws?userId=…`
///
/// A missing or blank `userId` still upgrades; the connection is simply
/// never registered.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = UserId::parse_handshake(query.user_id.as_deref());
    ws.on_upgrade(move |socket| run_connection(socket, state, user))
}

pub async fn run_connection(socket: WebSocket, state: AppState, user: Option<UserId>) {
    let conn = ConnectionId::new();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<Message>();

    let writer_handle = tokio::spawn(writer_task(ws_sender, event_rx, control_rx));

    if !state
        .hub
        .send(HubCommand::Connect {
            conn,
            user: user.clone(),
            sink: event_tx.clone(),
        })
        .await
    {
        warn!(conn = %conn, "hub unavailable, dropping connection");
        writer_handle.abort();
        return;
    }

    info!(conn = %conn, user_id = ?user, "WebSocket actor started");

    // Pong tracking for the ping task.
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();
    let (timed_out_tx, mut timed_out) = oneshot::channel::<()>();
    let ping_tx = control_tx.clone();
    let (ping_every, pong_within) = (state.config.ping_interval, state.config.pong_timeout);
    let ping_handle = tokio::spawn(async move {
        let mut ticker = interval(ping_every);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if ping_tx.send(Message::Ping(vec![0x67, 0x68].into())).is_err() {
                break;
            }
            match timeout(pong_within, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    warn!(conn = %conn, "Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    let _ = timed_out_tx.send(());
                    break;
                }
            }
        }
    });

    let session = Session {
        conn,
        user: user.clone(),
        events: event_tx,
        state: &state,
    };

    loop {
        let incoming = tokio::select! {
            incoming = ws_receiver.next() => incoming,
            _ = &mut timed_out => break,
        };
        match incoming {
            Some(Ok(Message::Text(text))) => session.on_text(text.as_str()).await,
            Some(Ok(Message::Binary(_))) => {
                session.reply(ServerEvent::Error {
                    message: "binary frames are not supported".into(),
                });
            }
            Some(Ok(Message::Pong(_))) => {
                let _ = pong_tx.send(());
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = control_tx.send(Message::Pong(data));
            }
            Some(Ok(Message::Close(frame))) => {
                info!(conn = %conn, reason = ?frame, "Client initiated close");
                break;
            }
            Some(Err(e)) => {
                warn!(conn = %conn, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                debug!(conn = %conn, "WebSocket stream ended");
                break;
            }
        }
    }

    ping_handle.abort();
    writer_handle.abort();

    state
        .hub
        .send(HubCommand::Disconnect { conn, user: user.clone() })
        .await;

    info!(conn = %conn, user_id = ?user, "WebSocket actor stopped");
}

/// Forward hub events and control frames to the socket until either side
/// closes.
async fn writer_task(
    mut sink: SplitSink<WebSocket, Message>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    mut control: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        let frame = tokio::select! {
            event = events.recv() => match event {
                Some(event) => match event.to_json() {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        warn!(event = event.name(), error = %e, "failed to encode event");
                        continue;
                    }
                },
                None => break,
            },
            frame = control.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let closing = matches!(frame, Message::Close(_));
        if sink.send(frame).await.is_err() || closing {
            break;
        }
    }
}

/// Per-connection view used while dispatching client events.
struct Session<'a> {
    conn: ConnectionId,
    user: Option<UserId>,
    events: EventSink,
    state: &'a AppState,
}

impl Session<'_> {
    fn reply(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }

    fn reject(&self, room_id: Option<RoomId>, receiver_id: Option<UserId>, reason: RejectReason) {
        debug!(conn = %self.conn, %reason, "message rejected");
        self.reply(ServerEvent::MessageRejected {
            room_id,
            receiver_id,
            reason,
        });
    }

    async fn on_text(&self, text: &str) {
        let event = match ClientEvent::from_json(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(conn = %self.conn, error = %e, "undecodable client event");
                self.reply(ServerEvent::Error {
                    message: format!("invalid event: {e}"),
                });
                return;
            }
        };

        match event {
            ClientEvent::SendRoomMessage {
                room_id,
                body,
                kind,
                code_language,
            } => {
                let Some(sender) = self.admit(Some(room_id), None, &body, None).await else {
                    return;
                };
                let members = match relay::authorize_room(&self.state.db, room_id, &sender).await {
                    Ok(members) => members,
                    Err(reason) => return self.reject(Some(room_id), None, reason),
                };
                let message = relay::room_message(sender, room_id, body, kind, code_language);
                self.state
                    .hub
                    .send(HubCommand::RelayRoom {
                        origin: self.conn,
                        message,
                        members,
                    })
                    .await;
            }
            ClientEvent::SendDirectMessage {
                receiver_id,
                body,
                kind,
                image,
            } => {
                let Some(sender) = self
                    .admit(None, Some(&receiver_id), &body, image.as_deref())
                    .await else {
                    return;
                };
                let message = relay::direct_message(sender, receiver_id, body, kind, image);
                self.state
                    .hub
                    .send(HubCommand::RelayDirect {
                        origin: self.conn,
                        message,
                    })
                    .await;
            }
            ClientEvent::JoinRoomChannel { room_id } => {
                let Some(user) = self.user.clone() else {
                    return self.reject(Some(room_id), None, RejectReason::NotAuthenticated);
                };
                if let Err(reason) = relay::authorize_room(&self.state.db, room_id, &user).await {
                    return self.reject(Some(room_id), None, reason);
                }
                self.state
                    .hub
                    .send(HubCommand::JoinChannel {
                        conn: self.conn,
                        user,
                        room_id,
                    })
                    .await;
            }
            ClientEvent::LeaveRoomChannel { room_id } => {
                if let Some(user) = self.user.clone() {
                    self.state
                        .hub
                        .send(HubCommand::LeaveChannel {
                            conn: self.conn,
                            user,
                            room_id,
                        })
                        .await;
                }
            }
        }
    }

    /// Identity, rate and body checks shared by both send paths. Returns
    /// the bound sender when the message may proceed. Only direct messages
    /// carry an image.
    async fn admit(
        &self,
        room_id: Option<RoomId>,
        receiver_id: Option<&UserId>,
        body: &str,
        image: Option<&str>,
    ) -> Option<UserId> {
        let receiver_id = receiver_id.cloned();
        let Some(sender) = self.user.clone() else {
            self.reject(room_id, receiver_id, RejectReason::NotAuthenticated);
            return None;
        };
        if !self.state.message_limiter.check(sender.clone()).await {
            warn!(user_id = %sender, "message rate limit exceeded");
            self.reject(room_id, receiver_id, RejectReason::RateLimited);
            return None;
        }
        if let Err(reason) = relay::check_body(body, image) {
            self.reject(room_id, receiver_id, reason);
            return None;
        }
        Some(sender)
    }
}
