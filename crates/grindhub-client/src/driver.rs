//! Async driver around [`SessionController`].
//!
//! One task owns the controller, the local cache and the current transport.
//! UI commands arrive on an mpsc channel; transport events, retry timers
//! and backfill results are fed back to the same task, so the controller is
//! only ever touched from one place.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use grindhub_shared::{ClientEvent, ServerEvent, UserId};

use crate::api::ApiClient;
use crate::cache::{ChatMessage, ClientCache, Context};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::events::{SessionCommand, SessionNotification};
use crate::session::{Generation, SessionAction, SessionController, SessionInput};

const COMMAND_QUEUE_SIZE: usize = 64;
const NOTIFICATION_QUEUE_SIZE: usize = 256;

/// Start a live session for an authenticated user.
///
/// Returns the command sender and the notification receiver. Dropping the
/// command sender logs the session out. Must be called inside a tokio
/// runtime.
pub fn spawn_session(
    config: ClientConfig,
    user: UserId,
) -> Result<(mpsc::Sender<SessionCommand>, mpsc::Receiver<SessionNotification>)> {
    let ws_url = config.ws_url(&user)?;
    let api = ApiClient::new(&config, user.clone())?;

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
    let (notif_tx, notif_rx) = mpsc::channel(NOTIFICATION_QUEUE_SIZE);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let driver = Driver {
        controller: SessionController::new(&config),
        cache: ClientCache::new(user.clone()),
        api,
        ws_url,
        user,
        transport: None,
        events: event_tx,
        notify: notif_tx,
    };
    tokio::spawn(driver.run(cmd_rx, event_rx));

    Ok((cmd_tx, notif_rx))
}

/// Everything fed back into the driver task besides UI commands.
enum DriverEvent {
    Input(SessionInput),
    Backfilled {
        context: Context,
        result: Result<Vec<ChatMessage>>,
    },
}

struct Transport {
    generation: Generation,
    outgoing: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

struct Driver {
    controller: SessionController,
    cache: ClientCache,
    api: ApiClient,
    ws_url: String,
    user: UserId,
    transport: Option<Transport>,
    events: mpsc::UnboundedSender<DriverEvent>,
    notify: mpsc::Sender<SessionNotification>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<DriverEvent>,
    ) {
        info!(user_id = %self.user, "Session driver started");
        self.apply(SessionInput::Authenticated(self.user.clone())).await;

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Logout) | None => {
                        self.apply(SessionInput::Logout).await;
                        self.cache.clear();
                        break;
                    }
                    Some(cmd) => self.on_command(cmd).await,
                },
                Some(event) = events.recv() => match event {
                    DriverEvent::Input(input) => self.apply(input).await,
                    DriverEvent::Backfilled { context, result } => {
                        self.on_backfill(context, result).await
                    }
                },
            }
        }

        info!(user_id = %self.user, "Session driver stopped");
    }

    async fn on_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SendRoomMessage {
                room_id,
                body,
                kind,
                code_language,
            } => {
                self.apply(SessionInput::Send(ClientEvent::SendRoomMessage {
                    room_id,
                    body,
                    kind,
                    code_language,
                }))
                .await
            }
            SessionCommand::SendDirectMessage {
                receiver_id,
                body,
                kind,
                image,
            } => {
                self.apply(SessionInput::Send(ClientEvent::SendDirectMessage {
                    receiver_id,
                    body,
                    kind,
                    image,
                }))
                .await
            }
            SessionCommand::OpenRoom(room_id) => {
                self.apply(SessionInput::OpenRoom(room_id)).await;
                self.open_context(Context::Room(room_id));
            }
            SessionCommand::CloseRoom(room_id) => {
                self.apply(SessionInput::CloseRoom(room_id)).await;
                self.cache.close(&Context::Room(room_id));
            }
            SessionCommand::OpenConversation(other) => {
                self.open_context(Context::Direct(other));
            }
            SessionCommand::CloseConversation(other) => {
                self.cache.close(&Context::Direct(other));
            }
            SessionCommand::Reconnect => {
                self.apply(SessionInput::Authenticated(self.user.clone()))
                    .await
            }
            // Handled by the run loop.
            SessionCommand::Logout => {}
        }
    }

    /// Track a conversation and fetch its history in the background.
    fn open_context(&mut self, context: Context) {
        if self.cache.open(context.clone()) {
            self.backfill(context);
        }
    }

    fn backfill(&self, context: Context) {
        let api = self.api.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match &context {
                Context::Room(room_id) => api.room_history(*room_id).await,
                Context::Direct(other) => api.direct_history(other).await,
            };
            let _ = events.send(DriverEvent::Backfilled { context, result });
        });
    }

    async fn on_backfill(&mut self, context: Context, result: Result<Vec<ChatMessage>>) {
        match result {
            Ok(history) => {
                let fetched = history.len();
                // Closed again before the fetch finished.
                let Some(messages) = self.cache.merge_history(&context, history) else {
                    return;
                };
                let messages = messages.to_vec();
                debug!(?context, fetched, total = messages.len(), "backfilled");
                self.emit(SessionNotification::History { context, messages })
                    .await;
            }
            Err(e) => {
                warn!(?context, error = %e, "history backfill failed");
                self.emit(SessionNotification::BackfillFailed {
                    context,
                    error: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn apply(&mut self, input: SessionInput) {
        for action in self.controller.handle(input) {
            self.perform(action).await;
        }
    }

    async fn perform(&mut self, action: SessionAction) {
        match action {
            SessionAction::Connect { generation, user } => {
                self.close_transport();
                debug!(user_id = %user, generation, "opening transport");
                self.transport = Some(self.open_transport(generation));
            }
            SessionAction::Transmit(event) => self.transmit(event),
            SessionAction::Deliver(event) => self.on_server_event(event).await,
            SessionAction::ScheduleRetry { generation, after } => {
                self.close_transport();
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = events.send(DriverEvent::Input(SessionInput::RetryDue(generation)));
                });
            }
            SessionAction::CloseTransport => self.close_transport(),
            SessionAction::StateChanged(state) => {
                self.emit(SessionNotification::StateChanged(state)).await
            }
            SessionAction::NotConnected(event) => {
                self.emit(SessionNotification::NotSent(event)).await
            }
            SessionAction::GaveUp => {
                self.close_transport();
                self.emit(SessionNotification::Offline).await;
            }
            SessionAction::Refetch => {
                let contexts = self.cache.open_contexts();
                debug!(open = contexts.len(), "refetching history after reconnect");
                for context in contexts {
                    self.backfill(context);
                }
            }
        }
    }

    async fn on_server_event(&mut self, event: ServerEvent) {
        let notification = match event {
            ServerEvent::OnlineUsersChanged(users) => {
                self.cache.set_online(users.clone());
                SessionNotification::OnlineUsers(users)
            }
            ServerEvent::RoomMessageReceived(m) | ServerEvent::RoomMessageSent(m) => {
                match self.record(ChatMessage::from(m)) {
                    Some(n) => n,
                    None => return,
                }
            }
            ServerEvent::DirectMessageReceived(m) | ServerEvent::DirectMessageSent(m) => {
                match self.record(ChatMessage::from(m)) {
                    Some(n) => n,
                    None => return,
                }
            }
            ServerEvent::MessageRejected {
                room_id,
                receiver_id,
                reason,
            } => SessionNotification::Rejected {
                room_id,
                receiver_id,
                reason,
            },
            ServerEvent::UserJoinedRoom { room_id, user_id } => {
                SessionNotification::UserJoinedRoom { room_id, user_id }
            }
            ServerEvent::UserLeftRoom { room_id, user_id } => {
                SessionNotification::UserLeftRoom { room_id, user_id }
            }
            ServerEvent::Error { message } => SessionNotification::ServerError(message),
        };
        self.emit(notification).await;
    }

    fn record(&mut self, message: ChatMessage) -> Option<SessionNotification> {
        let context = self.cache.push(message.clone())?;
        Some(SessionNotification::Message { context, message })
    }

    fn transmit(&self, event: ClientEvent) {
        let Some(transport) = &self.transport else {
            return;
        };
        match event.to_json() {
            Ok(json) => {
                if transport.outgoing.send(Message::Text(json.into())).is_err() {
                    debug!(generation = transport.generation, "transport already gone");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode client event"),
        }
    }

    fn open_transport(&self, generation: Generation) -> Transport {
        let (outgoing, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_transport(
            self.ws_url.clone(),
            generation,
            rx,
            self.events.clone(),
        ));
        Transport {
            generation,
            outgoing,
            task,
        }
    }

    /// Drop the current transport. Its task sends a close frame once its
    /// queue is gone; anything it reports afterwards carries a stale
    /// generation.
    fn close_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            debug!(generation = transport.generation, "closing transport");
            drop(transport.outgoing);
            let task = transport.task;
            tokio::spawn(async move {
                if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                    debug!("transport did not close in time");
                }
            });
        }
    }

    async fn emit(&self, notification: SessionNotification) {
        if self.notify.send(notification).await.is_err() {
            debug!("notification receiver dropped");
        }
    }
}

async fn run_transport(
    url: String,
    generation: Generation,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<DriverEvent>,
) {
    let send = |input| {
        let _ = events.send(DriverEvent::Input(input));
    };

    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            send(SessionInput::Closed {
                generation,
                reason: format!("connect failed: {e}"),
            });
            return;
        }
    };
    send(SessionInput::Opened(generation));

    let (mut sink, mut stream) = stream.split();
    let reason = loop {
        tokio::select! {
            frame = outgoing.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        break format!("send failed: {e}");
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break "closed locally".to_string();
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ServerEvent::from_json(text.as_str()) {
                    Ok(event) => send(SessionInput::Frame(generation, event)),
                    Err(e) => warn!(error = %e, "undecodable server event"),
                },
                Some(Ok(Message::Close(frame))) => break format!("closed by server: {frame:?}"),
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("transport error: {e}"),
                None => break "stream ended".to_string(),
            },
        }
    };

    debug!(generation, reason = %reason, "transport finished");
    send(SessionInput::Closed { generation, reason });
}
