//! Background message persistence.
//!
//! One task drains a queue of accepted messages and writes them in order on
//! the blocking pool. Live delivery never waits on it. A failed write is
//! logged and dropped: copies already delivered stay delivered and the
//! message is simply missing from later history.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use grindhub_store::Message;

use crate::state::{with_db, SharedDb};

/// Cheap handle used by the hub to queue writes.
#[derive(Clone, Debug)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl PersistHandle {
    /// Queue a message for durable storage. Never blocks.
    pub fn enqueue(&self, message: Message) {
        if self.tx.send(message).is_err() {
            error!("persistence writer is gone, message not stored");
        }
    }

    /// Handle backed by a bare channel, for driving the hub without a
    /// database.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Spawn the writer task.
pub fn spawn_writer(db: SharedDb) -> PersistHandle {
    let (handle, mut rx) = PersistHandle::detached();

    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let id = message.id;
            match with_db(&db, move |db| db.insert_message(&message)).await {
                Ok(()) => debug!(message = %id, "message persisted"),
                Err(e) => error!(message = %id, error = %e, "failed to persist message"),
            }
        }
        info!("Persistence queue closed, writer stopping");
    });

    handle
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::Utc;
    use grindhub_shared::{DirectMessage, MessageId, MessageKind};
    use grindhub_store::Database;

    use super::*;

    fn direct(body: &str) -> Message {
        Message::from(DirectMessage {
            id: MessageId::new(),
            sender_id: "u1".into(),
            receiver_id: "u2".into(),
            body: body.into(),
            kind: MessageKind::Text,
            image: None,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn writes_in_queue_order() {
        let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let writer = spawn_writer(db.clone());

        for body in ["one", "two", "three"] {
            writer.enqueue(direct(body));
        }

        let mut stored = Vec::new();
        for _ in 0..50 {
            stored = db
                .lock()
                .unwrap()
                .direct_history(&"u1".into(), &"u2".into())
                .unwrap();
            if stored.len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let bodies: Vec<_> = stored.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn failed_write_does_not_stop_the_writer() {
        let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let writer = spawn_writer(db.clone());

        let duplicate = direct("first");
        writer.enqueue(duplicate.clone());
        writer.enqueue(duplicate);
        writer.enqueue(direct("after"));

        let mut count = 0;
        for _ in 0..50 {
            count = db
                .lock()
                .unwrap()
                .direct_history(&"u1".into(), &"u2".into())
                .unwrap()
                .len();
            if count == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(count, 2);
    }
}
