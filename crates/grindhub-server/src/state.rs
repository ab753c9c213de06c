use std::sync::{Arc, Mutex};

use grindhub_shared::UserId;
use grindhub_store::Database;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::hub::{self, HubHandle};
use crate::persist;
use crate::rate_limit::RateLimiter;

/// SQLite handle shared between request handlers and background tasks.
/// Only ever locked inside `spawn_blocking`.
pub type SharedDb = Arc<Mutex<Database>>;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub hub: HubHandle,
    pub rate_limiter: RateLimiter,
    pub message_limiter: RateLimiter<UserId>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire up the background tasks (persistence writer, hub) around an
    /// open database. Must be called inside a tokio runtime.
    pub fn new(config: ServerConfig, db: Database) -> Self {
        let db: SharedDb = Arc::new(Mutex::new(db));
        let writer = persist::spawn_writer(db.clone());
        let hub = hub::spawn_hub(config.presence_coalesce, writer);

        Self {
            db,
            hub,
            rate_limiter: RateLimiter::new(config.http_rate, config.http_burst),
            message_limiter: RateLimiter::new(config.message_rate, config.message_burst),
            config: Arc::new(config),
        }
    }
}

/// Run a store operation on the blocking pool.
pub async fn with_db<T, F>(db: &SharedDb, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> grindhub_store::Result<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || {
        let guard = db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
        f(&guard).map_err(ServerError::from)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("blocking task failed: {e}")))?
}
