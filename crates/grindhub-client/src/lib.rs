//! # grindhub-client
//!
//! Client side of the GrindHub real-time connection. A session is started
//! once the user is authenticated and lives until logout:
//!
//! - [`session::SessionController`] decides when to connect, reconnect,
//!   resubscribe and give up
//! - [`driver::spawn_session`] runs it against a WebSocket transport and
//!   reports to the UI through [`events::SessionNotification`]s
//! - [`cache::ClientCache`] holds the online set and the open conversations,
//!   merging live messages with REST history from [`api::ApiClient`]

pub mod api;
pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod session;

pub use cache::{ChatMessage, ClientCache, Context};
pub use config::ClientConfig;
pub use driver::spawn_session;
pub use error::{ClientError, Result};
pub use events::{SessionCommand, SessionNotification};
pub use session::{SessionController, SessionState};
