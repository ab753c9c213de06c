//! # grindhub-server
//!
//! HTTP and WebSocket server for GrindHub.
//!
//! - **Hub**: one task owning the connection registry, presence broadcast
//!   and room/direct message fan-out
//! - **WebSocket actors**: one per connection, decoding client events and
//!   checking room membership before relaying
//! - **Persistence writer**: stores relayed messages off the hot path
//! - **REST API** (axum) for rooms, message history, problems and study
//!   tracking, backed by `grindhub-store`
//! - **Rate limiting** per client IP and per user

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod persist;
pub mod presence;
pub mod rate_limit;
pub mod registry;
pub mod relay;
pub mod state;
pub mod ws;

pub use api::{build_router, serve};
pub use config::ServerConfig;
pub use state::AppState;
