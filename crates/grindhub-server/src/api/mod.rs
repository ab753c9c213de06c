//! HTTP surface: router assembly, identity extraction and the handlers that
//! are not tied to one resource.

mod messages;
mod problems;
mod rooms;
mod study;

use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use grindhub_shared::constants::{USER_HEADER, WS_PATH};
use grindhub_shared::UserId;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;
use crate::ws::ws_upgrade;

/// The authenticated caller of a REST request, taken from the identity
/// header set by the authentication layer in front of this service.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts.headers.get(USER_HEADER).and_then(|v| v.to_str().ok());
        UserId::parse_handshake(raw)
            .map(CurrentUser)
            .ok_or(ServerError::Unauthorized)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/presence", get(online_users))
        // Rooms
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route(
            "/rooms/{id}",
            get(rooms::get_room)
                .put(rooms::update_room)
                .delete(rooms::delete_room),
        )
        .route("/rooms/{id}/join", post(rooms::join_room))
        .route("/rooms/{id}/leave", post(rooms::leave_room))
        .route("/rooms/{id}/messages", get(rooms::room_messages))
        // Messages
        .route(
            "/messages/{id}",
            get(messages::direct_history).put(messages::edit_message),
        )
        .route("/messages/{id}/reactions", post(messages::react))
        // Problems
        .route(
            "/problems",
            get(problems::list_problems).post(problems::create_problem),
        )
        .route(
            "/problems/{id}",
            get(problems::get_problem)
                .put(problems::update_problem)
                .delete(problems::delete_problem),
        )
        .route("/problems/{id}/like", post(problems::like_problem))
        // Study
        .route("/study/goal", get(study::get_goal).put(study::update_goal))
        .route("/study/todos", post(study::add_todo))
        .route(
            "/study/todos/{id}",
            put(study::update_todo).delete(study::delete_todo),
        )
        .route("/study/session/start", post(study::start_session))
        .route("/study/session/end", post(study::end_session))
        .route("/study/stats", get(study::stats))
        .route("/study/sessions", get(study::sessions));

    Router::new()
        .nest("/api", api)
        .route(WS_PATH, get(ws_upgrade))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    state.rate_limiter.clone(),
                    rate_limit_middleware,
                )),
        )
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now(),
    })
}

async fn online_users(State(state): State<AppState>) -> Result<Json<Vec<UserId>>, ServerError> {
    state
        .hub
        .online_users()
        .await
        .map(Json)
        .ok_or_else(|| ServerError::Internal("hub is not running".into()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
