//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::item::ItemClass;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Upper bound for plain HTTP requests; upgraded sockets are not affected
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/catalog/items/:id", get(item_class_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

/// CORS for the configured origins (comma-separated, `*` for any)
fn cors_layer(client_origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return base.allow_origin(Any);
    }
    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    base.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connected_players: usize,
    tick: u64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        connected_players: state.session.player_count(),
        tick: state.session.tick(),
    })
}

// ============================================================================
// Catalog endpoint
// ============================================================================

async fn item_class_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ItemClass>, AppError> {
    state
        .catalog
        .item(&id)
        .map(|class| Json(class.as_ref().clone()))
        .ok_or_else(|| AppError::NotFound(format!("item class {id}")))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
