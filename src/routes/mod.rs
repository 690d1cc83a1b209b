pub mod auth;
pub mod media;
pub mod messages;
pub mod posts;
pub mod stories;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::realtime::socket;
use crate::state::AppState;

/// The full HTTP surface: REST API, push channel, media files and health.
pub fn app(state: AppState) -> anyhow::Result<Router> {
    let origin: HeaderValue = state.config.server.frontend_url.parse()?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);
    let body_limit = state.config.server.body_limit_mb * 1024 * 1024;

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(socket::ws_handler))
        .merge(auth::router())
        .merge(posts::router())
        .merge(stories::router())
        .merge(messages::router())
        .merge(media::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
