// Library exports for finca
// This allows integration tests and the binary to share the router

pub mod aggregation;
pub mod assembler;
pub mod auth;
pub mod comments;
pub mod config;
pub mod cover_slides;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod identity;
pub mod interactions;
pub mod media;
pub mod posts;
pub mod reposts;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Uploads carry video, so the default 2 MB body limit is far too small.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// The full HTTP application.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::api_router())
        .merge(routes::media::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
