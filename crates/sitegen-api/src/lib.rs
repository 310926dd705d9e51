pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/generate", post(routes::generate))
        .route("/api/spec", post(routes::spec))
        .route("/api/upload", post(routes::upload))
        .route("/api/validate", post(routes::validate_record))
        .route("/health", get(routes::health))
        .with_state(state)
}
