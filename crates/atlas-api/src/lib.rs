pub mod artifacts;
pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod policy;

use axum::{
    Json, Router,
    routing::{get, post, put},
};

use atlas_types::api::HealthResponse;

pub use auth::{AppState, AppStateInner};
pub use error::{ApiError, AuthError};

/// All REST routes under `/api`. Layers (CORS, tracing) and the gateway
/// socket are added by the server binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route(
            "/api/artifacts",
            get(artifacts::list_artifacts).post(artifacts::create_artifact),
        )
        .route(
            "/api/artifacts/{id}",
            put(artifacts::update_artifact).delete(artifacts::delete_artifact),
        )
        .route(
            "/api/artifacts/{id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
