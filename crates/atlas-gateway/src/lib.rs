pub mod connection;
pub mod dispatcher;

use axum::{Router, routing::get};

pub use dispatcher::Dispatcher;

/// The `/api/gateway` socket route, ready to merge into the REST router.
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/api/gateway", get(connection::upgrade))
        .with_state(dispatcher)
}
