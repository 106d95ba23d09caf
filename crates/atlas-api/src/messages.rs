use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use atlas_types::api::SendMessageRequest;
use atlas_types::events::GatewayEvent;
use atlas_types::models::ArtifactId;

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::middleware::Caller;
use crate::policy::{Action, Resource};

/// GET /api/artifacts/{id}/messages: the thread in creation order. Public.
pub async fn get_messages(
    State(state): State<AppState>,
    path: Result<Path<ArtifactId>, PathRejection>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    let Path(artifact_id) = path?;
    caller.authorize(Action::ReadMessages, &Resource::Thread(artifact_id))?;

    let messages = blocking(&state, move |s| Ok(s.db.list_messages(artifact_id)?)).await?;
    Ok(Json(messages))
}

/// POST /api/artifacts/{id}/messages
///
/// The author is always the caller; the body carries only the content.
/// Not idempotent: a client retrying after a timeout can post twice.
pub async fn send_message(
    State(state): State<AppState>,
    path: Result<Path<ArtifactId>, PathRejection>,
    caller: Caller,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(artifact_id) = path?;
    let resource = Resource::Post {
        artifact_id,
        author_id: caller.user_id(),
    };
    let identity = caller.require(Action::CreateMessage, &resource)?;
    let user_id = identity.id;
    let Json(req) = payload?;

    let message = blocking(&state, move |s| {
        Ok(s.db.create_message(artifact_id, user_id, &req.content)?)
    })
    .await?;

    info!(
        "{} posted message {} on artifact {}",
        message.username, message.id, artifact_id
    );
    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(message)))
}
