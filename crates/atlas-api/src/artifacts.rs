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

use atlas_types::api::MessageBody;
use atlas_types::events::GatewayEvent;
use atlas_types::models::{ArtifactDraft, ArtifactId};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::middleware::Caller;
use crate::policy::{Action, Resource};

/// GET /api/artifacts
pub async fn list_artifacts(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    caller.authorize(Action::ReadArtifacts, &Resource::Catalog)?;

    let artifacts = blocking(&state, |s| Ok(s.db.list_artifacts()?)).await?;
    Ok(Json(artifacts))
}

/// POST /api/artifacts
pub async fn create_artifact(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ArtifactDraft>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = caller.require(Action::CreateArtifact, &Resource::Catalog)?;
    let Json(draft) = payload?;

    let artifact = blocking(&state, move |s| Ok(s.db.create_artifact(&draft)?)).await?;

    info!(
        "{} created artifact {} ({})",
        identity.username, artifact.id, artifact.name
    );
    state.dispatcher.broadcast(GatewayEvent::ArtifactCreate {
        artifact: artifact.clone(),
    });

    Ok((StatusCode::CREATED, Json(artifact)))
}

/// PUT /api/artifacts/{id}
pub async fn update_artifact(
    State(state): State<AppState>,
    path: Result<Path<ArtifactId>, PathRejection>,
    caller: Caller,
    payload: Result<Json<ArtifactDraft>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let identity = caller.require(Action::UpdateArtifact, &Resource::Artifact(id))?;
    let Json(draft) = payload?;

    let artifact = blocking(&state, move |s| Ok(s.db.update_artifact(id, &draft)?)).await?;

    info!("{} updated artifact {}", identity.username, id);
    state.dispatcher.broadcast(GatewayEvent::ArtifactUpdate {
        artifact: artifact.clone(),
    });

    Ok(Json(artifact))
}

/// DELETE /api/artifacts/{id}
pub async fn delete_artifact(
    State(state): State<AppState>,
    path: Result<Path<ArtifactId>, PathRejection>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let identity = caller.require(Action::DeleteArtifact, &Resource::Artifact(id))?;

    blocking(&state, move |s| Ok(s.db.delete_artifact(id)?)).await?;

    info!("{} deleted artifact {} and its thread", identity.username, id);
    state.dispatcher.broadcast(GatewayEvent::ArtifactDelete { id });

    Ok(Json(MessageBody::new("Artifact deleted successfully")))
}
