//! Workflow CRUD (spec §1 Non-goal: the visual builder UI is out of scope,
//! but the engine still needs a way to load workflows into the Store for
//! tests/dev without it — SPEC_FULL.md's "kept from the teacher" note).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::Value;
use uuid::Uuid;

use engine::collaborators::Session;
use engine::Workflow;

use super::AppState;
use crate::error::ApiError;

#[derive(serde::Deserialize)]
pub struct CreateWorkflowDto {
    pub name: String,
    pub definition: Value,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<db::models::WorkflowRow>>, ApiError> {
    let workflows = db::repository::workflows::list_workflows(&state.pool, session.user_id).await?;
    Ok(Json(workflows))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<db::models::WorkflowRow>, ApiError> {
    let workflow = db::repository::workflows::get_workflow(&state.pool, id).await?;
    if workflow.owner_user_id != session.user_id {
        return Err(ApiError::NotFound);
    }
    Ok(Json(workflow))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<db::models::WorkflowRow>), ApiError> {
    serde_json::from_value::<Workflow>(payload.definition.clone())
        .map_err(|e| ApiError::BadRequest(format!("invalid workflow definition: {e}")))?;

    let workflow =
        db::repository::workflows::create_workflow(&state.pool, session.user_id, &payload.name, payload.definition)
            .await?;

    engine::validate_dag(&serde_json::from_value(workflow.definition.clone()).expect("just validated above"))
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<StatusCode, ApiError> {
    let workflow = db::repository::workflows::get_workflow(&state.pool, id).await?;
    if workflow.owner_user_id != session.user_id {
        return Err(ApiError::NotFound);
    }
    db::repository::workflows::delete_workflow(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
