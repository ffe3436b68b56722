//! `POST /workflow/run`, `POST /workflow/{id}/resume` (spec §6).

use axum::extract::{Path, State};
use axum::Json;
use tracing::instrument;

use crate::dto::{ResumeRequestDto, RunOutcomeDto, RunRequestDto};
use crate::error::Result;
use crate::state::AppState;

#[instrument(skip(state, req), fields(workflow_id = %req.workflow_id))]
pub async fn run_handler(
    State(state): State<AppState>,
    Json(req): Json<RunRequestDto>,
) -> Result<Json<RunOutcomeDto>> {
    let outcome = state
        .engine
        .run(waba_workflow::RunRequest {
            workflow_id: req.workflow_id,
            input: req.input,
            start_node_ids: req.start_node_ids,
            initial_variables: req.initial_variables,
        })
        .await
        .map_err(crate::error::ApiError::from)?;

    Ok(Json(outcome.into()))
}

#[instrument(skip(state, req), fields(workflow_id = %id))]
pub async fn resume_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ResumeRequestDto>,
) -> Result<Json<RunOutcomeDto>> {
    let outcome = state
        .engine
        .resume(waba_workflow::ResumeRequest {
            workflow_id: id,
            conversation_id: req.conversation_id,
            from: req.input.from,
            to: req.input.to,
            message: req.input.message,
        })
        .await
        .map_err(crate::error::ApiError::from)?;

    Ok(Json(outcome.into()))
}
