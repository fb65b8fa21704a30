//! HTTP endpoint handlers. These are thin wrappers that forward to the path engine.
//! Each handler is instrumented and logs parameters and basic result info.
//!
//! Engine errors become JSON `{error, code, current?}` bodies; `current` is the
//! stored path when the failure concerned an existing one, so clients can resync.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument, warn};

use crate::domain::LearningPath;
use crate::error::{EngineError, PathViolation};
use crate::protocol::*;
use crate::state::AppState;

pub type ApiResult<T> = Result<T, EngineError>;

pub fn status_for(err: &EngineError) -> StatusCode {
  match err {
    EngineError::PathNotFound(_) => StatusCode::NOT_FOUND,
    EngineError::Conflict { .. } | EngineError::StaleState { .. } => StatusCode::CONFLICT,
    EngineError::Rejected { violation, .. } => match violation {
      PathViolation::StepNotFound(_) | PathViolation::CheckpointNotFound(_) | PathViolation::BranchNotFound(_) => {
        StatusCode::NOT_FOUND
      }
      PathViolation::InvalidSignal(_) => StatusCode::BAD_REQUEST,
      _ => StatusCode::UNPROCESSABLE_ENTITY,
    },
    EngineError::Validation(_) => StatusCode::BAD_REQUEST,
    EngineError::CyclicPrerequisite { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    EngineError::GenerationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
    EngineError::Generation(_) => StatusCode::BAD_GATEWAY,
  }
}

impl IntoResponse for EngineError {
  fn into_response(self) -> Response {
    let status = status_for(&self);
    if status.is_server_error() {
      error!(target: "pathway_backend", code = self.code(), error = %self, "Request failed");
    } else {
      warn!(target: "pathway_backend", code = self.code(), error = %self, "Request rejected");
    }
    let body = ErrorOut {
      error: self.to_string(),
      code: self.code().to_string(),
      current: self.current().cloned(),
    };
    (status, Json(body)).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, generator: state.engine.generator_name() })
}

#[instrument(level = "info", skip(state, body), fields(owner_id = %body.owner_id, topic = %body.topic, level = %body.level))]
pub async fn http_create_path(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreatePathIn>,
) -> ApiResult<(StatusCode, Json<LearningPath>)> {
  let (path, created) = state.engine.create_path(&body.owner_id, &body.topic, body.level).await?;
  info!(target: "pathway", path_id = %path.id, created, "HTTP create_path served");
  let status = if created { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(path)))
}

#[instrument(level = "info", skip(state), fields(owner_id = %q.owner_id))]
pub async fn http_list_paths(
  State(state): State<Arc<AppState>>,
  Query(q): Query<OwnerQuery>,
) -> Json<Vec<LearningPath>> {
  Json(state.engine.list_paths(&q.owner_id).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_path(
  State(state): State<Arc<AppState>>,
  Path(path_id): Path<String>,
) -> ApiResult<Json<LearningPath>> {
  Ok(Json(state.engine.get_path(&path_id).await?))
}

#[instrument(level = "info", skip(state), fields(expected = ?q.expected_version))]
pub async fn http_delete_path(
  State(state): State<Arc<AppState>>,
  Path(path_id): Path<String>,
  Query(q): Query<VersionQuery>,
) -> ApiResult<Json<LearningPath>> {
  Ok(Json(state.engine.delete_path(&path_id, q.expected_version).await?))
}

#[instrument(level = "info", skip(state), fields(expected = ?q.expected_version))]
pub async fn http_complete_step(
  State(state): State<Arc<AppState>>,
  Path((path_id, step_id)): Path<(String, String)>,
  Query(q): Query<VersionQuery>,
) -> ApiResult<Json<LearningPath>> {
  let path = state.engine.complete_step(&path_id, &step_id, q.expected_version).await?;
  Ok(Json(path))
}

#[instrument(level = "info", skip(state, body), fields(answered = body.answers.len(), expected = ?body.expected_version))]
pub async fn http_take_checkpoint(
  State(state): State<Arc<AppState>>,
  Path((path_id, checkpoint_id)): Path<(String, String)>,
  Json(body): Json<AttemptIn>,
) -> ApiResult<Json<CheckpointResultOut>> {
  let (path, attempt) = state
    .engine
    .take_checkpoint(&path_id, &checkpoint_id, &body.answers, body.expected_version)
    .await?;
  info!(target: "pathway", %path_id, %checkpoint_id, score = %format!("{:.1}", attempt.score), passed = attempt.passed, "HTTP take_checkpoint evaluated");
  Ok(Json(CheckpointResultOut { path, attempt }))
}

#[instrument(level = "info", skip(state, body), fields(fork_at = body.fork_at_step_order, branch_name = %body.branch_name))]
pub async fn http_create_branch(
  State(state): State<Arc<AppState>>,
  Path(path_id): Path<String>,
  Json(body): Json<CreateBranchIn>,
) -> ApiResult<(StatusCode, Json<BranchOut>)> {
  let (path, branch_id) = state
    .engine
    .create_branch(&path_id, body.fork_at_step_order, &body.branch_name, body.initial_steps, body.expected_version)
    .await?;
  Ok((StatusCode::CREATED, Json(BranchOut { path, branch_id })))
}

#[instrument(level = "info", skip(state, body), fields(branch_id = ?body.branch_id))]
pub async fn http_switch_branch(
  State(state): State<Arc<AppState>>,
  Path(path_id): Path<String>,
  Json(body): Json<SwitchBranchIn>,
) -> ApiResult<Json<LearningPath>> {
  let path = state
    .engine
    .switch_branch(&path_id, body.branch_id.as_deref(), body.expected_version)
    .await?;
  Ok(Json(path))
}

#[instrument(level = "info", skip(state, body), fields(signal = ?body.signal))]
pub async fn http_adapt_path(
  State(state): State<Arc<AppState>>,
  Path(path_id): Path<String>,
  Json(body): Json<AdaptIn>,
) -> ApiResult<Json<AdaptOut>> {
  let (path, outcome) = state.engine.adapt_path(&path_id, &body.signal, body.expected_version).await?;
  Ok(Json(AdaptOut { path, outcome }))
}
