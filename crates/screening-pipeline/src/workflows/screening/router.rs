use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use super::orchestrator::{OverrideAction, PipelineError, PipelineOrchestrator};
use super::repository::{DecisionId, PipelineRun, RepositoryError, RunId, TriggerType};
use super::settings::{ConfigUpdateError, PipelineConfig};

const RUN_LIST_LIMIT: usize = 50;
const AUDIT_LIST_LIMIT: usize = 200;

#[derive(Clone)]
pub struct PipelineApiState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Bearer token required by the scheduled trigger. Unset means it always refuses.
    pub cron_secret: Option<String>,
}

/// HTTP surface for triggering runs, reviewing decisions and tuning the campaign.
pub fn pipeline_router(state: PipelineApiState) -> Router {
    Router::new()
        .route("/api/v1/pipeline/trigger", post(trigger_handler))
        .route("/api/cron/daily", get(cron_handler))
        .route("/api/v1/pipeline/runs", get(list_runs_handler))
        .route("/api/v1/pipeline/runs/:run_id", get(run_handler))
        .route(
            "/api/v1/pipeline/runs/:run_id/candidates",
            get(run_candidates_handler),
        )
        .route("/api/v1/pipeline/runs/:run_id/cancel", post(cancel_handler))
        .route(
            "/api/v1/pipeline/candidates/:decision_id/override",
            patch(override_handler),
        )
        .route(
            "/api/v1/pipeline/config",
            get(config_handler).put(update_config_handler),
        )
        .route("/api/v1/pipeline/audit", get(audit_handler))
        .with_state(state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    #[default]
    Prepare,
    Execute,
    Full,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub mode: TriggerMode,
    #[serde(default)]
    pub run_id: Option<RunId>,
    #[serde(default)]
    pub triggered_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub run_id: RunId,
    pub mode: TriggerMode,
    pub run: PipelineRun,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub action: OverrideAction,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdateRequest {
    #[serde(default)]
    pub updated_by: Option<String>,
    pub settings: Map<String, Value>,
}

pub(crate) async fn trigger_handler(
    State(state): State<PipelineApiState>,
    Json(request): Json<TriggerRequest>,
) -> Response {
    let orchestrator = &state.orchestrator;

    let run_id = match (request.mode, request.run_id) {
        (TriggerMode::Execute, None) => {
            return error_body(StatusCode::BAD_REQUEST, "run_id required for execute mode");
        }
        (_, Some(run_id)) => run_id,
        (_, None) => match orchestrator.create_run(TriggerType::Manual, request.triggered_by) {
            Ok(run_id) => run_id,
            Err(err) => return pipeline_error_response(err),
        },
    };

    let outcome = match request.mode {
        TriggerMode::Prepare => orchestrator.prepare(run_id).await,
        TriggerMode::Execute => orchestrator.execute(run_id).await,
        TriggerMode::Full => orchestrator.run_full(run_id).await,
    };
    if let Err(err) = outcome {
        return pipeline_error_response(err);
    }

    match orchestrator.get_run(run_id) {
        Ok(run) => (
            StatusCode::OK,
            Json(TriggerResponse {
                run_id,
                mode: request.mode,
                run,
            }),
        )
            .into_response(),
        Err(err) => pipeline_error_response(err),
    }
}

pub(crate) async fn cron_handler(
    State(state): State<PipelineApiState>,
    headers: HeaderMap,
) -> Response {
    if !cron_authorized(state.cron_secret.as_deref(), &headers) {
        return error_body(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let orchestrator = &state.orchestrator;
    let run_id = match orchestrator.create_run(TriggerType::Scheduled, None) {
        Ok(run_id) => run_id,
        Err(err) => return pipeline_error_response(err),
    };

    match orchestrator.run_full(run_id).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({ "run_id": run_id, "status": "completed", "stats": stats })),
        )
            .into_response(),
        Err(err) => pipeline_error_response(err),
    }
}

fn cron_authorized(secret: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(secret) = secret else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map_or(false, |token| token == secret)
}

pub(crate) async fn list_runs_handler(State(state): State<PipelineApiState>) -> Response {
    match state.orchestrator.list_runs(RUN_LIST_LIMIT) {
        Ok(runs) => (StatusCode::OK, Json(runs)).into_response(),
        Err(err) => pipeline_error_response(err),
    }
}

pub(crate) async fn run_handler(
    State(state): State<PipelineApiState>,
    Path(run_id): Path<String>,
) -> Response {
    let Some(run_id) = parse_uuid(&run_id).map(RunId) else {
        return error_body(StatusCode::BAD_REQUEST, "run_id must be a UUID");
    };
    match state.orchestrator.get_run(run_id) {
        Ok(run) => (StatusCode::OK, Json(run)).into_response(),
        Err(err) => pipeline_error_response(err),
    }
}

pub(crate) async fn run_candidates_handler(
    State(state): State<PipelineApiState>,
    Path(run_id): Path<String>,
) -> Response {
    let Some(run_id) = parse_uuid(&run_id).map(RunId) else {
        return error_body(StatusCode::BAD_REQUEST, "run_id must be a UUID");
    };
    match state.orchestrator.run_decisions(run_id) {
        Ok(decisions) => (StatusCode::OK, Json(decisions)).into_response(),
        Err(err) => pipeline_error_response(err),
    }
}

pub(crate) async fn cancel_handler(
    State(state): State<PipelineApiState>,
    Path(run_id): Path<String>,
) -> Response {
    let Some(run_id) = parse_uuid(&run_id).map(RunId) else {
        return error_body(StatusCode::BAD_REQUEST, "run_id must be a UUID");
    };
    match state.orchestrator.cancel_run(run_id) {
        Ok(run) => (StatusCode::OK, Json(run)).into_response(),
        Err(err) => pipeline_error_response(err),
    }
}

pub(crate) async fn override_handler(
    State(state): State<PipelineApiState>,
    Path(decision_id): Path<String>,
    Json(request): Json<OverrideRequest>,
) -> Response {
    let Some(decision_id) = parse_uuid(&decision_id).map(DecisionId) else {
        return error_body(StatusCode::BAD_REQUEST, "decision_id must be a UUID");
    };
    match state.orchestrator.override_candidate(
        decision_id,
        request.action,
        request.actor,
        request.reason,
    ) {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(err) => pipeline_error_response(err),
    }
}

pub(crate) async fn config_handler(State(state): State<PipelineApiState>) -> Response {
    (StatusCode::OK, Json(state.orchestrator.current_config())).into_response()
}

pub(crate) async fn update_config_handler(
    State(state): State<PipelineApiState>,
    Json(request): Json<ConfigUpdateRequest>,
) -> Response {
    // Reject the whole batch before writing anything if one setting is bad.
    let mut scratch = PipelineConfig::default();
    for (key, value) in &request.settings {
        if let Err(err) = scratch.apply(key, value) {
            return pipeline_error_response(PipelineError::Config(err));
        }
    }

    let mut changes = Vec::with_capacity(request.settings.len());
    for (key, value) in request.settings {
        match state
            .orchestrator
            .update_config(&key, value, request.updated_by.as_deref())
        {
            Ok(entry) => changes.push(entry),
            Err(err) => return pipeline_error_response(err),
        }
    }

    (
        StatusCode::OK,
        Json(json!({
            "config": state.orchestrator.current_config(),
            "changes": changes,
        })),
    )
        .into_response()
}

pub(crate) async fn audit_handler(State(state): State<PipelineApiState>) -> Response {
    match state.orchestrator.audit_entries(AUDIT_LIST_LIMIT) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => pipeline_error_response(err),
    }
}

fn parse_uuid(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn pipeline_error_response(err: PipelineError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        warn!(error = %err, "pipeline request failed");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::RunNotFound(_)
            | PipelineError::DecisionNotFound(_)
            | PipelineError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            PipelineError::InvalidTransition { .. }
            | PipelineError::OverrideLocked { .. }
            | PipelineError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            PipelineError::Config(ConfigUpdateError::Repository(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PipelineError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::ExecutionLoad { .. }
            | PipelineError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
