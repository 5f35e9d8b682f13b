//! Build command endpoints.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use kiln_core::{BuildInfo, BuildStatus};
use kiln_engine::{ReloadOutcome, StartOutcome};
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_builds))
        .route("/reload", post(reload))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/{name}", get(get_build))
        .route("/{name}/start", post(start_build))
        .route("/{name}/cancel", post(cancel_build))
}

async fn list_builds(State(state): State<AppState>) -> Json<Vec<BuildInfo>> {
    Json(state.registry.all_builds())
}

async fn get_build(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BuildInfo>, ApiError> {
    state
        .registry
        .build_info(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no build definition named '{name}'")))
}

async fn start_build(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BuildInfo>, ApiError> {
    match state.registry.start_build(&name, true).await {
        StartOutcome::Started(info) => Ok(Json(info)),
        StartOutcome::Queued => state
            .registry
            .build_info(&name)
            .map(Json)
            .ok_or_else(|| ApiError::NotFound(format!("no build definition named '{name}'"))),
        StartOutcome::AlreadyRunning(_) => {
            Err(ApiError::Conflict("build already running".to_string()))
        }
        StartOutcome::Paused => Err(ApiError::Conflict("builds are paused".to_string())),
        StartOutcome::NotFound => Err(ApiError::NotFound(format!(
            "no build definition named '{name}'"
        ))),
        StartOutcome::Skipped => Err(ApiError::Internal(
            "forced start was skipped unexpectedly".to_string(),
        )),
    }
}

async fn cancel_build(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BuildInfo>, ApiError> {
    let current = state
        .registry
        .build_info(&name)
        .ok_or_else(|| ApiError::NotFound(format!("no build definition named '{name}'")))?;
    if current
        .latest
        .as_ref()
        .is_some_and(|latest| latest.result == BuildStatus::Cancelled)
    {
        return Err(ApiError::Conflict("build already cancelled".to_string()));
    }

    state
        .registry
        .cancel(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no build definition named '{name}'")))
}

async fn reload(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if state.registry.has_running_builds() {
        return Err(ApiError::Conflict(
            "cannot reload; builds are currently running".to_string(),
        ));
    }
    match state.registry.reload().await {
        ReloadOutcome::Completed => Ok(Json(json!({ "status": "reloaded" }))),
        ReloadOutcome::Deferred => Err(ApiError::Conflict(
            "cannot reload; builds are currently running".to_string(),
        )),
    }
}

async fn pause(State(state): State<AppState>) -> Json<Value> {
    state.registry.pause();
    Json(json!({ "paused": true }))
}

async fn resume(State(state): State<AppState>) -> Json<Value> {
    state.registry.resume();
    Json(json!({ "paused": false }))
}
