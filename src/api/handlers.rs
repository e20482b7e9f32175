use axum::{
    extract::{Path, State},
    Json,
};
use utoipa::OpenApi;
use uuid::Uuid;

use super::{
    dto::{ActionResponse, MalfunctionLogDto},
    errors::AppError,
};
use crate::state::AppState;

const LOG_PAGE_LIMIT: i64 = 100;

/// Fetch the most recent unacknowledged malfunction log entries.
#[utoipa::path(
    get,
    path = "/logs",
    responses(
        (status = 200, description = "Unacknowledged malfunction log entries", body = Vec<MalfunctionLogDto>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "logs"
)]
pub async fn get_logs(
    State(state): State<AppState>,
) -> Result<Json<Vec<MalfunctionLogDto>>, AppError> {
    let rows = state.repo.recent_unacknowledged_logs(LOG_PAGE_LIMIT).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Mark a log entry as acknowledged so it no longer drives the anomaly
/// status or appears on the dashboard.
#[utoipa::path(
    post,
    path = "/logs/{id}/acknowledge",
    params(
        ("id" = Uuid, Path, description = "Log entry ID"),
    ),
    responses(
        (status = 200, description = "Entry acknowledged", body = ActionResponse),
        (status = 404, description = "No such entry"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "logs"
)]
pub async fn acknowledge_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    if !state.repo.acknowledge_log(id).await? {
        return Err(AppError::NotFound("log entry"));
    }
    Ok(Json(ActionResponse {
        success: true,
        message: "Log entry acknowledged".to_owned(),
    }))
}

/// Remove a log entry permanently.
#[utoipa::path(
    post,
    path = "/logs/{id}/delete",
    params(
        ("id" = Uuid, Path, description = "Log entry ID"),
    ),
    responses(
        (status = 200, description = "Entry deleted", body = ActionResponse),
        (status = 404, description = "No such entry"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "logs"
)]
pub async fn delete_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    if !state.repo.delete_log(id).await? {
        return Err(AppError::NotFound("log entry"));
    }
    Ok(Json(ActionResponse {
        success: true,
        message: "Log entry deleted".to_owned(),
    }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up"),
    ),
    tag = "health"
)]
pub async fn health() -> &'static str {
    "ok"
}

// ---------------------------------------------------------------------------
// OpenAPI spec struct (used in api/mod.rs)
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(get_logs, acknowledge_log, delete_log, health),
    components(schemas(MalfunctionLogDto, ActionResponse)),
    tags(
        (name = "logs", description = "Malfunction log endpoints"),
        (name = "health", description = "Service health"),
    ),
    info(
        title = "Motor Monitor API",
        version = "0.1.0",
        description = "REST API for industrial motor telemetry monitoring"
    )
)]
pub struct ApiDoc;
