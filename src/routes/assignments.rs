use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

use crate::app::AppState;
use crate::authz::{resources, Action};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::work::{LoadReport, RotationCursor, RunAssignmentRequest, RunReport};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/run", post(run_assignment))
        .route("/load/:pool_key", get(load_report))
        .route("/cursors/:pool_key", get(get_cursor))
        .route("/cursors/:pool_key/reset", post(reset_cursor))
}

async fn require(state: &AppState, auth: &AuthUser, resource: &str, action: Action) -> AppResult<()> {
    state
        .resolver
        .require_resource(&auth.principal_id, resource, action, state.config.authz_mode)
        .await
}

/// Assign the unowned items of a pool
#[utoipa::path(
    post,
    path = "/assignments/run",
    tag = "Assignments",
    request_body = RunAssignmentRequest,
    responses(
        (status = 200, description = "Run report", body = RunReport),
        (status = 403, description = "Caller may not run assignments"),
        (status = 422, description = "No eligible agents for the pool"),
        (status = 503, description = "Store unavailable"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn run_assignment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<RunAssignmentRequest>,
) -> AppResult<Json<RunReport>> {
    require(&state, &auth, resources::ASSIGNMENT_RUNS, Action::Edit).await?;
    if req.pool.branch.trim().is_empty() {
        return Err(AppError::bad_request("pool.branch must not be empty"));
    }

    let report = state
        .runner
        .run(req.policy, &req.pool, Some(&auth.principal_id))
        .await?;
    Ok(Json(report))
}

/// Committed load per period and agent
#[utoipa::path(
    get,
    path = "/assignments/load/{pool_key}",
    tag = "Assignments",
    params(("pool_key" = String, Path, description = "Pool key, `branch` or `branch:team`")),
    responses((status = 200, description = "Load report", body = LoadReport)),
    security(("bearerAuth" = []))
)]
pub async fn load_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(pool_key): Path<String>,
) -> AppResult<Json<LoadReport>> {
    require(&state, &auth, resources::ASSIGNMENT_RUNS, Action::View).await?;
    Ok(Json(state.runner.work().load_report(&pool_key).await?))
}

/// Inspect a pool's round-robin cursor
#[utoipa::path(
    get,
    path = "/assignments/cursors/{pool_key}",
    tag = "Assignments",
    params(("pool_key" = String, Path, description = "Pool key, `branch` or `branch:team`")),
    responses(
        (status = 200, description = "Cursor", body = RotationCursor),
        (status = 404, description = "Pool never rotated"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_cursor(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(pool_key): Path<String>,
) -> AppResult<Json<RotationCursor>> {
    require(&state, &auth, resources::ROTATION_CURSORS, Action::View).await?;
    state
        .runner
        .cursors()
        .cursor(&pool_key)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no cursor for pool '{pool_key}'")))
}

/// Reset a pool's round-robin cursor to the first agent
#[utoipa::path(
    post,
    path = "/assignments/cursors/{pool_key}/reset",
    tag = "Assignments",
    params(("pool_key" = String, Path, description = "Pool key, `branch` or `branch:team`")),
    responses((status = 200, description = "Cursor after reset", body = RotationCursor)),
    security(("bearerAuth" = []))
)]
pub async fn reset_cursor(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(pool_key): Path<String>,
) -> AppResult<Json<RotationCursor>> {
    require(&state, &auth, resources::ROTATION_CURSORS, Action::Edit).await?;

    let old = state.runner.cursors().cursor(&pool_key).await?;
    let cursor = state.runner.cursors().reset(&pool_key).await?;
    tracing::info!(pool_key = %pool_key, actor = %auth.principal_id, "rotation cursor reset");

    log_activity_with_context(
        &state.event_bus,
        "reset",
        Some(&auth.principal_id),
        &cursor,
        old.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(cursor))
}
