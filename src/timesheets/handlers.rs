use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{DeleteResponse, ReassignRequest, SubmitTimesheetRequest, TimesheetView},
    repo_types::Timesheet,
    services,
};
use crate::{
    auth::{
        extractors::AuthUser,
        guard::{authorize, path_id, Operation},
    },
    error::AppResult,
    extractors::ApiJson,
    state::AppState,
    users::repo_types::UserSummary,
};

pub fn lifecycle_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/timesheets",
            get(list_all).post(submit).delete(delete_all),
        )
        .route("/timesheets/:id", delete(delete_one))
        .route("/timesheets/:id/approve", post(approve))
        .route("/timesheets/:id/reassign", post(reassign))
        .route("/timesheets/:id/archive", post(archive))
}

pub fn query_routes() -> Router<AppState> {
    Router::new()
        .route("/timesheets/pending", get(client_pending))
        .route("/timesheets/client/history", get(client_history))
        .route("/timesheets/staff", get(staff_history))
        .route("/timesheets/staff/pending", get(staff_pending))
        .route("/timesheets/owner/pending", get(owner_pending))
        .route("/timesheets/owner/history", get(owner_history))
        .route("/timesheets/approved", get(approved))
}

// --- lifecycle ---

#[instrument(skip_all, fields(caller = %user.id))]
pub async fn submit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<SubmitTimesheetRequest>,
) -> AppResult<(StatusCode, Json<Timesheet>)> {
    let ts = services::submit(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(ts)))
}

#[instrument(skip_all, fields(caller = %user.id, %id))]
pub async fn approve(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Timesheet>> {
    let id = path_id(&user, Operation::ApproveTimesheet, &id)?;
    services::approve(&state, &user, id).await.map(Json)
}

#[instrument(skip_all, fields(caller = %user.id, %id))]
pub async fn reassign(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<ReassignRequest>,
) -> AppResult<Json<Timesheet>> {
    let id = path_id(&user, Operation::ReassignTimesheet, &id)?;
    services::reassign(&state, &user, id, payload.to_staff_id.as_deref())
        .await
        .map(Json)
}

#[instrument(skip_all, fields(caller = %user.id, %id))]
pub async fn archive(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Timesheet>> {
    let id = path_id(&user, Operation::ArchiveTimesheet, &id)?;
    services::archive(&state, &user, id).await.map(Json)
}

#[instrument(skip_all, fields(caller = %user.id, %id))]
pub async fn delete_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<DeleteResponse>> {
    // A value that is not an id names no record; deleting it is a no-op.
    match Uuid::parse_str(id.trim()) {
        Ok(id) => services::delete_one(&state, &user, id).await?,
        Err(_) => authorize(&user, Operation::DeleteTimesheet)?,
    }
    Ok(Json(DeleteResponse {
        ok: true,
        deleted: None,
    }))
}

#[instrument(skip_all, fields(caller = %user.id))]
pub async fn delete_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<DeleteResponse>> {
    let n = services::delete_all(&state, &user).await?;
    Ok(Json(DeleteResponse {
        ok: true,
        deleted: Some(n),
    }))
}

// --- queries ---

async fn plain(
    state: &AppState,
    user: &UserSummary,
    op: Operation,
) -> AppResult<Json<Vec<Timesheet>>> {
    services::list(state, user, op).await.map(Json)
}

pub async fn list_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Timesheet>>> {
    plain(&state, &user, Operation::ListAll).await
}

pub async fn client_pending(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<TimesheetView>>> {
    services::list_with_staff(&state, &user, Operation::ListPendingForClient)
        .await
        .map(Json)
}

pub async fn client_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<TimesheetView>>> {
    services::list_with_staff(&state, &user, Operation::ListApprovedHistoryForClient)
        .await
        .map(Json)
}

pub async fn staff_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Timesheet>>> {
    plain(&state, &user, Operation::ListHistoryForStaff).await
}

pub async fn staff_pending(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Timesheet>>> {
    plain(&state, &user, Operation::ListPendingForStaff).await
}

pub async fn owner_pending(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Timesheet>>> {
    plain(&state, &user, Operation::ListPendingForOwner).await
}

pub async fn owner_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Timesheet>>> {
    plain(&state, &user, Operation::ListFullHistoryForOwner).await
}

pub async fn approved(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Timesheet>>> {
    plain(&state, &user, Operation::ListApproved).await
}
