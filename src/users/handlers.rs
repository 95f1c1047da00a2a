use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{CreateUserRequest, DeleteUserQuery, DeletedResponse, DirectoryEntry},
    repo_types::UserSummary,
    services::{self, CreateOutcome},
};
use crate::{
    auth::{
        extractors::AuthUser,
        guard::{path_id, Operation},
    },
    error::AppResult,
    extractors::{ApiJson, ApiQuery},
    state::AppState,
    timesheets::repo_types::Timesheet,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", delete(delete_user))
        .route("/users/:id/timesheets", get(user_timesheets))
}

pub fn directory_routes() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients))
        .route("/staffs", get(list_staff))
}

#[instrument(skip_all, fields(caller = %user.id))]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserSummary>)> {
    Ok(match services::create_user(&state, &user, payload).await? {
        CreateOutcome::Created(u) => (StatusCode::CREATED, Json(u)),
        CreateOutcome::Existing(u) => (StatusCode::OK, Json(u)),
    })
}

#[instrument(skip_all, fields(caller = %user.id))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<UserSummary>>> {
    services::list_users(&state, &user).await.map(Json)
}

#[instrument(skip_all, fields(caller = %user.id, %id))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<DeleteUserQuery>,
) -> AppResult<Json<DeletedResponse>> {
    let id = path_id(&user, Operation::DeleteUser, &id)?;
    let orphaned = services::delete_user(&state, &user, id, q.force).await?;
    Ok(Json(DeletedResponse {
        ok: true,
        orphaned_timesheets: orphaned,
    }))
}

#[instrument(skip_all, fields(caller = %user.id, %id))]
pub async fn user_timesheets(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Timesheet>>> {
    let id = path_id(&user, Operation::ListUserTimesheets, &id)?;
    services::list_user_timesheets(&state, &user, id)
        .await
        .map(Json)
}

pub async fn list_clients(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<DirectoryEntry>>> {
    services::list_clients(&state, &user).await.map(Json)
}

pub async fn list_staff(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<DirectoryEntry>>> {
    services::list_staff(&state, &user).await.map(Json)
}
