use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, OkResponse, ResetConfirm, ResetRequest},
        extractors::AuthUser,
        guard::{authorize, Operation},
        services,
    },
    error::{AppError, AppResult},
    extractors::ApiJson,
    state::AppState,
    users::repo_types::UserSummary,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/password-reset/request", post(request_reset))
        .route("/password-reset/confirm", post(confirm_reset))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    services::authenticate(&state, &payload.email, &payload.password)
        .await
        .map(Json)
}

/// Accounts are created by the owner only.
pub async fn register() -> AppResult<Json<OkResponse>> {
    warn!("self-registration attempt rejected");
    Err(AppError::Forbidden)
}

#[instrument(skip_all)]
pub async fn request_reset(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetRequest>,
) -> AppResult<Json<OkResponse>> {
    services::request_password_reset(&state, payload.email.as_deref()).await?;
    Ok(Json(OkResponse::ok()))
}

#[instrument(skip_all)]
pub async fn confirm_reset(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetConfirm>,
) -> AppResult<Json<OkResponse>> {
    services::confirm_password_reset(
        &state,
        payload.token.as_deref(),
        payload.password.as_deref(),
    )
    .await?;
    Ok(Json(OkResponse::ok()))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> AppResult<Json<UserSummary>> {
    authorize(&user, Operation::ViewProfile)?;
    Ok(Json(user))
}
