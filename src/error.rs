use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::timesheets::repo_types::Timesheet;

/// Error taxonomy surfaced at the operation boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid user")]
    UnknownUser,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Not found")]
    NotFound,

    #[error("{message}")]
    Conflict {
        message: String,
        timesheets: Vec<Timesheet>,
    },

    #[error("Invalid token")]
    ResetTokenInvalid,

    #[error("Token already used")]
    TokenUsed,

    #[error("Token expired")]
    TokenExpired,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    timesheets: Option<Vec<Timesheet>>,
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Machine-readable category sent to callers.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::InvalidToken | AppError::ResetTokenInvalid => "INVALID_TOKEN",
            AppError::UnknownUser => "UNKNOWN_USER",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::Forbidden => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound => "NOT_FOUND",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::TokenUsed => "TOKEN_USED",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated
            | AppError::InvalidToken
            | AppError::UnknownUser
            | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_)
            | AppError::ResetTokenInvalid
            | AppError::TokenUsed
            | AppError::TokenExpired => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        if let AppError::Internal(e) = &self {
            tracing::error!(error = ?e, "internal error");
        }
        let message = self.to_string();
        let timesheets = match self {
            AppError::Conflict { timesheets, .. } => Some(timesheets),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody { code, message },
            timesheets,
        };
        (status, Json(body)).into_response()
    }
}
