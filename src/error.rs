use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::{config::Env, context::RequestContext};

/// AppError
///
/// The failure taxonomy shared by the dispatcher, actions and collaborators.
/// Every variant maps to exactly one HTTP status and one machine-readable code.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed, missing or extra input.
    #[error("{0}")]
    Validation(String),

    /// The action requires a body and none was sent.
    #[error("Empty body is not allowed. Please fill the body.")]
    EmptyBody,

    /// Bad credentials, token or session.
    #[error("{message}")]
    Authentication { code: AuthFailure, message: String },

    /// The access tag is not granted to the caller.
    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("This email is already taken, try another.")]
    EmailAlreadyTaken,

    #[error("{0}")]
    Conflict(String),

    /// Contract violation by internal code or an unexpected collaborator failure.
    #[error("{0}")]
    Server(String),
}

/// Authentication sub-kinds, kept apart so clients can tell an expired
/// session from a forged one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    InvalidToken,
    TokenExpired,
    InvalidSession,
    SessionExpired,
}

impl AuthFailure {
    fn code(self) -> &'static str {
        match self {
            AuthFailure::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthFailure::InvalidToken => "INVALID_TOKEN",
            AuthFailure::TokenExpired => "TOKEN_EXPIRED",
            AuthFailure::InvalidSession => "INVALID_SESSION",
            AuthFailure::SessionExpired => "SESSION_EXPIRED",
        }
    }
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn authentication(code: AuthFailure, message: impl Into<String>) -> Self {
        AppError::Authentication {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Authorization(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        AppError::Server(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::EmptyBody => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Authentication { code, .. } => match code {
                // 419 is the non-standard "session expired" status the API clients expect.
                AuthFailure::TokenExpired | AuthFailure::SessionExpired => {
                    StatusCode::from_u16(419).unwrap_or(StatusCode::UNAUTHORIZED)
                }
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::EmailAlreadyTaken | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::EmptyBody => "EMPTY_BODY",
            AppError::Authentication { code, .. } => code.code(),
            AppError::Authorization(_) => "ACCESS_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::EmailAlreadyTaken => "EMAIL_ALREADY_TAKEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Server(_) => "SERVER_ERROR",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::not_found("Empty response, not found"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                match db.constraint() {
                    Some("users_email_key") => AppError::EmailAlreadyTaken,
                    Some("users_username_key") => {
                        AppError::Conflict("Username is already taken".to_string())
                    }
                    constraint => {
                        tracing::warn!(?constraint, "unique constraint violated");
                        AppError::Conflict("Resource already exists".to_string())
                    }
                }
            }
            other => {
                tracing::error!("database error: {:?}", other);
                AppError::server("Database error")
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => {
                AppError::authentication(AuthFailure::TokenExpired, "Access token expired")
            }
            _ => AppError::authentication(AuthFailure::InvalidToken, "Invalid access token"),
        }
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::server(format!("Password hashing failed: {e}"))
    }
}

/// ActionFailure
///
/// A failure annotated with the request context it happened in. The dispatcher never
/// formats errors itself: it wraps them in this type and hands them to [`render`].
#[derive(Debug)]
pub struct ActionFailure {
    pub error: AppError,
    pub ctx: Box<RequestContext>,
}

impl ActionFailure {
    pub fn new(error: AppError, ctx: RequestContext) -> Self {
        Self {
            error,
            ctx: Box::new(ctx),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    status: u16,
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<serde_json::Value>,
}

/// render
///
/// The centralized error formatter. Every failure leaving the dispatcher passes
/// through here, so the error envelope is identical across all endpoints.
///
/// In `Local` the captured request context is attached under `meta.request`.
/// In `Production` server errors lose their message so internals never leak.
pub fn render(failure: ActionFailure, env: Env) -> Response {
    let ActionFailure { error, ctx } = failure;
    let status = error.status();

    if matches!(error, AppError::Server(_)) {
        tracing::error!(code = error.code(), method = %ctx.method, url = %ctx.url, "{}", error);
    } else {
        tracing::warn!(code = error.code(), method = %ctx.method, url = %ctx.url, "{}", error);
    }

    let message = match (&error, env) {
        (AppError::Server(_), Env::Production) => "Server error occurred".to_string(),
        _ => error.to_string(),
    };

    let meta = match env {
        Env::Local => serde_json::to_value(&*ctx)
            .ok()
            .map(|request| json!({ "request": request })),
        Env::Production => None,
    };

    let body = ErrorBody {
        success: false,
        status: status.as_u16(),
        code: error.code(),
        message,
        meta,
    };

    (status, Json(body)).into_response()
}
