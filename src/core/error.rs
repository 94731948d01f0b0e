// Centralized error handling for the service

use crate::models::api::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

/// Unique constraint on `user.email`
pub const USER_EMAIL_UNIQUE: &str = "user_email_unique";

/// Unique constraint on `access(user_id, route)`
pub const ACCESS_USER_ROUTE_UNIQUE: &str = "access_user_route_unique";

/// Shared by authentication and authorization failures so the response does
/// not reveal which one happened.
const NOT_AUTHORIZED_MESSAGE: &str = "Request could not be authorized";

/// Errors raised by the persistence layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u32 },

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(&'static str),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Input validation failures, reported back to the caller verbatim
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field must not be empty: {0}")]
    EmptyField(&'static str),

    #[error("Field too long: {field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Access list must not be empty")]
    EmptyAccessList,

    #[error("Access list contains a blank route name")]
    BlankRoute,

    #[error("Access list contains duplicate route: {0}")]
    DuplicateRoute(String),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),
}

/// Errors surfaced by the HTTP API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing or invalid application credentials")]
    InvalidAppKey,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Access denied to route {route}")]
    AccessDenied { route: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many failed login attempts, try again later")]
    TooManyAttempts,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Store temporarily unavailable: {0}")]
    TransientStoreFailure(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable code sent alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidAppKey | ApiError::Unauthenticated(_) => "E_UNAUTHORIZED",
            ApiError::AccessDenied { .. } => "E_FORBIDDEN",
            ApiError::InvalidCredentials => "E_INVALID_CREDENTIALS",
            ApiError::TooManyAttempts => "E_TOO_MANY_ATTEMPTS",
            ApiError::NotFound(_) => "E_NOT_FOUND",
            ApiError::Conflict(_) => "E_CONFLICT",
            ApiError::Validation(_) => "E_VALIDATION_ERROR",
            ApiError::TransientStoreFailure(_) => "E_STORE_UNAVAILABLE",
            ApiError::Internal(_) => "E_RUNTIME_EXCEPTION",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidAppKey
            | ApiError::Unauthenticated(_)
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            ApiError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TransientStoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ApiError::Unauthenticated(_) | ApiError::AccessDenied { .. } => {
                NOT_AUTHORIZED_MESSAGE.to_string()
            }
            ApiError::TransientStoreFailure(_) => {
                "Service temporarily unavailable, retry the request".to_string()
            }
            ApiError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => ApiError::NotFound(format!("{} not found", entity)),
            StoreError::UniqueViolation(USER_EMAIL_UNIQUE) => {
                ApiError::Conflict("Email is already registered".to_string())
            }
            StoreError::UniqueViolation(constraint) => ApiError::Conflict(format!(
                "Concurrent modification detected ({}), retry the request",
                constraint
            )),
            StoreError::Unavailable(reason) => ApiError::TransientStoreFailure(reason),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                status: false,
                code: self.code().to_string(),
                message: self.public_message(),
                data: None,
            }),
        )
            .into_response()
    }
}
