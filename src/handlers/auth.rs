use crate::core::error::{ApiError, ValidationError};
use crate::core::state::AppState;
use crate::models::api::{ApiResponse, LoginRequest};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Exchange email and password for a bearer token
///
/// POST /api/v1/login
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ValidationError::MalformedBody(e.body_text()))?;
    let input = request.validate()?;

    let response = state.users.login(addr.ip(), input).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("User authenticated", response)),
    )
        .into_response())
}
