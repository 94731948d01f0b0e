use crate::core::error::{ApiError, ValidationError};
use crate::core::state::AppState;
use crate::models::api::{ApiResponse, CreateUserRequest, UpdateUserRequest, UserQuery};
use crate::models::identity::Identity;
use crate::models::user::{UserDetails, UserFilter, UserView};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use std::sync::Arc;

/// List users matching the query filters
///
/// GET /api/v1/user?fullname=&email=&active=
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<UserView>>>, ApiError> {
    let Query(query) = query.map_err(|e| ValidationError::MalformedBody(e.body_text()))?;
    let users = state.users.list(&UserFilter::from(query));

    Ok(Json(ApiResponse::ok(
        format!("{} records found", users.len()),
        users,
    )))
}

/// GET /api/v1/user/{id}
pub async fn show_user(
    State(state): State<Arc<AppState>>,
    id: Result<Path<u32>, PathRejection>,
) -> Result<Json<ApiResponse<UserDetails>>, ApiError> {
    let id = user_id(id)?;
    let details = state.users.show(id)?;

    Ok(Json(ApiResponse::ok("Record found", details)))
}

/// POST /api/v1/user
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ValidationError::MalformedBody(e.body_text()))?;
    let input = request.validate()?;

    let id = state.users.create(input, &actor).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Record created", id)),
    )
        .into_response())
}

/// PUT /api/v1/user/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    id: Result<Path<u32>, PathRejection>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id = user_id(id)?;
    let Json(request) = body.map_err(|e| ValidationError::MalformedBody(e.body_text()))?;
    let input = request.validate()?;

    state.users.update(id, input, &actor).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Toggle the user's active flag
///
/// PATCH /api/v1/user/{id}
pub async fn toggle_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    id: Result<Path<u32>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = user_id(id)?;
    state.users.toggle_active(id, &actor).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// A path id that is not a number cannot name an existing user
fn user_id(id: Result<Path<u32>, PathRejection>) -> Result<u32, ApiError> {
    id.map(|Path(id)| id)
        .map_err(|_| ApiError::NotFound("User not found".to_string()))
}
