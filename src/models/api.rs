use crate::models::user::{UserDetails, UserFilter};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub access: Option<Vec<String>>,
}

/// Partial update; omitted fields are left as they are.
///
/// An omitted `access` keeps the user's grants unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub access: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub active: Option<bool>,
}

impl From<UserQuery> for UserFilter {
    fn from(query: UserQuery) -> Self {
        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Self {
            fullname: non_blank(query.fullname),
            email: non_blank(query.email),
            active: query.active,
        }
    }
}

/// Response envelope shared by every successful API call
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: bool,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: true,
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: bool,
    pub code: String,
    pub message: String,
    pub data: Option<()>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub user: UserDetails,
    pub token: String,
}
