// Request pipeline middleware: app key, then bearer token, then route grant.
// The API docs sit behind HTTP Basic auth instead.

use crate::core::error::ApiError;
use crate::core::state::AppState;
use crate::models::identity::Identity;
use crate::security::credentials::{
    app_key_from_headers, basic_credentials, bearer_token, secrets_match, verify_app_key,
};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reject any request whose X-Credentials header does not match the app key
pub async fn require_app_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = app_key_from_headers(request.headers())
        .is_some_and(|key| verify_app_key(key, &state.config.auth.app_key));

    if !authorized {
        warn!(path = %request.uri().path(), "Request with missing or invalid app key");
        return Err(ApiError::InvalidAppKey);
    }

    Ok(next.run(request).await)
}

/// Resolve the bearer token into an [`Identity`] request extension
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".to_string()))
        .and_then(|token| state.users.authenticate(token));

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(e) => {
            state.metrics.increment_unauthenticated();
            debug!(path = %request.uri().path(), reason = %e, "Unauthenticated request");
            Err(e)
        }
    }
}

/// State for [`require_grant`]: the route name a handler is registered under
#[derive(Clone)]
pub struct RouteGuard {
    state: Arc<AppState>,
    route: &'static str,
}

impl RouteGuard {
    pub fn new(state: Arc<AppState>, route: &'static str) -> Self {
        Self { state, route }
    }
}

/// Allow the request only if the authenticated user holds a grant for the route
pub async fn require_grant(
    State(guard): State<RouteGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request.extensions().get::<Identity>();
    let user_id = identity.map(|i| i.user_id);

    match guard.state.authorizer.authorize(identity, guard.route) {
        Ok(()) => {
            guard.state.metrics.increment_authorized();
            Ok(next.run(request).await)
        }
        Err(e @ ApiError::AccessDenied { .. }) => {
            guard.state.metrics.increment_denied();
            warn!(
                user_id,
                route = guard.route,
                kind = "access_denied",
                "Route access denied"
            );
            Err(e)
        }
        Err(e) => {
            guard.state.metrics.increment_unauthenticated();
            warn!(route = guard.route, kind = "unauthenticated", "Route reached without identity");
            Err(e)
        }
    }
}

/// HTTP Basic auth in front of the API docs.
///
/// Answers 401 with a `WWW-Authenticate: Basic` challenge when credentials are
/// missing, wrong, or docs credentials are not configured.
pub async fn require_docs_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(docs) = &state.config.docs else {
        return challenge("Authorization required");
    };

    let Some((user, password)) = basic_credentials(request.headers()) else {
        return challenge("Authorization required");
    };

    // Both compared even when the user already failed
    let user_ok = secrets_match(user.as_bytes(), docs.user.as_bytes());
    let password_ok = secrets_match(password.as_bytes(), docs.password.as_bytes());

    if !(user_ok && password_ok) {
        warn!(path = %request.uri().path(), "Invalid docs credentials");
        return challenge("Invalid credentials");
    }

    next.run(request).await
}

fn challenge(message: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"routeguard docs\"")],
        message,
    )
        .into_response()
}
