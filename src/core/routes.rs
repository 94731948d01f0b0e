// HTTP routes configuration

use crate::core::state::AppState;
use crate::handlers::{auth, docs, fallback, health, metrics, users};
use crate::security::guard::{
    authenticate, require_app_key, require_docs_auth, require_grant, RouteGuard,
};
use axum::{
    middleware,
    routing::{get, patch, post, put, MethodRouter},
    Router,
};
use std::sync::Arc;

/// Route names checked against a user's access grants
pub const USER_INDEX: &str = "user.index";
pub const USER_SHOW: &str = "user.show";
pub const USER_CREATE: &str = "user.create";
pub const USER_UPDATE: &str = "user.update";
pub const USER_ACTIVE: &str = "user.active";

/// Every route name a grant can refer to
pub const PROTECTED_ROUTES: [&str; 5] = [USER_INDEX, USER_SHOW, USER_CREATE, USER_UPDATE, USER_ACTIVE];

/// Attach the grant check for `route` to a method router
fn guarded(
    state: &Arc<AppState>,
    route: &'static str,
    method_router: MethodRouter<Arc<AppState>>,
) -> MethodRouter<Arc<AppState>> {
    method_router.route_layer(middleware::from_fn_with_state(
        RouteGuard::new(Arc::clone(state), route),
        require_grant,
    ))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // Authenticated and checked against the route's grant
    let protected = Router::new()
        .route(
            "/user",
            guarded(&state, USER_INDEX, get(users::list_users))
                .merge(guarded(&state, USER_CREATE, post(users::create_user))),
        )
        .route(
            "/user/{id}",
            guarded(&state, USER_SHOW, get(users::show_user))
                .merge(guarded(&state, USER_UPDATE, put(users::update_user)))
                .merge(guarded(&state, USER_ACTIVE, patch(users::toggle_user))),
        )
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), authenticate));

    // Everything under /api/v1 needs the application key
    let api = Router::new()
        .route("/login", post(auth::login_handler))
        .merge(protected)
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_app_key));

    let mut router = Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler));

    // API docs are only served when credentials for them are configured
    if state.config.docs.is_some() {
        let docs = Router::new()
            .route("/swagger", get(docs::openapi_handler))
            .route("/docs", get(docs::docs_handler))
            .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_docs_auth));
        router = router.merge(docs);
    }

    router
        // JSON 404 for all unmatched routes
        .fallback(fallback::fallback_handler)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::metrics::collector::MetricsSnapshot;
    use crate::models::api::ErrorResponse;
    use crate::services::users::ensure_admin;
    use crate::stores::database::Database;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    const APP_KEY: &str = "test-app-key";
    const ADMIN_EMAIL: &str = "admin@example.com";
    const ADMIN_PASSWORD: &str = "admin-password";

    fn test_config() -> Config {
        config_with("")
    }

    fn config_with(extra: &str) -> Config {
        Config::from_toml(&format!(
            "[auth]\napp_key = \"{}\"\nmax_failed_logins = 3\n{}",
            APP_KEY, extra
        ))
        .unwrap()
    }

    async fn test_app() -> (Router, Arc<AppState>) {
        app_with_config(test_config()).await
    }

    async fn app_with_config(config: Config) -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::new(config, Database::in_memory()));
        ensure_admin(&state.database, "Admin", ADMIN_EMAIL, ADMIN_PASSWORD, &PROTECTED_ROUTES)
            .await
            .unwrap();

        let app = build_router(Arc::clone(&state))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        (app, state)
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-Credentials", APP_KEY);

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn login(app: &Router, email: &str, password: &str) -> String {
        let (status, body) = send(
            app,
            request(
                Method::POST,
                "/api/v1/login",
                None,
                Some(json!({ "email": email, "password": password })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn create_user(app: &Router, token: &str, email: &str, access: &[&str]) -> u64 {
        let (status, body) = send(
            app,
            request(
                Method::POST,
                "/api/v1/user",
                Some(token),
                Some(json!({
                    "fullname": "Limited User",
                    "email": email,
                    "password": "limited-pass",
                    "access": access,
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn test_missing_app_key_rejected() {
        let (app, _) = test_app().await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }).to_string()))
            .unwrap();

        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "E_UNAUTHORIZED");
        assert_eq!(body["status"], false);
    }

    #[tokio::test]
    async fn test_login_returns_user_access_and_token() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/api/v1/login",
                None,
                Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], true);
        assert_eq!(body["data"]["email"], ADMIN_EMAIL);
        assert_eq!(body["data"]["access"].as_array().unwrap().len(), PROTECTED_ROUTES.len());
        assert_eq!(body["data"]["token"].as_str().unwrap().len(), 64);
        assert!(body["data"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_bad_login_is_invalid_credentials() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/api/v1/login",
                None,
                Some(json!({ "email": ADMIN_EMAIL, "password": "wrong" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "E_INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        let (app, state) = test_app().await;
        let (status, body) = send(&app, request(Method::GET, "/api/v1/user", None, None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "E_UNAUTHORIZED");
        assert_eq!(body["message"], "Request could not be authorized");
        assert_eq!(state.metrics.get_snapshot(state.gauges()).unauthenticated_requests, 1);
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthenticated() {
        let (app, _) = test_app().await;
        let token = "ab".repeat(32);
        let (status, _) = send(&app, request(Method::GET, "/api/v1/user", Some(&token), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_can_manage_users() {
        let (app, _) = test_app().await;
        let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        let id = create_user(&app, &token, "limited@example.com", &[USER_INDEX]).await;

        let (status, body) = send(
            &app,
            request(Method::GET, &format!("/api/v1/user/{}", id), Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "limited@example.com");
        assert_eq!(body["data"]["created_by"], "Admin");
        assert_eq!(body["data"]["access"][0]["route"], USER_INDEX);

        let (status, body) = send(
            &app,
            request(Method::GET, "/api/v1/user?email=LIMITED", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grant_gates_each_route() {
        let (app, state) = test_app().await;
        let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
        create_user(&app, &admin_token, "limited@example.com", &[USER_INDEX]).await;
        let token = login(&app, "limited@example.com", "limited-pass").await;

        let (status, _) = send(&app, request(Method::GET, "/api/v1/user", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, request(Method::GET, "/api/v1/user/1", Some(&token), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "E_FORBIDDEN");
        assert_eq!(body["message"], "Request could not be authorized");

        let snapshot = state.metrics.get_snapshot(state.gauges());
        assert_eq!(snapshot.denied_requests, 1);
    }

    #[tokio::test]
    async fn test_update_reconciles_and_takes_effect() {
        let (app, _) = test_app().await;
        let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
        let id = create_user(&app, &admin_token, "limited@example.com", &[USER_INDEX]).await;
        let token = login(&app, "limited@example.com", "limited-pass").await;

        let (status, _) = send(
            &app,
            request(
                Method::PUT,
                &format!("/api/v1/user/{}", id),
                Some(&admin_token),
                Some(json!({ "access": [USER_SHOW] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        // The next request sees the new grants
        let (status, _) = send(&app, request(Method::GET, "/api/v1/user", Some(&token), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, request(Method::GET, "/api/v1/user/1", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_update_rejects_empty_access() {
        let (app, _) = test_app().await;
        let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        let (status, body) = send(
            &app,
            request(Method::PUT, "/api/v1/user/1", Some(&token), Some(json!({ "access": [] }))),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "E_VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_create_validation_and_conflict() {
        let (app, _) = test_app().await;
        let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        let (status, _) = send(
            &app,
            request(
                Method::POST,
                "/api/v1/user",
                Some(&token),
                Some(json!({
                    "fullname": "Dup",
                    "email": "dup@example.com",
                    "password": "password",
                    "access": [USER_INDEX, USER_INDEX],
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/api/v1/user",
                Some(&token),
                Some(json!({
                    "fullname": "Admin Twin",
                    "email": ADMIN_EMAIL,
                    "password": "password",
                    "access": [USER_INDEX],
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "E_CONFLICT");
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let (app, _) = test_app().await;
        let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/user")
            .header("X-Credentials", APP_KEY)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "E_VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_toggle_active_signs_user_out() {
        let (app, _) = test_app().await;
        let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
        let id = create_user(&app, &admin_token, "limited@example.com", &[USER_INDEX]).await;
        let token = login(&app, "limited@example.com", "limited-pass").await;

        let (status, _) = send(
            &app,
            request(Method::PATCH, &format!("/api/v1/user/{}", id), Some(&admin_token), None),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, request(Method::GET, "/api/v1/user", Some(&token), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, body) = send(
            &app,
            request(Method::GET, &format!("/api/v1/user/{}", id), Some(&admin_token), None),
        )
        .await;
        assert_eq!(body["data"]["active"], false);
        assert_eq!(body["data"]["updated_by"], "Admin");
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (app, _) = test_app().await;
        let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        for uri in ["/api/v1/user/999", "/api/v1/user/not-a-number"] {
            let (status, body) = send(&app, request(Method::GET, uri, Some(&token), None)).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["code"], "E_NOT_FOUND");
        }
    }

    #[tokio::test]
    async fn test_login_lockout() {
        let (app, _) = test_app().await;
        let attempt = || {
            request(
                Method::POST,
                "/api/v1/login",
                None,
                Some(json!({ "email": ADMIN_EMAIL, "password": "guess" })),
            )
        };

        for _ in 0..3 {
            let (status, _) = send(&app, attempt()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, body) = send(&app, attempt()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "E_TOO_MANY_ATTEMPTS");
    }

    #[tokio::test]
    async fn test_metrics_requires_app_key() {
        let (app, _) = test_app().await;

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/metrics")
            .header("X-Credentials", APP_KEY)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let snapshot: MetricsSnapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snapshot.registered_users, 1);
        assert_eq!(snapshot.stored_grants, PROTECTED_ROUTES.len());
    }

    #[tokio::test]
    async fn test_health_and_fallback() {
        let (app, _) = test_app().await;

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let req = Request::builder().uri("/nowhere").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, "E_NOT_FOUND");
    }

    fn docs_app_config() -> Config {
        config_with("[docs]\nuser = \"docs\"\npassword = \"secret\"\n")
    }

    fn docs_request(uri: &str, authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_docs_absent_without_credentials() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, docs_request("/swagger", Some("Basic ZG9jczpzZWNyZXQ="))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "E_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_docs_require_basic_auth() {
        let (app, _) = app_with_config(docs_app_config()).await;

        for authorization in [None, Some("Basic ZG9jczp3cm9uZw=="), Some("Bearer ZG9jczpzZWNyZXQ=")] {
            let response = app.clone().oneshot(docs_request("/swagger", authorization)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
            assert!(challenge.starts_with("Basic "));
        }

        // The app key does not open the docs
        let req = Request::builder()
            .uri("/docs")
            .header("X-Credentials", APP_KEY)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_docs_served_with_credentials() {
        let (app, _) = app_with_config(docs_app_config()).await;

        let (status, body) = send(&app, docs_request("/swagger", Some("Basic ZG9jczpzZWNyZXQ="))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["openapi"], "3.0.3");
        assert!(body["paths"].get("/api/v1/user/{id}").is_some());

        let response = app
            .clone()
            .oneshot(docs_request("/docs", Some("basic ZG9jczpzZWNyZXQ=")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("/swagger"));
    }
}
