//! Admin credentials: HTTP Basic Authentication for host routes and the
//! JSON login endpoint

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::types::Role;
use crate::ws::WsQuery;

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Admin username (None = auth disabled)
    pub username: Option<String>,
    /// Admin password
    pub password: Option<String>,
}

impl AuthConfig {
    /// Load auth config from environment variables
    /// ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable auth
    pub fn from_env() -> Self {
        let username = std::env::var("ADMIN_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Host authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Host authentication DISABLED - anyone can run host commands!");
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate credentials
    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => true, // Auth disabled, allow all
        }
    }

    /// Check an `Authorization: Basic ...` header
    fn validate_basic(&self, headers: &HeaderMap) -> bool {
        let Some((username, password)) = basic_credentials(headers) else {
            return false;
        };
        self.validate(&username, &password)
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized(realm: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", realm))],
        "Unauthorized",
    )
        .into_response()
}

/// Middleware for HTTP Basic Authentication on host API routes
pub async fn host_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_config.is_enabled() || auth_config.validate_basic(request.headers()) {
        return next.run(request).await;
    }
    unauthorized("Livepoll Host")
}

/// Middleware to require HTTP Basic Auth for host WebSocket connections.
///
/// Audience connections pass through untouched.
pub async fn host_ws_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Decode the query exactly as the WebSocket handler will
    let role = match Query::<WsQuery>::try_from_uri(request.uri()) {
        Ok(Query(params)) => params.role(),
        Err(rejection) => return rejection.into_response(),
    };
    if role != Role::Host {
        return next.run(request).await;
    }

    if !auth_config.is_enabled() {
        tracing::warn!(
            "Host WebSocket requested but host authentication is DISABLED; set ADMIN_USERNAME and ADMIN_PASSWORD to prevent host takeover"
        );
        return next.run(request).await;
    }

    if auth_config.validate_basic(request.headers()) {
        return next.run(request).await;
    }
    unauthorized("Livepoll Host (WebSocket)")
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Check admin credentials.
///
/// POST /api/login
pub async fn login(
    State(auth_config): State<Arc<AuthConfig>>,
    Json(body): Json<LoginRequest>,
) -> Response {
    if !auth_config.is_enabled() {
        tracing::error!("Login attempted but ADMIN_USERNAME/ADMIN_PASSWORD are not set");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Server misconfiguration: Credentials not set" })),
        )
            .into_response();
    }

    if auth_config.validate(&body.username, &body.password) {
        tracing::info!("Admin login succeeded");
        (StatusCode::OK, Json(json!({ "success": true }))).into_response()
    } else {
        tracing::warn!("Admin login rejected");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid credentials" })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, routing::post, Router};
    use tower::ServiceExt;

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)))
    }

    #[test]
    fn test_ws_role_is_read_decoded() {
        let role = |uri: &str| {
            let uri = uri.parse().unwrap();
            Query::<WsQuery>::try_from_uri(&uri).unwrap().0.role()
        };
        assert_eq!(role("/ws?role=host&token=abc"), Role::Host);
        assert_eq!(role("/ws?role=%68ost"), Role::Host);
        assert_eq!(role("/ws?role=audience"), Role::Audience);
        assert_eq!(role("/ws"), Role::Audience);
    }

    #[test]
    fn test_auth_config_disabled_when_incomplete() {
        let config = AuthConfig::disabled();
        assert!(!config.is_enabled());
        assert!(config.validate("any", "thing"));

        let config = AuthConfig {
            username: Some("user".to_string()),
            password: None,
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_auth_config_enabled() {
        let config = AuthConfig::new("admin", "secret");
        assert!(config.is_enabled());
        assert!(config.validate("admin", "secret"));
        assert!(!config.validate("admin", "wrong"));
        assert!(!config.validate("wrong", "secret"));
        assert!(!config.validate("", ""));
    }

    #[test]
    fn test_basic_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic YWRtaW46c2VjcmV0".parse().unwrap());
        assert_eq!(
            basic_credentials(&headers),
            Some(("admin".to_string(), "secret".to_string()))
        );

        headers.insert(header::AUTHORIZATION, "Basic !!!".parse().unwrap());
        assert_eq!(basic_credentials(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(basic_credentials(&headers), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }

    fn login_app(config: AuthConfig) -> Router {
        Router::new()
            .route("/api/login", post(login))
            .with_state(Arc::new(config))
    }

    async fn post_login(app: Router, body: &str) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_login_status_codes() {
        let config = AuthConfig::new("admin", "secret");
        let ok = post_login(
            login_app(config.clone()),
            r#"{"username":"admin","password":"secret"}"#,
        )
        .await;
        assert_eq!(ok, StatusCode::OK);

        let rejected = post_login(
            login_app(config),
            r#"{"username":"admin","password":"nope"}"#,
        )
        .await;
        assert_eq!(rejected, StatusCode::UNAUTHORIZED);

        let misconfigured = post_login(
            login_app(AuthConfig::disabled()),
            r#"{"username":"admin","password":"secret"}"#,
        )
        .await;
        assert_eq!(misconfigured, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_host_ws_requires_credentials() {
        let app = Router::new()
            .route("/ws", get(|| async { "upgraded" }))
            .layer(middleware::from_fn_with_state(
                Arc::new(AuthConfig::new("admin", "secret")),
                host_ws_auth_middleware,
            ));

        let audience = Request::builder()
            .uri("/ws?role=audience")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(audience).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let host = Request::builder()
            .uri("/ws?role=host")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(host).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        // Percent-encoded "host" still needs credentials
        let encoded = Request::builder()
            .uri("/ws?role=%68ost")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(encoded).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let host = Request::builder()
            .uri("/ws?role=host")
            .header(header::AUTHORIZATION, basic("admin", "secret"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(host).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
