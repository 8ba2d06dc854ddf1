//! End-to-end tests against the full router.
//!
//! Requests go through `build_app` with `tower::ServiceExt::oneshot`; the
//! main application's user API is a wiremock server.

mod login_e2e;
mod sync_e2e;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use tower::ServiceExt;

use crate::{AppState, build_app, config::SsoBridgeConfig, store::MemoryUserStore};

pub(crate) const SECRET: &str = "a1b2c3d4e5f6g7h8i9j0k1l2m3n4o5p6q7r8s9t0";
pub(crate) const ADMIN_TOKEN: &str = "admin-token";
pub(crate) const SESSION_COOKIE: &str = "superset_sso_session";

/// Router plus a handle on its user store.
pub(crate) struct TestHarness {
    pub app: Router,
    pub store: Arc<MemoryUserStore>,
}

impl TestHarness {
    /// `extra_config` is appended to a minimal config with an admin token.
    pub fn new(extra_config: &str) -> Self {
        Self::with_store(extra_config, Arc::new(MemoryUserStore::new()))
    }

    pub fn with_store(extra_config: &str, store: Arc<MemoryUserStore>) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let config = SsoBridgeConfig::from_str(&format!(
            r#"
            [auth.jwt]
            secret = "{SECRET}"

            [auth.session]
            secure = false

            [auth.admin]
            token = "{ADMIN_TOKEN}"

            {extra_config}
            "#
        ))
        .expect("test config should parse");

        let state = AppState::with_store(config.clone(), store.clone())
            .expect("state should build");
        Self {
            app: build_app(&config, state),
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_with_cookie(&self, uri: &str, cookie: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

/// Sign arbitrary claims with the test secret.
pub(crate) fn sign(claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub(crate) fn in_one_hour() -> i64 {
    chrono::Utc::now().timestamp() + 3600
}

pub(crate) async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub(crate) async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// The `name=value` pair of the session cookie set on `response`, if any.
pub(crate) fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}
