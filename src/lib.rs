//! JWT single sign-on bridge and user synchronization for Apache Superset.
//!
//! The main application signs a short JWT and sends the browser to
//! `/login?token=...`. The bridge verifies it, maps the application role to a
//! Superset role, finds or creates the Superset account and starts a session.
//! [`services::BulkSyncClient`] runs the same upsert for every user the main
//! application knows about.

pub mod auth;
pub mod config;
pub mod observability;
pub mod routes;
pub mod services;
pub mod store;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    auth::{MemorySessionStore, SessionStore, SsoAuthenticator, TokenIssuer, TokenVerifier},
    config::SsoBridgeConfig,
    routes::login::LoginPage,
    services::{BulkSyncClient, RoleMapper, UserSyncService},
    store::{StoreError, UserStore},
};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SsoBridgeConfig>,
    pub store: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub sso: Arc<SsoAuthenticator>,
    pub issuer: Arc<TokenIssuer>,
    pub bulk_sync: Arc<BulkSyncClient>,
    pub login_page: Arc<LoginPage>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to open user store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to compile login page template: {0}")]
    Template(#[from] handlebars::TemplateError),
}

impl AppState {
    /// Open the configured user store and wire every service to it.
    pub async fn new(config: SsoBridgeConfig) -> Result<Self, StartupError> {
        let store = store::open(&config.database).await?;
        Self::with_store(config, store)
    }

    /// Wire every service to an already opened user store.
    pub fn with_store(
        config: SsoBridgeConfig,
        store: Arc<dyn UserStore>,
    ) -> Result<Self, StartupError> {
        let http_client = config.server.http_client.build_client()?;

        // One mapping table for the login path and the batch path
        let roles = Arc::new(RoleMapper::new(&config.roles));
        let user_sync = UserSyncService::new(store.clone(), roles)
            .preserve_unmanaged_roles(config.roles.preserve_unmanaged_roles);

        let sso = SsoAuthenticator::new(TokenVerifier::new(&config.auth.jwt), user_sync.clone());
        let issuer = TokenIssuer::new(&config.auth.jwt, &config.issuer);
        let bulk_sync = BulkSyncClient::new(http_client, user_sync);

        Ok(Self {
            config: Arc::new(config),
            store,
            sessions: Arc::new(MemorySessionStore::new()),
            sso: Arc::new(sso),
            issuer: Arc::new(issuer),
            bulk_sync: Arc::new(bulk_sync),
            login_page: Arc::new(LoginPage::new()?),
        })
    }
}

pub fn build_app(config: &SsoBridgeConfig, state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/sync", post(routes::admin::sync_users))
        .route("/admin/tokens", post(routes::admin::issue_token))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            routes::admin::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness))
        .route(
            "/login",
            get(routes::login::login_view).post(routes::login::login_submit),
        )
        // Superset's own login route carries a trailing slash
        .route(
            "/login/",
            get(routes::login::login_view).post(routes::login::login_submit),
        )
        .route("/logout", get(routes::login::logout))
        .route("/me", get(routes::login::me))
        .route(
            "/api/v1/deployment",
            get(routes::deployment::get_deployment),
        )
        .merge(admin)
        .layer(tower_cookies::CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.server.timeout(),
        ))
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}
