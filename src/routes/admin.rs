//! Operator endpoints, guarded by the `[auth.admin]` bearer token.
//!
//! - `POST /admin/sync` - Run a bulk user sync against the configured user API
//! - `POST /admin/tokens` - Mint a login token and URL for a main application user

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::{
    AppState,
    auth::TokenError,
    routes::ErrorResponse,
    services::{BulkSyncError, SyncReport},
};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// No admin token is configured, so the admin API does not exist
    #[error("Admin API is disabled")]
    Disabled,

    #[error("Admin token required")]
    Unauthorized,

    #[error("{0}")]
    NotConfigured(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Upstream(#[from] BulkSyncError),

    #[error("{0}")]
    Internal(String),
}

impl From<TokenError> for AdminError {
    fn from(err: TokenError) -> Self {
        AdminError::Internal(err.to_string())
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            AdminError::Disabled => (StatusCode::NOT_FOUND, "not_found_error", "not_found"),
            AdminError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_admin_token",
            ),
            AdminError::NotConfigured(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "not_configured",
            ),
            AdminError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
            ),
            AdminError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error", "user_api_failed"),
            AdminError::Internal(msg) => {
                tracing::error!(error = %msg, "Admin request failed");
                let body =
                    ErrorResponse::with_type("server_error", "internal_error", "Internal error");
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };

        let body = ErrorResponse::with_type(error_type, code, self.to_string());
        (status, Json(body)).into_response()
    }
}

/// Require `Authorization: Bearer <auth.admin.token>`.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AdminError> {
    let Some(admin) = &state.config.auth.admin else {
        return Err(AdminError::Disabled);
    };

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AdminError::Unauthorized)?;

    // Constant-time comparison to prevent timing attacks
    let token_matches: bool = provided.as_bytes().ct_eq(admin.token.as_bytes()).into();
    if !token_matches {
        tracing::warn!(path = %req.uri().path(), "Rejected admin request with invalid token");
        return Err(AdminError::Unauthorized);
    }

    Ok(next.run(req).await)
}

/// Run a bulk sync against `[sync]`.
#[tracing::instrument(name = "admin.sync_users", skip(state))]
pub async fn sync_users(State(state): State<AppState>) -> Result<Json<SyncReport>, AdminError> {
    let (api_url, api_token) = state.config.sync.credentials().ok_or_else(|| {
        AdminError::NotConfigured("sync.api_url and sync.api_token must both be set".into())
    })?;

    let report = state.bulk_sync.sync_all(api_url, api_token).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueTokenRequest {
    pub user_id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueTokenResponse {
    pub token: String,
    pub login_url: String,
}

/// Mint a login token for a main application user.
#[tracing::instrument(name = "admin.issue_token", skip_all)]
pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<Json<IssueTokenResponse>, AdminError> {
    if request.user_id.is_empty() {
        return Err(AdminError::BadRequest("user_id cannot be empty".into()));
    }
    if request.email.is_empty() {
        return Err(AdminError::BadRequest("email cannot be empty".into()));
    }

    let role = request
        .role
        .as_deref()
        .unwrap_or(crate::auth::DEFAULT_ROLE);
    let token = state.issuer.issue(
        &request.user_id,
        &request.email,
        &request.name,
        role,
        request.company_id.as_deref(),
    )?;
    let login_url = state.issuer.build_login_url(&token);

    tracing::info!(user_id = %request.user_id, "Issued login token");
    Ok(Json(IssueTokenResponse { token, login_url }))
}
