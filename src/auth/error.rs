use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::SessionError;
use crate::{routes::ErrorResponse, store::StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No session cookie or bearer token was presented
    #[error("Authentication credentials required")]
    MissingCredentials,

    /// Credentials were provided but are invalid (generic, prevents enumeration)
    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    /// The account exists but has been deactivated in Superset
    #[error("User account is inactive")]
    InactiveUser,

    /// Session not found or expired
    #[error("Session not found")]
    SessionNotFound,

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    #[error("Internal authentication error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            AuthError::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "missing_credentials",
            ),
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_credentials",
            ),
            AuthError::InactiveUser => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "inactive_user",
            ),
            AuthError::SessionNotFound => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "session_not_found",
            ),
            AuthError::Forbidden(_) => (StatusCode::FORBIDDEN, "permission_error", "forbidden"),
            AuthError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal authentication error");
                let body = ErrorResponse::with_type(
                    "server_error",
                    "internal_error",
                    "Internal authentication error",
                );
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };

        let body = ErrorResponse::with_type(error_type, code, self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => AuthError::SessionNotFound,
            SessionError::Storage(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_session_not_found_is_401() {
        let response = AuthError::SessionNotFound.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "authentication_error");
        assert_eq!(body["error"]["code"], "session_not_found");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = AuthError::Internal("disk I/O error".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "internal_error");
        assert!(!body["error"]["message"].as_str().unwrap().contains("disk"));
    }

    #[test]
    fn test_session_storage_error_maps_to_internal() {
        let err: AuthError = SessionError::Storage("gone".into()).into();
        assert!(matches!(err, AuthError::Internal(ref m) if m == "gone"));
    }
}
