use serde::{Deserialize, Serialize};

/// Standard error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

/// `{"error": {"type": "...", "message": "...", "param": ..., "code": ...}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error type classification (e.g., "invalid_request_error", "authentication_error")
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    /// Parameter that caused the error (null if not applicable)
    pub param: Option<String>,
    /// Machine-readable error code
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Create an `invalid_request_error` response.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_type("invalid_request_error", code, message)
    }

    /// Create an error response referencing the request parameter at fault.
    pub fn with_param(
        code: impl Into<String>,
        message: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        let mut response = Self::new(code, message);
        response.error.param = Some(param.into());
        response
    }

    /// Create an error response with an explicit error type.
    ///
    /// Types in use:
    /// - "invalid_request_error" - Invalid parameters or malformed request
    /// - "authentication_error" - Missing or invalid credentials
    /// - "permission_error" - Authenticated but not allowed
    /// - "upstream_error" - The main application's API failed
    /// - "server_error" - Internal server error
    pub fn with_type(
        error_type: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorInfo {
                error_type: error_type.into(),
                message: message.into(),
                param: None,
                code: Some(code.into()),
            },
        }
    }
}
