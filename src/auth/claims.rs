//! Claims carried by SSO tokens.
//!
//! The main application names its claims in camelCase (`firstName`,
//! `companyId`). Everything except `id` is optional on the way in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role assumed when a token carries none.
pub const DEFAULT_ROLE: &str = "company_user";

/// Claims as they appear in the token, before defaults are applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawClaims {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub company_id: Option<Value>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Verified claims with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserClaims {
    /// External user id, normalized to a string.
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    /// Company id exactly as the token carried it (string or number).
    pub company_id: Option<Value>,
    pub expires_at: Option<i64>,
}

/// Why a token's `id` claim could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdProblem {
    Missing,
    WrongType,
}

impl RawClaims {
    pub(crate) fn into_user_claims(self) -> Result<UserClaims, IdProblem> {
        let id = normalize_id(self.id.as_ref())?;

        Ok(UserClaims {
            email: self
                .email
                .unwrap_or_else(|| format!("user_{id}@example.com")),
            first_name: self.first_name.unwrap_or_else(|| "User".to_string()),
            last_name: self.last_name.unwrap_or_else(|| id.clone()),
            role: self.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            company_id: self.company_id.filter(|v| !v.is_null()),
            expires_at: self.exp,
            id,
        })
    }
}

/// Accepts a non-empty string or a non-zero number.
fn normalize_id(id: Option<&Value>) -> Result<String, IdProblem> {
    match id {
        None | Some(Value::Null) => Err(IdProblem::Missing),
        Some(Value::String(s)) if s.is_empty() => Err(IdProblem::Missing),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => Err(IdProblem::Missing),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(IdProblem::WrongType),
    }
}

/// Claims written by the token issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedClaims {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}
