//! Minting SSO tokens on behalf of the main application.
//!
//! The main application normally signs its own tokens. The issuer exists for
//! operators and tests: it produces tokens the verifier accepts, along with
//! the login URL a browser should be sent to.

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};

use super::{claims::IssuedClaims, verifier::TokenError};
use crate::config::{IssuerConfig, JwtConfig};

pub struct TokenIssuer {
    header: Header,
    encoding_key: EncodingKey,
    audience: String,
    ttl_secs: i64,
    superset_url: String,
}

impl TokenIssuer {
    pub fn new(jwt: &JwtConfig, issuer: &IssuerConfig) -> Self {
        Self {
            header: Header::new(jwt.algorithm.to_jwt_algorithm()),
            encoding_key: EncodingKey::from_secret(jwt.secret.as_bytes()),
            audience: jwt.audience.clone(),
            ttl_secs: i64::try_from(jwt.token_ttl_secs).unwrap_or(i64::MAX),
            superset_url: issuer.superset_url.trim_end_matches('/').to_string(),
        }
    }

    /// Sign a token for one user. `name` is split into first and last name
    /// on its first space.
    pub fn issue(
        &self,
        user_id: &str,
        email: &str,
        name: &str,
        role: &str,
        company_id: Option<&str>,
    ) -> Result<String, TokenError> {
        let (first_name, last_name) = split_name(name);
        let now = Utc::now().timestamp();

        let claims = IssuedClaims {
            id: user_id.to_string(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role: role.to_string(),
            company_id: company_id.map(str::to_string),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
            aud: self.audience.clone(),
        };

        encode(&self.header, &claims, &self.encoding_key).map_err(TokenError::Encoding)
    }

    /// URL that logs the bearer of `token` into Superset.
    pub fn build_login_url(&self, token: &str) -> String {
        format!("{}/login?token={}", self.superset_url, token)
    }
}

/// Split on the first space: `"Jane Doe"` gives `("Jane", "Doe")`,
/// `"Madonna"` gives `("Madonna", "")`.
pub fn split_name(name: &str) -> (&str, &str) {
    name.split_once(' ').unwrap_or((name, ""))
}
