use serde::{Deserialize, Serialize};

use super::{ConfigError, validate_url};

/// Thirty days, the lifetime of tokens handed out by the main application.
const THIRTY_DAYS_SECS: u64 = 60 * 60 * 24 * 30;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared-secret JWT settings used by both the verifier and the issuer.
    pub jwt: JwtConfig,

    /// Session cookie settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Login view settings.
    #[serde(default)]
    pub login: LoginConfig,

    /// Bearer token guarding `/admin/*` endpoints. Admin routes are disabled
    /// when omitted.
    #[serde(default)]
    pub admin: Option<AdminConfig>,
}

impl AuthConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()?;
        self.session.validate()?;
        self.login.validate()?;
        if let Some(admin) = &self.admin
            && admin.token.is_empty()
        {
            return Err(ConfigError::Validation(
                "auth.admin.token cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// JWT configuration.
///
/// Tokens are signed with a secret shared out-of-band with the main
/// application, so only HMAC algorithms are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JwtConfig {
    /// Shared signing secret.
    pub secret: String,

    /// Signing algorithm.
    #[serde(default)]
    pub algorithm: JwtAlgorithm,

    /// Expected audience (aud claim).
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Lifetime of issued tokens in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Clock skew tolerated when checking `exp`, in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

impl JwtConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::Validation(
                "auth.jwt.secret cannot be empty".into(),
            ));
        }
        if self.secret.len() < 32 {
            tracing::warn!(
                length = self.secret.len(),
                "auth.jwt.secret is shorter than 32 bytes; use a longer shared secret"
            );
        }
        if self.audience.is_empty() {
            return Err(ConfigError::Validation(
                "auth.jwt.audience cannot be empty".into(),
            ));
        }
        if self.token_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.jwt.token_ttl_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// JWT signing algorithm (shared-secret HMAC only).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JwtAlgorithm {
    /// HMAC with SHA-256
    #[default]
    HS256,
    /// HMAC with SHA-384
    HS384,
    /// HMAC with SHA-512
    HS512,
}

impl JwtAlgorithm {
    /// Convert to jsonwebtoken Algorithm.
    pub fn to_jwt_algorithm(self) -> jsonwebtoken::Algorithm {
        match self {
            JwtAlgorithm::HS256 => jsonwebtoken::Algorithm::HS256,
            JwtAlgorithm::HS384 => jsonwebtoken::Algorithm::HS384,
            JwtAlgorithm::HS512 => jsonwebtoken::Algorithm::HS512,
        }
    }

    /// Check if this algorithm matches a jsonwebtoken Algorithm.
    pub fn matches(self, alg: jsonwebtoken::Algorithm) -> bool {
        self.to_jwt_algorithm() == alg
    }
}

fn default_audience() -> String {
    "superset".to_string()
}

fn default_token_ttl() -> u64 {
    THIRTY_DAYS_SECS
}

fn default_leeway() -> u64 {
    60
}

/// Session cookie configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Cookie name for the session ID.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Mark the cookie `Secure` (HTTPS only).
    #[serde(default = "crate::config::default_true")]
    pub secure: bool,

    /// SameSite attribute of the cookie.
    #[serde(default)]
    pub same_site: SameSite,

    /// How long a "remember me" session lasts, in seconds.
    #[serde(default = "default_remember")]
    pub remember_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secure: true,
            same_site: SameSite::default(),
            remember_secs: default_remember(),
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_name.is_empty() {
            return Err(ConfigError::Validation(
                "auth.session.cookie_name cannot be empty".into(),
            ));
        }
        if self.remember_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.session.remember_secs must be greater than zero".into(),
            ));
        }
        if self.same_site == SameSite::None && !self.secure {
            return Err(ConfigError::Validation(
                "auth.session.same_site = \"none\" requires auth.session.secure = true".into(),
            ));
        }
        Ok(())
    }
}

fn default_cookie_name() -> String {
    "superset_sso_session".to_string()
}

fn default_remember() -> u64 {
    THIRTY_DAYS_SECS
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

/// Login view configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginConfig {
    /// Where to send the browser after a successful login.
    #[serde(default = "default_index_url")]
    pub index_url: String,

    /// Query parameter carrying the SSO token.
    #[serde(default = "default_token_name")]
    pub token_param: String,

    /// Cookie carrying the SSO token when the query parameter is absent.
    #[serde(default = "default_token_name")]
    pub token_cookie: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            token_param: default_token_name(),
            token_cookie: default_token_name(),
        }
    }
}

impl LoginConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        // Relative paths only, so a misconfiguration cannot become an open redirect.
        if !self.index_url.starts_with('/') || self.index_url.starts_with("//") {
            return Err(ConfigError::Validation(format!(
                "auth.login.index_url must be a relative path, got '{}'",
                self.index_url
            )));
        }
        if self.token_param.is_empty() || self.token_cookie.is_empty() {
            return Err(ConfigError::Validation(
                "auth.login token parameter and cookie names cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_index_url() -> String {
    "/superset/welcome/".to_string()
}

fn default_token_name() -> String {
    "token".to_string()
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminConfig {
    /// Bearer token required on `/admin/*` requests.
    pub token: String,
}

/// Token issuer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuerConfig {
    /// Public base URL of Superset; login URLs are built from it.
    #[serde(default = "default_superset_url")]
    pub superset_url: String,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            superset_url: default_superset_url(),
        }
    }
}

impl IssuerConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        validate_url("issuer.superset_url", &self.superset_url, &["http", "https"])
    }
}

fn default_superset_url() -> String {
    "http://localhost:3200".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(secret: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.to_string(),
            algorithm: JwtAlgorithm::HS256,
            audience: default_audience(),
            token_ttl_secs: default_token_ttl(),
            leeway_secs: default_leeway(),
        }
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(jwt("").validate().is_err());
        assert!(jwt("a-long-enough-shared-secret-for-hs256").validate().is_ok());
    }

    #[test]
    fn test_token_ttl_defaults_to_thirty_days() {
        assert_eq!(default_token_ttl(), 2_592_000);
    }

    #[test]
    fn test_jwt_algorithm_matches() {
        assert!(JwtAlgorithm::HS256.matches(jsonwebtoken::Algorithm::HS256));
        assert!(!JwtAlgorithm::HS256.matches(jsonwebtoken::Algorithm::HS512));
        assert!(!JwtAlgorithm::HS384.matches(jsonwebtoken::Algorithm::RS256));
    }

    #[test]
    fn test_index_url_must_be_relative() {
        let login = LoginConfig {
            index_url: "https://evil.example.com".into(),
            ..LoginConfig::default()
        };
        assert!(login.validate().is_err());

        let login = LoginConfig {
            index_url: "//evil.example.com".into(),
            ..LoginConfig::default()
        };
        assert!(login.validate().is_err());

        assert!(LoginConfig::default().validate().is_ok());
    }

    #[test]
    fn test_same_site_none_requires_secure() {
        let session = SessionConfig {
            same_site: SameSite::None,
            secure: false,
            ..SessionConfig::default()
        };
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_issuer_url_scheme() {
        let issuer = IssuerConfig {
            superset_url: "ftp://bi.example.com".into(),
        };
        assert!(issuer.validate().is_err());
        assert!(IssuerConfig::default().validate().is_ok());

        for bad in ["http://", "https://:443", "bi.example.com", ""] {
            let issuer = IssuerConfig {
                superset_url: bad.into(),
            };
            assert!(issuer.validate().is_err(), "{bad:?} should be rejected");
        }
    }
}
