//! Configuration module for the SSO bridge.
//!
//! The bridge is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8088
//!
//! [auth.jwt]
//! secret = "${SUPERSET_JWT_SECRET_KEY}"
//!
//! [database]
//! type = "sqlite"
//! path = "/app/superset_home/superset.db"
//! ```

mod auth;
mod database;
mod deployment;
mod observability;
mod roles;
mod server;
mod sync;

use std::{path::Path, sync::LazyLock};

pub use auth::*;
pub use database::*;
pub use deployment::*;
pub use observability::*;
pub use roles::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use sync::*;

/// Root configuration for the SSO bridge.
///
/// Only `[auth.jwt]` is required; every other section has defaults that match
/// a single-node Superset deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SsoBridgeConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token verification, sessions, and the login view.
    pub auth: AuthConfig,

    /// Settings used when minting tokens for the main application.
    #[serde(default)]
    pub issuer: IssuerConfig,

    /// Application role to Superset role mapping.
    #[serde(default)]
    pub roles: RolesConfig,

    /// Bulk user synchronization against the main application's API.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Where Superset users and roles live.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Branding, theme and Superset deployment settings.
    #[serde(default)]
    pub deployment: DeploymentConfig,
}

impl SsoBridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: SsoBridgeConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.auth.validate()?;
        self.issuer.validate()?;
        self.roles.validate()?;
        self.sync.validate()?;
        self.database.validate()?;
        self.deployment.validate()?;

        if self.auth.session.remember_secs > 0 && !self.auth.session.secure {
            tracing::warn!(
                "Session cookies are not marked secure. Set auth.session.secure = true \
                 when Superset is served over HTTPS."
            );
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Parse `url` and require a host and one of `schemes`.
fn validate_url(field: &str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| ConfigError::Validation(format!("{field} is not a valid URL '{url}': {e}")))?;

    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::Validation(format!(
            "{field} must use one of the schemes {}, got '{url}'",
            schemes.join(", ")
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::Validation(format!(
            "{field} must include a host, got '{url}'"
        )));
    }
    Ok(())
}

static ENV_VAR_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Byte offset of the `#` that starts a comment, skipping any `#` inside a
/// basic (`"..."`) or literal (`'...'`) string on the same line.
fn comment_start(line: &str) -> Option<usize> {
    let mut quote = None;
    let mut escaped = false;

    for (pos, c) in line.char_indices() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' => return Some(pos),
            None => {}
        }
    }
    None
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables after a `#` on the same line are left untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for (index, line) in input.lines().enumerate() {
        if index > 0 {
            result.push('\n');
        }

        let comment_pos = comment_start(line);
        let mut last_end = 0;

        for cap in ENV_VAR_PATTERN.captures_iter(line) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let value = std::env::var(name.as_str())
                .map_err(|_| ConfigError::EnvVarNotFound(name.as_str().to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
    }

    if input.ends_with('\n') {
        result.push('\n');
    }

    Ok(result)
}

pub(crate) fn default_true() -> bool {
    true
}
