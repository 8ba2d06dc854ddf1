use serde::{Deserialize, Serialize};

use super::{ConfigError, validate_url};

/// Bulk user synchronization configuration.
///
/// Both values can also be passed on the command line of `sync-users`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// URL of the main application's user list endpoint.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Bearer token for the user list endpoint.
    #[serde(default)]
    pub api_token: Option<String>,
}

impl SyncConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        match &self.api_url {
            Some(url) => validate_url("sync.api_url", url, &["http", "https"]),
            None => Ok(()),
        }
    }

    /// Returns the endpoint and token when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.api_url.as_deref()?, self.api_token.as_deref()?))
    }
}
