//! Per-deployment Superset settings: branding, theme, feature flags and the
//! cache/broker/database wiring that `superset_config.py` consumes.
//!
//! The bridge does not act on most of these values. It validates them at load
//! time and serves the browser-safe subset at `/api/v1/deployment` so that the
//! theming scripts and Superset share one source.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ConfigError, validate_url};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub branding: BrandingConfig,

    /// Theme token overrides (colors, typography, z-index ...), passed through
    /// to the frontend untouched.
    #[serde(default)]
    pub theme_overrides: Map<String, Value>,

    /// Superset feature flags.
    #[serde(default)]
    pub feature_flags: BTreeMap<String, bool>,

    #[serde(default)]
    pub cache: Option<RedisCacheConfig>,

    #[serde(default)]
    pub results_backend: Option<RedisCacheConfig>,

    #[serde(default)]
    pub celery: Option<CeleryConfig>,

    /// Extra databases registered in Superset, keyed by name.
    #[serde(default)]
    pub additional_databases: BTreeMap<String, AdditionalDatabase>,

    #[serde(default)]
    pub csrf: CsrfConfig,
}

impl DeploymentConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        for (section, cache) in [
            ("deployment.cache", &self.cache),
            ("deployment.results_backend", &self.results_backend),
        ] {
            if let Some(cache) = cache {
                validate_redis_url(section, &cache.redis_url)?;
            }
        }
        if let Some(celery) = &self.celery {
            validate_redis_url("deployment.celery.broker_url", &celery.broker_url)?;
            if let Some(backend) = &celery.result_backend {
                validate_redis_url("deployment.celery.result_backend", backend)?;
            }
        }
        for (name, db) in &self.additional_databases {
            if db.sqlalchemy_uri.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "deployment.additional_databases.{name}.sqlalchemy_uri cannot be empty"
                )));
            }
        }
        Ok(())
    }

    /// The subset of the deployment settings that is safe to hand to browsers.
    pub fn public_view(&self) -> PublicDeployment {
        PublicDeployment {
            branding: self.branding.clone(),
            theme_overrides: self.theme_overrides.clone(),
            feature_flags: self.feature_flags.clone(),
            databases: self
                .additional_databases
                .iter()
                .map(|(name, db)| PublicDatabase {
                    name: name.clone(),
                    description: db.description.clone(),
                    allow_file_upload: db.allow_file_upload,
                })
                .collect(),
        }
    }
}

fn validate_redis_url(section: &str, url: &str) -> Result<(), ConfigError> {
    validate_url(section, url, &["redis", "rediss"])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrandingConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub app_icon: Option<String>,
    #[serde(default)]
    pub favicon: Option<String>,
    #[serde(default = "default_logo_target")]
    pub logo_target_path: String,
    #[serde(default)]
    pub custom_css: Option<String>,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            app_icon: None,
            favicon: None,
            logo_target_path: default_logo_target(),
            custom_css: None,
        }
    }
}

fn default_app_name() -> String {
    "Superset".to_string()
}

fn default_logo_target() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisCacheConfig {
    pub redis_url: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default = "default_cache_timeout")]
    pub default_timeout_secs: u64,
}

fn default_cache_timeout() -> u64 {
    60 * 60 * 24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CeleryConfig {
    pub broker_url: String,
    #[serde(default)]
    pub result_backend: Option<String>,
    #[serde(default = "default_prefetch")]
    pub prefetch_multiplier: u32,
}

fn default_prefetch() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdditionalDatabase {
    pub sqlalchemy_uri: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub allow_file_upload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsrfConfig {
    #[serde(default = "crate::config::default_true")]
    pub enabled: bool,
    #[serde(default = "default_csrf_time_limit")]
    pub time_limit_secs: u64,
    #[serde(default)]
    pub exempt: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_limit_secs: default_csrf_time_limit(),
            exempt: Vec::new(),
        }
    }
}

fn default_csrf_time_limit() -> u64 {
    60 * 60 * 24 * 365
}

/// Browser-safe deployment settings.
#[derive(Debug, Clone, Serialize)]
pub struct PublicDeployment {
    pub branding: BrandingConfig,
    pub theme_overrides: Map<String, Value>,
    pub feature_flags: BTreeMap<String, bool>,
    pub databases: Vec<PublicDatabase>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicDatabase {
    pub name: String,
    pub description: Option<String>,
    pub allow_file_upload: bool,
}
