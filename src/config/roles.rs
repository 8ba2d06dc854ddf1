use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Application role to Superset role mapping.
///
/// The built-in table covers the main application's roles. Entries under
/// `[roles.mapping]` are layered on top of it, replacing built-in entries with
/// the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolesConfig {
    /// Additional or overriding `application role = "Superset role"` entries.
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,

    /// Superset role used when an application role has no mapping.
    #[serde(default = "default_fallback")]
    pub fallback: String,

    /// Keep roles outside the mapping's targets when re-syncing an existing
    /// user. When false, a sync replaces the user's roles with the mapped role.
    #[serde(default)]
    pub preserve_unmanaged_roles: bool,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            mapping: BTreeMap::new(),
            fallback: default_fallback(),
            preserve_unmanaged_roles: false,
        }
    }
}

impl RolesConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback.trim().is_empty() {
            return Err(ConfigError::Validation(
                "roles.fallback cannot be empty".into(),
            ));
        }
        for (app_role, superset_role) in &self.mapping {
            if app_role.trim().is_empty() || superset_role.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "roles.mapping entry '{app_role}' = '{superset_role}' has an empty side"
                )));
            }
        }
        Ok(())
    }
}

fn default_fallback() -> String {
    "Gamma".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_fallback_rejected() {
        let config = RolesConfig {
            fallback: " ".into(),
            ..RolesConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_mapping_target_rejected() {
        let mut config = RolesConfig::default();
        config.mapping.insert("auditor".into(), String::new());
        assert!(config.validate().is_err());
    }
}
