use std::collections::{BTreeMap, BTreeSet};

use crate::config::RolesConfig;

/// Main application roles and the Superset role each one grants.
pub const DEFAULT_ROLE_MAPPING: &[(&str, &str)] = &[
    ("super_admin", "Admin"),
    ("platform_admin", "Alpha"),
    ("company_owner", "Alpha"),
    ("company_admin", "Alpha"),
    ("company_manager", "Gamma"),
    ("company_user", "Gamma"),
    ("company_viewer", "Public"),
];

/// Maps main application roles onto Superset roles.
///
/// Built once at startup and shared by the login view and bulk sync, so both
/// paths grant identical roles.
#[derive(Debug, Clone)]
pub struct RoleMapper {
    mapping: BTreeMap<String, String>,
    fallback: String,
}

impl RoleMapper {
    pub fn new(config: &RolesConfig) -> Self {
        let mut mapping: BTreeMap<String, String> = DEFAULT_ROLE_MAPPING
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        mapping.extend(config.mapping.clone());

        Self {
            mapping,
            fallback: config.fallback.clone(),
        }
    }

    /// Superset role for `external_role`. Lookup is exact; unknown roles get
    /// the fallback.
    pub fn map_role(&self, external_role: &str) -> &str {
        self.mapping
            .get(external_role)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Every Superset role the mapper can grant.
    pub fn managed_roles(&self) -> BTreeSet<&str> {
        self.mapping
            .values()
            .map(String::as_str)
            .chain(std::iter::once(self.fallback.as_str()))
            .collect()
    }
}

impl Default for RoleMapper {
    fn default() -> Self {
        Self::new(&RolesConfig::default())
    }
}
