//! Superset's user and role store.
//!
//! The bridge never owns Superset's accounts; it reads and writes them through
//! [`UserStore`], the same four operations Superset's security manager exposes
//! (`find_user`, `find_role`, `add_user`, `update_user`).

mod memory;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use memory::MemoryUserStore;
#[cfg(feature = "database-sqlite")]
pub use sqlite::SqliteUserStore;

use crate::config::DatabaseConfig;

/// Password stored for accounts created by SSO.
///
/// It is not a valid password hash, so it can never satisfy a password login.
pub const UNUSABLE_PASSWORD: &str = "!sso-only";

/// Superset's built-in roles.
pub const BUILTIN_ROLES: [&str; 4] = ["Admin", "Alpha", "Gamma", "Public"];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[cfg(feature = "database-sqlite")]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

/// A Superset account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupersetUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub active: bool,
    pub roles: Vec<Role>,
    /// Free-form per-user attributes (e.g. `company_id`).
    #[serde(default)]
    pub extra: Map<String, Value>,
    #[serde(default)]
    pub login_count: i64,
}

impl SupersetUser {
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }
}

/// Input for [`UserStore::add_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub roles: Vec<Role>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by email (case-insensitive).
    async fn find_user(&self, email: &str) -> StoreResult<Option<SupersetUser>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<SupersetUser>>;

    async fn find_role(&self, name: &str) -> StoreResult<Option<Role>>;

    async fn add_user(&self, user: NewUser) -> StoreResult<SupersetUser>;

    /// Persist every mutable field of `user`, including its role set and
    /// extra attributes.
    async fn update_user(&self, user: &SupersetUser) -> StoreResult<()>;

    /// Bump the login counter and last-login timestamp.
    async fn record_login(&self, user_id: i64) -> StoreResult<()>;

    /// Cheap round trip used by the readiness probe.
    async fn health_check(&self) -> StoreResult<()>;

    /// Whether the backend persists [`SupersetUser::extra`].
    fn supports_extra(&self) -> bool {
        true
    }
}

/// Open the user store described by `config`.
pub async fn open(config: &DatabaseConfig) -> StoreResult<Arc<dyn UserStore>> {
    match config {
        DatabaseConfig::Memory => {
            tracing::warn!("Using the in-memory user store; accounts are lost on restart");
            Ok(Arc::new(MemoryUserStore::new()))
        }
        #[cfg(feature = "database-sqlite")]
        DatabaseConfig::Sqlite(cfg) => {
            let store = SqliteUserStore::connect(cfg).await?;
            tracing::info!(path = %cfg.path, "Connected to Superset metadata database");
            Ok(Arc::new(store))
        }
    }
}
