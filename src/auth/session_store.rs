//! Login sessions created after a successful SSO or password login.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::store::SupersetUser;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session storage error: {0}")]
    Storage(String),
}

/// How the session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    Sso,
    Password,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session token, also the cookie value.
    pub id: String,
    pub user_id: i64,
    pub email: String,
    pub roles: Vec<String>,
    pub method: LoginMethod,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user: &SupersetUser, method: LoginMethod, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: generate_session_id(),
            user_id: user.id,
            email: user.email.clone(),
            roles: user.role_names(),
            method,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// 32 random bytes, hex encoded.
fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> SessionResult<String>;

    /// Expired sessions read as absent and are removed.
    async fn get_session(&self, id: &str) -> SessionResult<Option<Session>>;

    async fn delete_session(&self, id: &str) -> SessionResult<()>;

    /// Drop every expired session; returns how many were removed.
    async fn cleanup(&self) -> SessionResult<usize>;
}

/// In-memory session store.
///
/// Sessions are lost on restart and not shared across nodes.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: Session) -> SessionResult<String> {
        let id = session.id.clone();
        self.sessions.write().await.insert(id.clone(), session);
        Ok(id)
    }

    async fn get_session(&self, id: &str) -> SessionResult<Option<Session>> {
        let session = self.sessions.read().await.get(id).cloned();
        match session {
            Some(session) if session.is_expired() => {
                self.sessions.write().await.remove(id);
                tracing::debug!(user_id = session.user_id, "Removed expired session");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn delete_session(&self, id: &str) -> SessionResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn cleanup(&self) -> SessionResult<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok(before - sessions.len())
    }
}

/// Look up a session, treating absence and expiry as errors.
pub async fn require_session(store: &dyn SessionStore, id: &str) -> SessionResult<Session> {
    store.get_session(id).await?.ok_or(SessionError::NotFound)
}
