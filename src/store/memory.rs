use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BUILTIN_ROLES, NewUser, Role, StoreError, StoreResult, SupersetUser, UserStore};

#[derive(Default)]
struct State {
    users: Vec<SupersetUser>,
    roles: Vec<Role>,
    next_user_id: i64,
}

/// In-memory user store.
///
/// Suitable for development and tests. Seeded with Superset's built-in roles.
pub struct MemoryUserStore {
    state: RwLock<State>,
    writes: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::with_roles(BUILTIN_ROLES)
    }

    pub fn with_roles<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Role {
                id: i as i64 + 1,
                name: name.into(),
            })
            .collect();

        Self {
            state: RwLock::new(State {
                users: Vec::new(),
                roles,
                next_user_id: 1,
            }),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `add_user` and `update_user` calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn user_count(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn users(&self) -> Vec<SupersetUser> {
        self.state.read().await.users.clone()
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user(&self, email: &str) -> StoreResult<Option<SupersetUser>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<SupersetUser>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_role(&self, name: &str) -> StoreResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn add_user(&self, user: NewUser) -> StoreResult<SupersetUser> {
        let mut state = self.state.write().await;

        if state.users.iter().any(|u| {
            u.email.eq_ignore_ascii_case(&user.email) || u.username == user.username
        }) {
            return Err(StoreError::Conflict(format!(
                "User with email '{}' already exists",
                user.email
            )));
        }

        let created = SupersetUser {
            id: state.next_user_id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password: user.password,
            active: true,
            roles: user.roles,
            extra: Default::default(),
            login_count: 0,
        };
        state.next_user_id += 1;
        state.users.push(created.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(created)
    }

    async fn update_user(&self, user: &SupersetUser) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let existing = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(StoreError::NotFound)?;
        *existing = user.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn record_login(&self, user_id: i64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let existing = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::NotFound)?;
        existing.login_count += 1;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, roles: Vec<Role>) -> NewUser {
        NewUser {
            username: email.to_string(),
            email: email.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password: crate::store::UNUSABLE_PASSWORD.to_string(),
            roles,
        }
    }

    #[tokio::test]
    async fn test_seeded_with_builtin_roles() {
        let store = MemoryUserStore::new();
        for name in BUILTIN_ROLES {
            assert!(store.find_role(name).await.unwrap().is_some(), "{name}");
        }
        assert!(store.find_role("sql_lab").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_and_find_user_ignores_email_case() {
        let store = MemoryUserStore::new();
        let gamma = store.find_role("Gamma").await.unwrap().unwrap();

        let created = store
            .add_user(new_user("ada@example.com", vec![gamma.clone()]))
            .await
            .unwrap();
        assert_eq!(created.id, 1);
        assert!(created.active);

        let found = store.find_user("ADA@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.roles, vec![gamma]);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryUserStore::new();
        store
            .add_user(new_user("ada@example.com", vec![]))
            .await
            .unwrap();
        let err = store
            .add_user(new_user("ada@example.com", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_replaces_user() {
        let store = MemoryUserStore::new();
        let mut user = store
            .add_user(new_user("ada@example.com", vec![]))
            .await
            .unwrap();

        user.first_name = "Augusta".to_string();
        user.extra.insert("company_id".into(), serde_json::json!(7));
        store.update_user(&user).await.unwrap();

        let found = store.find_user("ada@example.com").await.unwrap().unwrap();
        assert_eq!(found.first_name, "Augusta");
        assert_eq!(found.extra["company_id"], 7);
    }

    #[tokio::test]
    async fn test_update_unknown_user_is_not_found() {
        let store = MemoryUserStore::new();
        let mut user = store
            .add_user(new_user("ada@example.com", vec![]))
            .await
            .unwrap();
        user.id = 99;
        assert!(matches!(
            store.update_user(&user).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_record_login_counts() {
        let store = MemoryUserStore::new();
        let user = store
            .add_user(new_user("ada@example.com", vec![]))
            .await
            .unwrap();
        store.record_login(user.id).await.unwrap();
        store.record_login(user.id).await.unwrap();

        let found = store.find_user("ada@example.com").await.unwrap().unwrap();
        assert_eq!(found.login_count, 2);
        // Login bookkeeping is not a profile write.
        assert_eq!(store.write_count(), 1);
    }
}
