use std::sync::Arc;

use serde_json::Value;

use super::RoleMapper;
use crate::{
    auth::UserClaims,
    store::{NewUser, Role, StoreError, SupersetUser, UNUSABLE_PASSWORD, UserStore},
};

/// Key under which the main application's company id is kept in
/// [`SupersetUser::extra`].
pub const COMPANY_ID_KEY: &str = "company_id";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The mapped Superset role does not exist in the store.
    #[error("Superset role '{0}' does not exist")]
    RoleNotFound(String),

    #[error("user has no email address")]
    MissingEmail,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One user as described by the main application.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub company_id: Option<Value>,
}

impl From<UserClaims> for SyncRequest {
    fn from(claims: UserClaims) -> Self {
        Self {
            email: claims.email,
            first_name: claims.first_name,
            last_name: claims.last_name,
            role: claims.role,
            company_id: claims.company_id,
        }
    }
}

/// Finds or creates the Superset account for a main application user and
/// brings its name, role and company up to date.
#[derive(Clone)]
pub struct UserSyncService {
    store: Arc<dyn UserStore>,
    roles: Arc<RoleMapper>,
    preserve_unmanaged_roles: bool,
}

impl UserSyncService {
    pub fn new(store: Arc<dyn UserStore>, roles: Arc<RoleMapper>) -> Self {
        Self {
            store,
            roles,
            preserve_unmanaged_roles: false,
        }
    }

    /// Keep roles the mapper never grants when updating an existing user.
    pub fn preserve_unmanaged_roles(mut self, preserve: bool) -> Self {
        self.preserve_unmanaged_roles = preserve;
        self
    }

    #[tracing::instrument(skip_all, fields(email = %request.email, role = %request.role))]
    pub async fn sync(&self, request: SyncRequest) -> Result<SupersetUser, SyncError> {
        if request.email.trim().is_empty() {
            return Err(SyncError::MissingEmail);
        }

        let existing = self.store.find_user(&request.email).await?;
        let role = self.resolve_role(&request.role).await?;

        let mut user = match existing {
            Some(user) => self.update_existing(user, &request, role).await?,
            None => match self.create(&request, role.clone()).await {
                Ok(user) => user,
                // Created concurrently by another login or sync; update it instead.
                Err(SyncError::Store(StoreError::Conflict(_))) => {
                    let user = self
                        .store
                        .find_user(&request.email)
                        .await?
                        .ok_or(StoreError::NotFound)?;
                    self.update_existing(user, &request, role).await?
                }
                Err(e) => return Err(e),
            },
        };

        if let Some(company_id) = request.company_id.as_ref().filter(|v| is_truthy(v))
            && self.store.supports_extra()
        {
            user.extra
                .insert(COMPANY_ID_KEY.to_string(), company_id.clone());
            self.store.update_user(&user).await?;
        }

        Ok(user)
    }

    async fn resolve_role(&self, external_role: &str) -> Result<Role, SyncError> {
        let mapped = self.roles.map_role(external_role);
        match self.store.find_role(mapped).await? {
            Some(role) => Ok(role),
            None => {
                tracing::error!(
                    external_role,
                    superset_role = mapped,
                    "Mapped Superset role does not exist; check [roles] configuration"
                );
                Err(SyncError::RoleNotFound(mapped.to_string()))
            }
        }
    }

    async fn create(&self, request: &SyncRequest, role: Role) -> Result<SupersetUser, SyncError> {
        let user = self
            .store
            .add_user(NewUser {
                username: request.email.clone(),
                email: request.email.clone(),
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                password: UNUSABLE_PASSWORD.to_string(),
                roles: vec![role],
            })
            .await?;

        tracing::info!(user_id = user.id, "Created Superset user");
        Ok(user)
    }

    async fn update_existing(
        &self,
        mut user: SupersetUser,
        request: &SyncRequest,
        role: Role,
    ) -> Result<SupersetUser, SyncError> {
        user.first_name = request.first_name.clone();
        user.last_name = request.last_name.clone();

        if self.preserve_unmanaged_roles {
            let managed = self.roles.managed_roles();
            user.roles.retain(|r| !managed.contains(r.name.as_str()));
            user.roles.push(role);
        } else {
            user.roles = vec![role];
        }

        self.store.update_user(&user).await?;
        tracing::info!(user_id = user.id, "Updated Superset user");
        Ok(user)
    }
}

/// Null, `false`, `0` and `""` count as no company.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
