//! Token login: verify the main application's JWT, then sync the account.

use super::{TokenError, TokenVerifier};
use crate::{
    services::{SyncError, UserSyncService},
    store::SupersetUser,
};

#[derive(Debug, thiserror::Error)]
pub enum SsoError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub struct SsoAuthenticator {
    verifier: TokenVerifier,
    user_sync: UserSyncService,
}

impl SsoAuthenticator {
    pub fn new(verifier: TokenVerifier, user_sync: UserSyncService) -> Self {
        Self {
            verifier,
            user_sync,
        }
    }

    /// Resolve a login token to an up-to-date Superset account.
    ///
    /// Nothing is written to the store unless the token verifies.
    pub async fn authenticate(&self, token: &str) -> Result<SupersetUser, SsoError> {
        let claims = self.verifier.verify(token)?;
        let external_id = claims.id.clone();

        let user = self.user_sync.sync(claims.into()).await.inspect_err(|e| {
            tracing::error!(external_id = %external_id, error = %e, "Failed to sync SSO user");
        })?;

        tracing::info!(
            external_id = %external_id,
            user_id = user.id,
            "SSO login resolved Superset user"
        );
        Ok(user)
    }
}
