use axum::{Json, extract::State};

use crate::{AppState, config::PublicDeployment};

/// Branding, theme and feature flags for Superset's theming scripts.
///
/// Connection strings and credentials from `[deployment]` are never included.
#[tracing::instrument(name = "deployment.get", skip(state))]
pub async fn get_deployment(State(state): State<AppState>) -> Json<PublicDeployment> {
    Json(state.config.deployment.public_view())
}
