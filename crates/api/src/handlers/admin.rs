//! Admin-key-guarded operational endpoints (§9: tier config "is a value,
//! not a service call" with an explicit invalidation hook bound to this
//! admin path).

use std::sync::Arc;

use ascent_domain::DomainError;
use ascent_domain::dto::ApiEnvelope;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::middleware::auth::AdminApiKey;

#[derive(Debug, Serialize)]
pub struct ReloadTierConfigsResponse {
    pub reloaded: usize,
}

/// Hot-reloads the in-process `tier_configs` cache from the database
/// without a server restart, for use after an admin edits a tier's quota
/// or threshold columns directly.
pub async fn reload_tier_configs(
    State(state): State<Arc<AppState>>,
    _admin: AdminApiKey,
) -> Result<Json<ApiEnvelope<ReloadTierConfigsResponse>>, DomainError> {
    let reloaded = state.tier_configs.reload().await?;
    Ok(Json(ApiEnvelope::ok(ReloadTierConfigsResponse { reloaded })))
}
