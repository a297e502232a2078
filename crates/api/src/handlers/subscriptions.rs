//! Subscription status: effective tier plus current usage against every
//! gated feature, read-only.

use std::sync::Arc;

use ascent_domain::dto::{ApiEnvelope, QuotaStatus, SubscriptionStatusResponse};
use ascent_domain::model::{Feature, QuotaPeriod};
use ascent_domain::{clock, DomainError};
use axum::extract::State;
use axum::Json;
use chrono::Utc;

use ascent_engine::tier;

use crate::AppState;
use crate::middleware::auth::AuthUser;

pub async fn status(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiEnvelope<SubscriptionStatusResponse>>, DomainError> {
    let now = Utc::now();
    let subscription = state
        .users
        .get_subscription_info(user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("user {user_id} not found")))?;
    let tier_name = state.quota_gate.effective_tier(user_id, &subscription, now).await;
    let config = state
        .quota_gate
        .tier_config(tier_name)
        .await
        .map_err(super::support::quota_gate_error)?;

    let mut usage = Vec::with_capacity(Feature::ALL.len());
    for feature in Feature::ALL {
        let limit = tier::limit_for(feature, &config);
        let period = tier::quota_period_for(feature, &config.chapter_practice_quota_kind);
        let (period_key, resets_at) = match period {
            QuotaPeriod::Daily => (clock::ist_day_key(now), clock::next_ist_midnight(now)),
            QuotaPeriod::Weekly => (clock::ist_week_key(now), clock::next_ist_week_start(now)),
            QuotaPeriod::Monthly => (clock::ist_month_key(now), clock::next_ist_month_start(now)),
        };
        let counter = state.quotas.get(user_id, feature, &period_key, limit, resets_at).await?;
        usage.push(QuotaStatus {
            feature,
            used: counter.used,
            limit: counter.limit,
            resets_at: counter.resets_at,
        });
    }

    Ok(Json(ApiEnvelope::ok(SubscriptionStatusResponse {
        tier: tier_name.to_string(),
        features: Feature::ALL.to_vec(),
        usage,
    })))
}
