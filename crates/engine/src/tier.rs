//! Tier & Quota Gate (C8): pure tier resolution, a `DashMap`-backed 60s
//! tier cache, and a `QuotaGate` orchestrating
//! `QuotaRepository::reserve`/`rollback`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ascent_domain::model::{Feature, QuotaPeriod};
use ascent_storage::user_repository::SubscriptionRow;
use ascent_storage::{QuotaDecision, QuotaRepository, StorageError, TierConfigRepository, TierConfigRow};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

const TIER_CACHE_TTL: Duration = Duration::from_secs(60);

/// Resolve the effective tier name for a user: active paid subscription >
/// active trial > admin override > free, per §4.6. Pure function over the
/// subscription record and current time.
pub fn resolve(subscription: &SubscriptionRow, now: DateTime<Utc>) -> &'static str {
    let paid_active = subscription.tier == "paid"
        && subscription
            .subscription_ends_at
            .map(|end| end > now)
            .unwrap_or(false);
    if paid_active {
        return "paid";
    }

    let trial_active = subscription
        .trial_ends_at
        .map(|end| end > now)
        .unwrap_or(false);
    if trial_active {
        return "trial";
    }

    if subscription.is_admin {
        return "admin";
    }

    "free"
}

#[derive(Debug, Clone)]
struct CacheEntry {
    tier: &'static str,
    fetched_at: Instant,
}

/// 60-second per-user tier cache, grounded on `PackVerificationCache`'s
/// `DashMap<K, V>` shape with a TTL bolted on, since tier changes
/// (subscription purchase, admin grant) are rare relative to read volume.
#[derive(Clone)]
pub struct TierCache {
    entries: Arc<DashMap<Uuid, CacheEntry>>,
}

impl Default for TierCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TierCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn get(&self, user_id: Uuid) -> Option<&'static str> {
        self.entries.get(&user_id).and_then(|entry| {
            if entry.fetched_at.elapsed() < TIER_CACHE_TTL {
                Some(entry.tier)
            } else {
                None
            }
        })
    }

    pub fn put(&self, user_id: Uuid, tier: &'static str) {
        self.entries.insert(
            user_id,
            CacheEntry {
                tier,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Invalidate one user, e.g. right after a subscription/admin change.
    pub fn invalidate(&self, user_id: Uuid) {
        self.entries.remove(&user_id);
    }

    /// Invalidate everything, wired to the admin tier-config update path.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Orchestrates tier resolution, config lookup, and quota reserve/rollback.
#[derive(Clone)]
pub struct QuotaGate {
    tier_configs: TierConfigRepository,
    quotas: QuotaRepository,
    tier_cache: TierCache,
}

#[derive(Debug, thiserror::Error)]
pub enum QuotaGateError {
    #[error("unknown tier config: {0}")]
    UnknownTier(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QuotaGate {
    pub fn new(tier_configs: TierConfigRepository, quotas: QuotaRepository, tier_cache: TierCache) -> Self {
        Self {
            tier_configs,
            quotas,
            tier_cache,
        }
    }

    /// Resolve and cache the effective tier, reading the subscription row on
    /// a cache miss.
    pub async fn effective_tier(
        &self,
        user_id: Uuid,
        subscription: &SubscriptionRow,
        now: DateTime<Utc>,
    ) -> &'static str {
        if let Some(tier) = self.tier_cache.get(user_id) {
            return tier;
        }
        let tier = resolve(subscription, now);
        self.tier_cache.put(user_id, tier);
        tier
    }

    pub async fn tier_config(&self, tier: &str) -> Result<TierConfigRow, QuotaGateError> {
        self.tier_configs
            .get(tier)
            .await?
            .ok_or_else(|| QuotaGateError::UnknownTier(tier.to_string()))
    }

    /// Reserve one unit of `feature` for `user_id` in `period_key`, using the
    /// tier's configured limit/period for that feature.
    pub async fn reserve(
        &self,
        user_id: Uuid,
        feature: Feature,
        limit: i64,
        period_key: &str,
        resets_at: DateTime<Utc>,
    ) -> Result<QuotaDecision, QuotaGateError> {
        self.quotas
            .reserve(user_id, feature, period_key, limit, resets_at)
            .await
            .map_err(QuotaGateError::from)
    }

    pub async fn rollback(
        &self,
        user_id: Uuid,
        feature: Feature,
        period_key: &str,
    ) -> Result<(), QuotaGateError> {
        self.quotas
            .rollback(user_id, feature, period_key)
            .await
            .map_err(QuotaGateError::from)
    }
}

/// The quota period a feature resets on, per the tier config's column
/// layout (chapter practice alone switches between `daily` and
/// `weekly_per_subject`; every other feature is fixed).
pub fn quota_period_for(feature: Feature, chapter_practice_quota_kind: &str) -> QuotaPeriod {
    match feature {
        Feature::MockTests => QuotaPeriod::Monthly,
        Feature::ChapterPractice if chapter_practice_quota_kind == "weekly_per_subject" => {
            QuotaPeriod::Weekly
        }
        _ => QuotaPeriod::Daily,
    }
}

/// Limit configured for `feature` on a resolved tier config row.
pub fn limit_for(feature: Feature, config: &TierConfigRow) -> i64 {
    match feature {
        Feature::SnapSolve => config.snap_solve_daily_limit,
        Feature::DailyQuiz => config.daily_quiz_daily_limit,
        Feature::AiTutor => config.ai_tutor_daily_limit,
        Feature::ChapterPractice => config.chapter_practice_limit,
        Feature::MockTests => config.mock_tests_monthly_limit,
    }
}
