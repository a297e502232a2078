//! Configuration for the adaptive learning engine backend: env-sourced
//! `AppConfig`, plus an in-process `TierConfigCache` that hot-reloads the
//! per-tier quota/threshold knobs out of the `tier_configs` table instead of
//! baking them into code.

use std::env;
use std::sync::Arc;

use ascent_storage::{StorageError, TierConfigRepository, TierConfigRow};
use dashmap::DashMap;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// JWT secret for token signing
    pub jwt_secret: String,
    /// Google OAuth client ID
    pub google_client_id: String,
    /// Address to bind the server to
    pub bind_address: String,
    /// Base URL for API (used in email links)
    pub base_url: String,
    /// Shared admin key for observability/admin endpoints. Empty disables them.
    pub admin_api_key: String,
    /// Shared secret checked on every `/v1/jobs/*` scheduled-job endpoint.
    pub cron_secret: String,
    /// User ids granted the admin tier override at boot, regardless of what
    /// the `users.is_admin` column says — reconciled into the row on boot.
    pub admin_uids: Vec<Uuid>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env_var("DATABASE_URL")?,
            jwt_secret: env_var("JWT_SECRET")?,
            google_client_id: env_var_or("GOOGLE_CLIENT_ID", ""),
            bind_address: env_var_or("BIND_ADDRESS", "0.0.0.0:8080"),
            base_url: env_var_or("BASE_URL", "http://localhost:8080"),
            admin_api_key: env_var_or("ADMIN_API_KEY", ""),
            cron_secret: env_var("CRON_SECRET")?,
            admin_uids: parse_admin_uids(&env_var_or("ADMIN_UIDS", ""))?,
        })
    }
}

fn env_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_admin_uids(raw: &str) -> Result<Vec<Uuid>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Uuid>()
                .map_err(|e| ConfigError::InvalidValue("ADMIN_UIDS".to_string(), e.to_string()))
        })
        .collect()
}

/// In-process cache of `tier_configs` rows, loaded once at boot via
/// `reload` and hot-reloadable from an admin endpoint without a restart.
/// Shaped like `engine::tier::TierCache` (a `DashMap` behind an `Arc`), but
/// keyed by tier name and holding full config rows rather than a single
/// resolved tier string.
#[derive(Clone)]
pub struct TierConfigCache {
    repo: TierConfigRepository,
    entries: Arc<DashMap<String, TierConfigRow>>,
}

impl TierConfigCache {
    pub fn new(repo: TierConfigRepository) -> Self {
        Self {
            repo,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Refill the cache from `tier_configs`. Call once at boot and again
    /// whenever an admin edits tier config through the HTTP surface.
    pub async fn reload(&self) -> Result<usize, StorageError> {
        let rows = self.repo.list_all().await?;
        self.entries.clear();
        let count = rows.len();
        for row in rows {
            self.entries.insert(row.tier.clone(), row);
        }
        Ok(count)
    }

    pub fn get(&self, tier: &str) -> Option<TierConfigRow> {
        self.entries.get(tier).map(|r| r.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_or_uses_default() {
        let val = env_var_or("NON_EXISTENT_VAR_12345", "default_value");
        assert_eq!(val, "default_value");
    }

    #[test]
    fn admin_uids_parses_comma_list() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let raw = format!(" {a}, {b} ");
        assert_eq!(parse_admin_uids(&raw).unwrap(), vec![a, b]);
    }

    #[test]
    fn admin_uids_empty_string_is_empty_list() {
        assert!(parse_admin_uids("").unwrap().is_empty());
    }

    #[test]
    fn admin_uids_rejects_malformed_entry() {
        assert!(parse_admin_uids("not-a-uuid").is_err());
    }
}
