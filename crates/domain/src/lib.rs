//! Domain types for the adaptive learning engine backend: pure data model,
//! IRT kernel, session state machine, and HTTP DTOs. No I/O happens here;
//! everything that touches Postgres lives in `ascent-storage`.

pub mod auth;
pub mod clock;
pub mod dto;
pub mod errors;
pub mod irt;
pub mod model;
pub mod session;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use auth::*;
pub use errors::*;

/// Identity row, independent of proficiency state (which lives in
/// [`model::ProficiencyView`] and its normalized storage tables).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,
    pub oauth_sub: String,
    pub created_at: DateTime<Utc>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build_sha: String,
    pub uptime_seconds: u64,
}

/// Ready check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub database: String,
}
