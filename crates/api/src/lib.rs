//! Adaptive learning engine backend server library.

pub mod handlers;
pub mod middleware;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use axum::response::IntoResponse;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use ascent_config::{AppConfig, TierConfigCache};
use ascent_domain::dto::ApiEnvelope;
use ascent_domain::{HealthResponse, ReadyResponse};
use ascent_engine::{QuestionIndex, QuotaGate, ScheduledJobs, SessionCoordinator, SnapshotStore, SnapshotWorker, SpacedRepetition, TierCache};
use ascent_storage::{
    QuestionRepository, QuotaRepository, ResponseRepository, ReviewIntervalRepository,
    SessionRepository, SnapshotRepository, TierConfigRepository, UserRepository, check_connection,
};
use axum::Json;
use kameo::actor::ActorRef;
use sqlx::PgPool;

use handlers::auth::IdTokenVerifier;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub tier_configs: TierConfigCache,
    pub users: UserRepository,
    pub sessions: SessionRepository,
    pub responses: ResponseRepository,
    pub questions: QuestionRepository,
    pub review_intervals: ReviewIntervalRepository,
    pub quotas: QuotaRepository,
    pub question_index: QuestionIndex,
    pub session_coordinator: SessionCoordinator,
    pub quota_gate: QuotaGate,
    pub tier_cache: TierCache,
    pub spaced_repetition: SpacedRepetition,
    pub snapshot_store: SnapshotStore,
    pub scheduled_jobs: ScheduledJobs,
    pub snapshot_worker: ActorRef<SnapshotWorker>,
    pub id_token_verifier: Arc<dyn IdTokenVerifier>,
    pub start_time: Instant,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/ready", get(ready))
        .route("/v1/auth/google", post(handlers::auth::google_auth))
        .route("/v1/users/me", get(handlers::auth::get_me))
        .route(
            "/v1/assessment/questions",
            get(handlers::assessment::get_questions),
        )
        .route(
            "/v1/assessment/submit",
            post(handlers::assessment::submit),
        )
        .route(
            "/v1/assessment/results",
            get(handlers::assessment::results),
        )
        .route(
            "/v1/daily-quiz/generate",
            get(handlers::daily_quiz::generate),
        )
        .route(
            "/v1/daily-quiz/submit-answer",
            post(handlers::daily_quiz::submit_answer),
        )
        .route(
            "/v1/daily-quiz/complete",
            post(handlers::daily_quiz::complete),
        )
        .route(
            "/v1/chapter-practice/generate",
            post(handlers::chapter_practice::generate),
        )
        .route(
            "/v1/chapter-practice/submit-answer",
            post(handlers::chapter_practice::submit_answer),
        )
        .route(
            "/v1/chapter-practice/complete",
            post(handlers::chapter_practice::complete),
        )
        .route(
            "/v1/unlock-quiz/generate",
            post(handlers::unlock_quiz::generate),
        )
        .route(
            "/v1/unlock-quiz/submit-answer",
            post(handlers::unlock_quiz::submit_answer),
        )
        .route(
            "/v1/unlock-quiz/complete",
            post(handlers::unlock_quiz::complete),
        )
        .route(
            "/v1/snap-practice/questions",
            post(handlers::snap_practice::questions),
        )
        .route(
            "/v1/snap-practice/complete",
            post(handlers::snap_practice::complete),
        )
        .merge(handlers::mock_tests::router())
        .route(
            "/v1/analytics/overview",
            get(handlers::analytics::overview),
        )
        .route(
            "/v1/analytics/mastery/{subject}",
            get(handlers::analytics::mastery_by_subject),
        )
        .route(
            "/v1/analytics/mastery-timeline",
            get(handlers::analytics::mastery_timeline),
        )
        .route(
            "/v1/analytics/accuracy-timeline",
            get(handlers::analytics::accuracy_timeline),
        )
        .route(
            "/v1/analytics/all-chapters",
            get(handlers::analytics::all_chapters),
        )
        .route(
            "/v1/analytics/weekly-activity",
            get(handlers::analytics::weekly_activity),
        )
        .route(
            "/v1/subscriptions/status",
            get(handlers::subscriptions::status),
        )
        .route(
            "/v1/jobs/weekly-snapshot",
            post(handlers::jobs::weekly_snapshot),
        )
        .route("/v1/jobs/trial-expiry", post(handlers::jobs::trial_expiry))
        .route("/v1/jobs/email-daily", post(handlers::jobs::email_daily))
        .route("/v1/jobs/email-weekly", post(handlers::jobs::email_weekly))
        .route("/v1/jobs/alerts", post(handlers::jobs::alerts))
        .route(
            "/v1/admin/tier-configs/reload",
            post(handlers::admin::reload_tier_configs),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiEnvelope::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_sha: option_env!("BUILD_SHA").unwrap_or("dev").to_string(),
        uptime_seconds: uptime,
    }))
}

/// Readiness check endpoint.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match check_connection(&state.pool).await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Json(ApiEnvelope::ok(ReadyResponse {
        status: if db_status == "connected" {
            "ok"
        } else {
            "degraded"
        }
        .to_string(),
        database: db_status.to_string(),
    }))
}
