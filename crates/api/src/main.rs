//! Ascent adaptive learning engine backend server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ascent_api::AppState;
use ascent_api::handlers::auth::{GoogleIdTokenVerifier, IdTokenVerifier};
use ascent_config::{AppConfig, TierConfigCache};
use ascent_engine::{
    QuestionIndex, QuotaGate, ScheduledJobs, SessionCoordinator, SnapshotStore, SnapshotWorker,
    SpacedRepetition, TierCache,
};
use ascent_storage::{
    QuestionRepository, QuotaRepository, ResponseRepository, ReviewIntervalRepository,
    SessionRepository, SnapshotRepository, TierConfigRepository, UserRepository, create_pool,
    run_migrations,
};

/// How long a chapter's cached question list is trusted before the next
/// selection call refetches it from the catalog.
const QUESTION_INDEX_TTL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ascent backend server...");

    let config = AppConfig::from_env()?;
    tracing::info!("Binding to {}", config.bind_address);

    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let users = UserRepository::new(pool.clone());
    let sessions = SessionRepository::new(pool.clone());
    let responses = ResponseRepository::new(pool.clone());
    let questions = QuestionRepository::new(pool.clone());
    let review_intervals = ReviewIntervalRepository::new(pool.clone());
    let quotas = QuotaRepository::new(pool.clone());
    let tier_config_repo = TierConfigRepository::new(pool.clone());
    let snapshots = SnapshotRepository::new(pool.clone());

    let tier_configs = TierConfigCache::new(tier_config_repo.clone());
    let reloaded = tier_configs.reload().await?;
    tracing::info!(tiers = reloaded, "tier config cache warmed");

    let question_index = QuestionIndex::new(questions.clone(), QUESTION_INDEX_TTL);
    let tier_cache = TierCache::new();
    let quota_gate = QuotaGate::new(tier_config_repo, quotas.clone(), tier_cache.clone());
    let spaced_repetition = SpacedRepetition::new(review_intervals.clone());
    let snapshot_store = SnapshotStore::new(snapshots);
    let scheduled_jobs = ScheduledJobs::new(users.clone(), snapshot_store.clone(), tier_cache.clone());

    let snapshot_worker = kameo::spawn(SnapshotWorker::new(snapshot_store.clone()));

    let session_coordinator = SessionCoordinator::new(
        sessions.clone(),
        users.clone(),
        responses.clone(),
        spaced_repetition.clone(),
        snapshot_worker.clone(),
    );

    let id_token_verifier: Arc<dyn IdTokenVerifier> =
        Arc::new(GoogleIdTokenVerifier::new(&config.google_client_id));

    let state = Arc::new(AppState {
        pool,
        config: config.clone(),
        tier_configs,
        users,
        sessions,
        responses,
        questions,
        review_intervals,
        quotas,
        question_index,
        session_coordinator,
        quota_gate,
        tier_cache,
        spaced_repetition,
        snapshot_store,
        scheduled_jobs,
        snapshot_worker,
        id_token_verifier,
        start_time: Instant::now(),
    });

    let app = ascent_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Server listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
