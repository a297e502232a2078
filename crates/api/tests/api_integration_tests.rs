#![cfg(feature = "postgres-tests")]

use std::{sync::Arc, time::Duration, time::Instant};

use ascent_api::handlers::auth::IdTokenVerifier;
use ascent_api::{AppState, build_router};
use ascent_config::{AppConfig, TierConfigCache};
use ascent_engine::{
    QuestionIndex, QuotaGate, ScheduledJobs, SessionCoordinator, SnapshotStore, SnapshotWorker,
    SpacedRepetition, TierCache,
};
use ascent_storage::{
    QuestionRepository, QuotaRepository, ResponseRepository, ReviewIntervalRepository,
    SessionRepository, SnapshotRepository, TierConfigRepository, UserRepository,
};
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Clone)]
struct FakeVerifier;

impl IdTokenVerifier for FakeVerifier {
    fn verify(&self, id_token: &str) -> Result<String, String> {
        if id_token == "valid-google-token" {
            Ok("google-subject-1".to_string())
        } else {
            Err("invalid token".to_string())
        }
    }
}

async fn test_state(pool: PgPool, admin_api_key: &str) -> Arc<AppState> {
    let users = UserRepository::new(pool.clone());
    let sessions = SessionRepository::new(pool.clone());
    let responses = ResponseRepository::new(pool.clone());
    let questions = QuestionRepository::new(pool.clone());
    let review_intervals = ReviewIntervalRepository::new(pool.clone());
    let quotas = QuotaRepository::new(pool.clone());
    let tier_config_repo = TierConfigRepository::new(pool.clone());
    let snapshots = SnapshotRepository::new(pool.clone());

    let tier_configs = TierConfigCache::new(tier_config_repo.clone());
    tier_configs
        .reload()
        .await
        .expect("tier configs should seed from migrations");

    let question_index = QuestionIndex::new(questions.clone(), Duration::from_secs(60));
    let tier_cache = TierCache::new();
    let quota_gate = QuotaGate::new(tier_config_repo, quotas.clone(), tier_cache.clone());
    let spaced_repetition = SpacedRepetition::new(review_intervals.clone());
    let snapshot_store = SnapshotStore::new(snapshots);
    let scheduled_jobs =
        ScheduledJobs::new(users.clone(), snapshot_store.clone(), tier_cache.clone());
    let snapshot_worker = kameo::spawn(SnapshotWorker::new(snapshot_store.clone()));
    let session_coordinator = SessionCoordinator::new(
        sessions.clone(),
        users.clone(),
        responses.clone(),
        spaced_repetition.clone(),
        snapshot_worker.clone(),
    );

    Arc::new(AppState {
        pool,
        config: AppConfig {
            database_url: "postgres://unused".to_string(),
            jwt_secret: "test-secret".to_string(),
            google_client_id: "test-client-id".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            base_url: "http://localhost:8080".to_string(),
            admin_api_key: admin_api_key.to_string(),
            cron_secret: "test-cron-secret".to_string(),
            admin_uids: Vec::new(),
        },
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
        id_token_verifier: Arc::new(FakeVerifier),
        start_time: Instant::now(),
    })
}

async fn seed_chapter(pool: &PgPool, chapter: &str, count: usize) {
    for _ in 0..count {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO questions (question_id, subject, chapter, sub_topics, question_type,
                correct_answer, irt_a, irt_b, irt_c, initial_assessment_eligible)
             VALUES ($1, 'physics', $2, '{}', 'mcq_single', 'A', 1.2, 0.0, 0.2, true)",
        )
        .bind(id)
        .bind(chapter)
        .execute(pool)
        .await
        .expect("question insert should succeed");
    }
}

async fn json_body(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&to_bytes(resp.into_body(), 1024 * 1024).await.unwrap()).unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn health_and_ready_report_ok(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool, "").await);

    let health = app
        .clone()
        .oneshot(Request::builder().uri("/v1/health").body(Body::empty())?)
        .await?;
    assert_eq!(health.status(), StatusCode::OK);

    let ready = app
        .oneshot(Request::builder().uri("/v1/ready").body(Body::empty())?)
        .await?;
    assert_eq!(ready.status(), StatusCode::OK);
    let body = json_body(ready).await;
    assert_eq!(body["data"]["database"], "connected");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn auth_rejects_bad_token_and_issues_jwt_for_valid_one(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool, "").await);

    let bad = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/google")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json!({"id_token": "garbage"}))?))?,
        )
        .await?;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

    let good = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/google")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(
                    &json!({"id_token": "valid-google-token"}),
                )?))?,
        )
        .await?;
    assert_eq!(good.status(), StatusCode::OK);
    let body = json_body(good).await;
    let token = body["data"]["access_token"].as_str().unwrap().to_string();

    let me = app
        .oneshot(
            Request::builder()
                .uri("/v1/users/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(me.status(), StatusCode::OK);

    Ok(())
}

/// End-to-end daily-quiz life-cycle: generate (reserves quota) -> submit an
/// answer for every planned question -> complete -> the free tier's
/// one-per-day quota then rejects a second `generate`.
#[sqlx::test(migrations = "../../migrations")]
async fn daily_quiz_generate_submit_complete_and_quota_exhaustion(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool.clone(), "").await);

    seed_chapter(&pool, "kinematics", 4).await;
    seed_chapter(&pool, "thermodynamics", 4).await;

    let auth_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/google")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(
                    &json!({"id_token": "valid-google-token"}),
                )?))?,
        )
        .await?;
    let auth_body = json_body(auth_resp).await;
    let auth = format!("Bearer {}", auth_body["data"]["access_token"].as_str().unwrap());

    let generate = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/daily-quiz/generate")
                .header(header::AUTHORIZATION, auth.clone())
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(generate.status(), StatusCode::OK);
    let generated = json_body(generate).await;
    let session_id = generated["data"]["session_id"].as_str().unwrap().to_string();
    let planned_questions = generated["data"]["questions"].as_array().unwrap().clone();
    assert!(!planned_questions.is_empty());

    for q in &planned_questions {
        let question_id = q["question_id"].as_str().unwrap();
        let submit = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/daily-quiz/submit-answer")
                    .header(header::AUTHORIZATION, auth.clone())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&json!({
                        "question_id": question_id,
                        "student_answer": "A",
                        "time_taken_seconds": 12
                    }))?))?,
            )
            .await?;
        assert_eq!(submit.status(), StatusCode::OK);
        let submitted = json_body(submit).await;
        assert_eq!(submitted["data"]["is_correct"], true);
        assert_eq!(submitted["data"]["replayed"], false);
    }

    // Replaying the first submission is idempotent: same result, flagged replayed.
    let first_question_id = planned_questions[0]["question_id"].as_str().unwrap();
    let replay = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/daily-quiz/submit-answer")
                .header(header::AUTHORIZATION, auth.clone())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json!({
                    "question_id": first_question_id,
                    "student_answer": "A",
                    "time_taken_seconds": 12
                }))?))?,
        )
        .await?;
    assert_eq!(replay.status(), StatusCode::OK);
    let replayed = json_body(replay).await;
    assert_eq!(replayed["data"]["replayed"], true);

    let complete = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/daily-quiz/complete")
                .header(header::AUTHORIZATION, auth.clone())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(
                    &json!({"session_id": session_id}),
                )?))?,
        )
        .await?;
    assert_eq!(complete.status(), StatusCode::OK);
    let completed = json_body(complete).await;
    assert_eq!(completed["data"]["accuracy"], 1.0);
    assert_eq!(completed["data"]["questions_answered"], planned_questions.len());

    // Replaying `complete` is rejected, not re-applied.
    let replay_complete = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/daily-quiz/complete")
                .header(header::AUTHORIZATION, auth.clone())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(
                    &json!({"session_id": session_id}),
                )?))?,
        )
        .await?;
    assert_eq!(replay_complete.status(), StatusCode::CONFLICT);

    // Free tier's daily_quiz_daily_limit is 1; a second generate this day
    // is quota-exhausted.
    let second_generate = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/daily-quiz/generate")
                .header(header::AUTHORIZATION, auth.clone())
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(second_generate.status(), StatusCode::TOO_MANY_REQUESTS);

    let overview = app
        .oneshot(
            Request::builder()
                .uri("/v1/analytics/overview")
                .header(header::AUTHORIZATION, auth)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(overview.status(), StatusCode::OK);
    let overview_body = json_body(overview).await;
    assert_eq!(overview_body["data"]["completed_quiz_count"], 1);

    Ok(())
}

/// Chapter θ is folded into the user's proficiency row at submit time, not
/// batched up for `complete`: a single answered question must already move
/// `theta_by_chapter` before the session is completed.
#[sqlx::test(migrations = "../../migrations")]
async fn daily_quiz_submit_answer_updates_chapter_theta_before_complete(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool.clone(), "").await);
    seed_chapter(&pool, "kinematics", 4).await;
    seed_chapter(&pool, "thermodynamics", 4).await;

    let auth_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/google")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(
                    &json!({"id_token": "valid-google-token"}),
                )?))?,
        )
        .await?;
    let auth_body = json_body(auth_resp).await;
    let auth = format!("Bearer {}", auth_body["data"]["access_token"].as_str().unwrap());

    let generate = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/daily-quiz/generate")
                .header(header::AUTHORIZATION, auth.clone())
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(generate.status(), StatusCode::OK);
    let generated = json_body(generate).await;
    let planned_questions = generated["data"]["questions"].as_array().unwrap().clone();
    assert!(!planned_questions.is_empty());

    let first_question_id = planned_questions[0]["question_id"].as_str().unwrap();
    let submit = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/daily-quiz/submit-answer")
                .header(header::AUTHORIZATION, auth.clone())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json!({
                    "question_id": first_question_id,
                    "student_answer": "A",
                    "time_taken_seconds": 12
                }))?))?,
        )
        .await?;
    assert_eq!(submit.status(), StatusCode::OK);

    // No `/daily-quiz/complete` call yet: the chapter's θ must already be
    // visible through the read-only analytics projection.
    let mastery = app
        .oneshot(
            Request::builder()
                .uri("/v1/analytics/mastery/physics")
                .header(header::AUTHORIZATION, auth)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(mastery.status(), StatusCode::OK);
    let mastery_body = json_body(mastery).await;
    let chapters = mastery_body["data"].as_array().unwrap();
    let kinematics = chapters
        .iter()
        .find(|c| c["chapter_key"] == "physics_kinematics")
        .expect("kinematics chapter should have a proficiency row after one submission");
    assert_eq!(kinematics["attempts"], 1);
    assert!(kinematics["theta"].as_f64().unwrap() > 0.0);

    Ok(())
}

/// A second `begin_answer` on a position whose 30s sentinel is still live
/// is rejected as in-flight rather than racing the first writer; once the
/// position is answered, `begin_answer` reports it as already-answered
/// instead of re-arming the sentinel.
#[sqlx::test(migrations = "../../migrations")]
async fn begin_answer_rejects_concurrent_writer_and_replays_after_answered(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    seed_chapter(&pool, "kinematics", 4).await;
    let state = test_state(pool, "").await;

    let app = build_router(state.clone());
    let auth_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/google")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(
                    &json!({"id_token": "valid-google-token"}),
                )?))?,
        )
        .await?;
    let auth_body = json_body(auth_resp).await;
    let auth = format!("Bearer {}", auth_body["data"]["access_token"].as_str().unwrap());

    let generate = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/daily-quiz/generate")
                .header(header::AUTHORIZATION, auth)
                .body(Body::empty())?,
        )
        .await?;
    let generated = json_body(generate).await;
    let session_id: Uuid = generated["data"]["session_id"].as_str().unwrap().parse()?;
    let question_id: Uuid = generated["data"]["questions"][0]["question_id"]
        .as_str()
        .unwrap()
        .parse()?;

    let now = chrono::Utc::now();
    let first = state.sessions.begin_answer(session_id, question_id, now).await?;
    assert!(matches!(first, ascent_storage::session_repository::BeginAnswerOutcome::Ready));

    // Within the 30s TTL a second writer must not also see `Ready`.
    let second = state
        .sessions
        .begin_answer(session_id, question_id, now + chrono::Duration::seconds(5))
        .await?;
    assert!(matches!(
        second,
        ascent_storage::session_repository::BeginAnswerOutcome::InFlight
    ));

    // Past the TTL the sentinel has lapsed and the position is reclaimed.
    let after_ttl = state
        .sessions
        .begin_answer(session_id, question_id, now + chrono::Duration::seconds(31))
        .await?;
    assert!(matches!(
        after_ttl,
        ascent_storage::session_repository::BeginAnswerOutcome::Ready
    ));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn unlock_quiz_passes_with_three_correct_of_five(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool.clone(), "").await);
    seed_chapter(&pool, "optics", 6).await;

    let auth_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/google")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(
                    &json!({"id_token": "valid-google-token"}),
                )?))?,
        )
        .await?;
    let auth_body = json_body(auth_resp).await;
    let auth = format!("Bearer {}", auth_body["data"]["access_token"].as_str().unwrap());

    let generate = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/unlock-quiz/generate")
                .header(header::AUTHORIZATION, auth.clone())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(
                    &json!({"chapter_key": "physics_optics"}),
                )?))?,
        )
        .await?;
    assert_eq!(generate.status(), StatusCode::OK);
    let generated = json_body(generate).await;
    let session_id = generated["data"]["session_id"].as_str().unwrap().to_string();
    let questions = generated["data"]["questions"].as_array().unwrap().clone();
    assert_eq!(questions.len(), 5);

    // 3 correct of 5 is the pass boundary (§8: A,A,A,B,C passes; A,A,B,B,C fails).
    for (i, q) in questions.iter().enumerate() {
        let answer = if i < 3 { "A" } else { "Z" };
        let submit = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/unlock-quiz/submit-answer")
                    .header(header::AUTHORIZATION, auth.clone())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&json!({
                        "question_id": q["question_id"].as_str().unwrap(),
                        "student_answer": answer,
                        "time_taken_seconds": 5
                    }))?))?,
            )
            .await?;
        assert_eq!(submit.status(), StatusCode::OK);
    }

    let complete = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/unlock-quiz/complete")
                .header(header::AUTHORIZATION, auth)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(
                    &json!({"session_id": session_id}),
                )?))?,
        )
        .await?;
    assert_eq!(complete.status(), StatusCode::OK);
    let completed = json_body(complete).await;
    assert_eq!(completed["data"]["correct_count"], 3);
    assert_eq!(completed["data"]["passed"], true);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn admin_reload_requires_configured_key(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let disabled = build_router(test_state(pool.clone(), "").await);
    let resp = disabled
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/admin/tier-configs/reload")
                .header("x-admin-key", "anything")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let enabled = build_router(test_state(pool, "s3cret").await);
    let missing_key = enabled
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/admin/tier-configs/reload")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(missing_key.status(), StatusCode::UNAUTHORIZED);

    let ok = enabled
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/admin/tier-configs/reload")
                .header("x-admin-key", "s3cret")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(ok.status(), StatusCode::OK);
    let body = json_body(ok).await;
    assert_eq!(body["data"]["reloaded"], 4);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn scheduled_jobs_require_cron_secret(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool, "").await);

    let unauthorized = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/jobs/weekly-snapshot")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let authorized = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/jobs/weekly-snapshot")
                .header("x-cron-secret", "test-cron-secret")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(authorized.status(), StatusCode::OK);
    let body = json_body(authorized).await;
    assert_eq!(body["data"]["created"], 0);
    assert_eq!(body["data"]["errors"], 0);

    Ok(())
}
