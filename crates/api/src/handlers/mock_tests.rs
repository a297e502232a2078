//! Mock tests: template-driven full-length practice exams. Unlike the other
//! session kinds this family owns its own sub-router so the `/start` route
//! can carry an extra rate-limit layer (5 minutes between starts) on top of
//! the monthly quota gate.

use std::collections::HashSet;
use std::sync::Arc;

use ascent_domain::dto::{
    ApiEnvelope, CompleteSessionResponse, GenerateSessionResponse, MockTestClearAnswerRequest,
    MockTestSaveAnswerRequest, MockTestStartRequest,
};
use ascent_domain::model::{ChapterKey, Feature, Subject};
use ascent_domain::session::{SessionKind, SessionMetadata};
use ascent_domain::DomainError;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use validator::Validate;

use ascent_engine::selection;

use crate::AppState;
use crate::middleware::auth::AuthUser;

use super::support::{load_owned_session, reserve_quota, session_response};

/// The monthly-quota-gated, rate-limited entry point is split into its own
/// sub-router so only `/start` carries the governor layer; `build_router`
/// merges this in alongside its plain `.route(...)` calls.
pub fn router() -> Router<Arc<AppState>> {
    let governor_conf = Box::new(
        GovernorConfigBuilder::default()
            .per_second(300)
            .burst_size(1)
            .finish()
            .expect("static governor config is well-formed"),
    );

    let start_router = Router::new()
        .route("/v1/mock-tests/start", post(start))
        .layer(GovernorLayer {
            config: Box::leak(governor_conf),
        });

    start_router
        .route("/v1/mock-tests/save-answer", post(save_answer))
        .route("/v1/mock-tests/clear-answer", post(clear_answer))
        .route("/v1/mock-tests/submit", post(submit))
        .route("/v1/mock-tests/abandon", post(abandon))
}

fn chapter_keys_by_subject(all_keys: Vec<String>) -> Vec<(Subject, Vec<ChapterKey>)> {
    let mut by_subject: Vec<(Subject, Vec<ChapterKey>)> =
        Subject::ALL.iter().map(|s| (*s, Vec::new())).collect();

    for key in all_keys {
        if let Some(entry) = by_subject.iter_mut().find(|(s, _)| key.starts_with(s.as_str())) {
            entry.1.push(ChapterKey(key));
        }
    }
    by_subject
}

async fn start(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<MockTestStartRequest>,
) -> Result<Json<ApiEnvelope<GenerateSessionResponse>>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let now = Utc::now();
    let (_config, reservation) = reserve_quota(&state, user_id, Feature::MockTests, now).await?;

    let result = async {
        let template = selection::template_by_id(&req.template_id)
            .ok_or_else(|| DomainError::Validation(format!("unknown mock test template {}", req.template_id)))?;

        let all_keys = state.question_index.all_chapter_keys().await?;
        let grouped = chapter_keys_by_subject(all_keys);
        let flat_keys: Vec<String> = grouped
            .iter()
            .flat_map(|(_, keys)| keys.iter().map(|k| k.as_str().to_string()))
            .collect();
        let snapshot = state.question_index.snapshot(&flat_keys).await?;

        let outcome = selection::plan_mock_test(&snapshot, &template, &grouped, user_id, &HashSet::new());
        if outcome.questions().is_empty() {
            return Err(DomainError::Fatal("mock test catalog returned no questions".to_string()));
        }

        state
            .session_coordinator
            .create(
                user_id,
                SessionKind::MockTest,
                SessionMetadata::MockTest { template_id: req.template_id.clone() },
                outcome.questions().to_vec(),
                now,
            )
            .await
    }
    .await;

    match result {
        Ok(session) => Ok(Json(ApiEnvelope::ok(session_response(&session)))),
        Err(e) => {
            reservation.rollback(&state, user_id).await;
            Err(e)
        }
    }
}

async fn save_answer(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<MockTestSaveAnswerRequest>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let session = state
        .sessions
        .find_in_progress(user_id, SessionKind::MockTest)
        .await?
        .ok_or_else(|| DomainError::NotFound("no in-progress mock test session".to_string()))?;

    if !session.questions.iter().any(|q| q.question_id == req.question_id) {
        return Err(DomainError::NotFound(format!(
            "question {} not part of mock test session {}",
            req.question_id, session.session_id
        )));
    }
    state
        .sessions
        .save_draft_answer(session.session_id, req.question_id, &req.student_answer)
        .await?;
    Ok(Json(ApiEnvelope::ok(serde_json::json!({ "saved": true }))))
}

async fn clear_answer(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<MockTestClearAnswerRequest>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, DomainError> {
    let session = state
        .sessions
        .find_in_progress(user_id, SessionKind::MockTest)
        .await?
        .ok_or_else(|| DomainError::NotFound("no in-progress mock test session".to_string()))?;

    state
        .sessions
        .clear_draft_answer(session.session_id, req.question_id)
        .await?;
    Ok(Json(ApiEnvelope::ok(serde_json::json!({ "cleared": true }))))
}

async fn submit(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiEnvelope<CompleteSessionResponse>>, DomainError> {
    let now = Utc::now();
    let session = state
        .sessions
        .find_in_progress(user_id, SessionKind::MockTest)
        .await?
        .ok_or_else(|| DomainError::NotFound("no in-progress mock test session".to_string()))?;

    for q in &session.questions {
        let Some(answer) = q.draft_answer.clone() else { continue };
        let question = super::support::load_question(&state, q.question_id).await?;
        state
            .session_coordinator
            .submit_answer(
                session.session_id,
                &question,
                &answer,
                0,
                ascent_domain::model::ChapterState::new_cold(now),
                0.0,
                now,
            )
            .await?;
    }

    let completed = state.session_coordinator.complete(session.session_id, u32::MAX, now).await?;
    let view = state.users.get_proficiency_view(user_id).await?;

    Ok(Json(ApiEnvelope::ok(CompleteSessionResponse {
        session_id: completed.session_id,
        accuracy: completed.accuracy(),
        questions_answered: completed.questions_answered,
        correct_count: completed.correct_count,
        total_time_seconds: completed.total_time_seconds,
        passed: None,
        overall_theta: view.overall_theta,
        overall_percentile: view.overall_percentile,
    })))
}

async fn abandon(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ascent_domain::dto::CompleteSessionRequest>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, DomainError> {
    let session = load_owned_session(&state, body.session_id, user_id, SessionKind::MockTest).await?;
    state.sessions.mark_abandoned(session.session_id).await?;
    Ok(Json(ApiEnvelope::ok(serde_json::json!({ "abandoned": true }))))
}
