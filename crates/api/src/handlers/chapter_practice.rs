//! Chapter practice: on-demand drilling of one chapter, planned near the
//! chapter's current θ. Quota is per-chapter-practice-feature (daily or
//! weekly-per-subject depending on tier), not per chapter.

use std::collections::HashSet;
use std::sync::Arc;

use ascent_domain::dto::{
    ApiEnvelope, CompleteSessionRequest, CompleteSessionResponse, GenerateChapterPracticeRequest,
    GenerateSessionResponse, SubmitAnswerRequest, SubmitAnswerResponse,
};
use ascent_domain::model::{ChapterKey, Feature};
use ascent_domain::session::{SessionKind, SessionMetadata};
use ascent_domain::DomainError;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use validator::Validate;

use ascent_engine::selection;

use crate::AppState;
use crate::middleware::auth::AuthUser;

use super::support::{load_owned_session, load_question, reserve_quota, session_response, submit_answer as grade_answer};

const PRACTICE_SIZE: usize = 10;

pub async fn generate(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<GenerateChapterPracticeRequest>,
) -> Result<Json<ApiEnvelope<GenerateSessionResponse>>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let now = Utc::now();
    let (_config, reservation) = reserve_quota(&state, user_id, Feature::ChapterPractice, now).await?;

    let chapter_key = ChapterKey(req.chapter_key.clone());
    let result = async {
        let view = state.users.get_proficiency_view(user_id).await?;
        let snapshot = state
            .question_index
            .snapshot(std::slice::from_ref(&req.chapter_key))
            .await?;

        let outcome = selection::plan_chapter_practice(
            &snapshot,
            &view,
            &chapter_key,
            &HashSet::new(),
            PRACTICE_SIZE,
        );
        if outcome.questions().is_empty() {
            return Err(DomainError::NotFound(format!(
                "no questions available for chapter {}",
                chapter_key.as_str()
            )));
        }

        state
            .session_coordinator
            .create(
                user_id,
                SessionKind::ChapterPractice,
                SessionMetadata::ChapterPractice {
                    chapter_key: chapter_key.clone(),
                },
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

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Json<ApiEnvelope<SubmitAnswerResponse>>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let session = state
        .sessions
        .find_in_progress(user_id, SessionKind::ChapterPractice)
        .await?
        .ok_or_else(|| DomainError::NotFound("no in-progress chapter practice session".to_string()))?;
    let question = load_question(&state, req.question_id).await?;

    let response = grade_answer(
        &state,
        &session,
        &question,
        &req.student_answer,
        req.time_taken_seconds,
        SessionKind::ChapterPractice.theta_multiplier(),
        Utc::now(),
    )
    .await?;
    Ok(Json(ApiEnvelope::ok(response)))
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CompleteSessionRequest>,
) -> Result<Json<ApiEnvelope<CompleteSessionResponse>>, DomainError> {
    let now = Utc::now();
    let session = load_owned_session(&state, body.session_id, user_id, SessionKind::ChapterPractice).await?;
    let config = super::support::resolve_tier_config(&state, user_id, now).await?;

    let completed = state
        .session_coordinator
        .complete(session.session_id, config.learning_phase_quiz_threshold as u32, now)
        .await?;
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
