//! Unlock quiz: a fixed 5-question gate for a locked chapter, drawn at
//! θ = 0. No θ update on submit and no quota gate — unlocking a chapter is
//! not metered by tier, per §6.

use std::collections::HashSet;
use std::sync::Arc;

use ascent_domain::dto::{
    ApiEnvelope, CompleteSessionRequest, CompleteSessionResponse, GenerateChapterPracticeRequest,
    GenerateSessionResponse, SubmitAnswerRequest, SubmitAnswerResponse,
};
use ascent_domain::model::ChapterKey;
use ascent_domain::session::{SessionKind, SessionMetadata};
use ascent_domain::DomainError;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use validator::Validate;

use ascent_engine::selection;

use crate::AppState;
use crate::middleware::auth::AuthUser;

use super::support::{load_owned_session, load_question, session_response, submit_answer as grade_answer};

/// Correct answers required out of `UNLOCK_QUIZ_SIZE` to pass, per §7.
const PASS_THRESHOLD: u32 = 3;

pub async fn generate(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<GenerateChapterPracticeRequest>,
) -> Result<Json<ApiEnvelope<GenerateSessionResponse>>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let now = Utc::now();
    let chapter_key = ChapterKey(req.chapter_key.clone());

    let snapshot = state
        .question_index
        .snapshot(std::slice::from_ref(&req.chapter_key))
        .await?;
    let outcome = selection::plan_unlock_quiz(&snapshot, &chapter_key, &HashSet::new());
    if outcome.questions().is_empty() {
        return Err(DomainError::NotFound(format!(
            "no questions available for chapter {}",
            chapter_key.as_str()
        )));
    }

    let session = state
        .session_coordinator
        .create(
            user_id,
            SessionKind::UnlockQuiz,
            SessionMetadata::UnlockQuiz { chapter_key },
            outcome.questions().to_vec(),
            now,
        )
        .await?;
    Ok(Json(ApiEnvelope::ok(session_response(&session))))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Json<ApiEnvelope<SubmitAnswerResponse>>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let session = state
        .sessions
        .find_in_progress(user_id, SessionKind::UnlockQuiz)
        .await?
        .ok_or_else(|| DomainError::NotFound("no in-progress unlock quiz session".to_string()))?;
    let question = load_question(&state, req.question_id).await?;

    let response = grade_answer(
        &state,
        &session,
        &question,
        &req.student_answer,
        req.time_taken_seconds,
        SessionKind::UnlockQuiz.theta_multiplier(),
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
    let session = load_owned_session(&state, body.session_id, user_id, SessionKind::UnlockQuiz).await?;

    // Unlock quizzes never feed the learning-phase threshold; the quiz
    // itself never counts toward `completed_quiz_count`.
    let completed = state
        .session_coordinator
        .complete(session.session_id, u32::MAX, now)
        .await?;
    let view = state.users.get_proficiency_view(user_id).await?;

    Ok(Json(ApiEnvelope::ok(CompleteSessionResponse {
        session_id: completed.session_id,
        accuracy: completed.accuracy(),
        questions_answered: completed.questions_answered,
        correct_count: completed.correct_count,
        total_time_seconds: completed.total_time_seconds,
        passed: Some(completed.correct_count >= PASS_THRESHOLD),
        overall_theta: view.overall_theta,
        overall_percentile: view.overall_percentile,
    })))
}
