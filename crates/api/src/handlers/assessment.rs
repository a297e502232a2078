//! Initial assessment: a fixed 30-question `initial_assessment` session.
//! Submission is scored in a detached task so the handler can return
//! `status = "processing"` immediately and the caller polls `/results`,
//! mirroring the async contract without standing up a separate job queue.

use std::sync::Arc;

use ascent_domain::dto::{ApiEnvelope, AssessmentResultsResponse, AssessmentSubmitRequest, AssessmentSubmitResponse, ChapterProficiency, GenerateSessionResponse, SubjectProficiency};
use ascent_domain::session::{SessionKind, SessionMetadata};
use ascent_domain::DomainError;
use axum::Json;
use axum::extract::State;
use validator::Validate;

use crate::AppState;
use crate::middleware::auth::AuthUser;

use super::support::session_response;

pub async fn get_questions(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiEnvelope<GenerateSessionResponse>>, DomainError> {
    let now = chrono::Utc::now();
    let eligible = state.question_index.initial_assessment_eligible().await?;
    let outcome = ascent_engine::selection::plan_initial_assessment(&eligible, user_id, 30);
    if outcome.questions().len() < 30 {
        return Err(DomainError::Fatal(
            "initial assessment catalog has fewer than 30 eligible questions".to_string(),
        ));
    }

    let session = state
        .session_coordinator
        .create(
            user_id,
            SessionKind::InitialAssessment,
            SessionMetadata::InitialAssessment,
            outcome.questions().to_vec(),
            now,
        )
        .await?;

    Ok(Json(ApiEnvelope::ok(session_response(&session))))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<AssessmentSubmitRequest>,
) -> Result<Json<ApiEnvelope<AssessmentSubmitResponse>>, DomainError> {
    req.validate()
        .map_err(DomainError::from_validation_errors)?;

    let now = chrono::Utc::now();
    let session = state
        .sessions
        .find_in_progress(user_id, SessionKind::InitialAssessment)
        .await?
        .ok_or_else(|| {
            DomainError::StateConflict("no in-progress initial assessment session".to_string())
        })?;

    state.users.set_assessment_status(user_id, "processing").await?;

    let state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = run_assessment_submission(&state, session.session_id, user_id, req, now).await {
            tracing::error!(user_id = %user_id, error = %e, "initial assessment scoring failed");
            let _ = state.users.set_assessment_status(user_id, "error").await;
        }
    });

    Ok(Json(ApiEnvelope::ok(AssessmentSubmitResponse {
        status: "processing",
    })))
}

async fn run_assessment_submission(
    state: &AppState,
    session_id: uuid::Uuid,
    user_id: uuid::Uuid,
    req: AssessmentSubmitRequest,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), DomainError> {
    for response in &req.responses {
        let question = super::support::load_question(state, response.question_id).await?;
        let prior = super::support::prior_chapter_state(state, user_id, question.chapter_key().as_str()).await?;
        state
            .session_coordinator
            .submit_answer(
                session_id,
                &question,
                &response.student_answer,
                response.time_taken_seconds,
                prior,
                SessionKind::InitialAssessment.theta_multiplier(),
                now,
            )
            .await?;
    }

    // `complete` re-checks the learning-phase threshold against the user's
    // current `completed_quiz_count` on every call; an assessment session
    // never changes that count, so pass a threshold it can never reach
    // rather than risk flipping the phase as a side effect of this call.
    state
        .session_coordinator
        .complete(session_id, u32::MAX, now)
        .await?;
    state.users.set_assessment_status(user_id, "completed").await?;
    Ok(())
}

pub async fn results(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiEnvelope<AssessmentResultsResponse>>, DomainError> {
    let view = state.users.get_proficiency_view(user_id).await?;

    let by_chapter = view
        .theta_by_chapter
        .iter()
        .map(|(key, state)| ChapterProficiency::from_state(key.as_str(), state))
        .collect();
    let by_subject = view
        .theta_by_subject
        .iter()
        .map(|(subject, state)| SubjectProficiency::from_state(*subject, state))
        .collect();

    Ok(Json(ApiEnvelope::ok(AssessmentResultsResponse {
        status: view.assessment_status,
        overall_theta: view.overall_theta,
        overall_percentile: view.overall_percentile,
        by_chapter,
        by_subject,
    })))
}
