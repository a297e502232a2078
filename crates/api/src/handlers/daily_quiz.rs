//! Daily quiz: the primary quiz loop. Exploration for the first 13 quizzes,
//! then exploitation (60% deliberate practice / 25% review / 15%
//! exploration), with a recovery variant substituted in when the user's
//! last few quizzes ran cold, per §4.4.

use std::collections::HashSet;
use std::sync::Arc;

use ascent_domain::dto::{ApiEnvelope, CompleteSessionRequest, CompleteSessionResponse, GenerateSessionResponse, SubmitAnswerRequest, SubmitAnswerResponse};
use ascent_domain::model::{ChapterKey, Feature, LearningPhase};
use ascent_domain::session::{SessionKind, SessionMetadata};
use ascent_domain::DomainError;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use validator::Validate;

use ascent_engine::selection::{self, SelectionOutcome};

use crate::AppState;
use crate::middleware::auth::AuthUser;

use super::support::{load_owned_session, load_question, reserve_quota, session_response, submit_answer as grade_answer};

const RECOVERY_LOOKBACK: i64 = 5;

pub async fn generate(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiEnvelope<GenerateSessionResponse>>, DomainError> {
    let now = Utc::now();
    let (config, reservation) = reserve_quota(&state, user_id, Feature::DailyQuiz, now).await?;

    let result = async {
        let view = state.users.get_proficiency_view(user_id).await?;
        let chapter_keys: Vec<ChapterKey> = state
            .question_index
            .all_chapter_keys()
            .await?
            .into_iter()
            .map(ChapterKey)
            .collect();
        let snapshot = state
            .question_index
            .snapshot(
                &chapter_keys
                    .iter()
                    .map(|k| k.as_str().to_string())
                    .collect::<Vec<_>>(),
            )
            .await?;

        let recent = state
            .snapshot_store
            .recent_quiz_performance(user_id, RECOVERY_LOOKBACK)
            .await?;
        let is_recovery = matches!(view.learning_phase, LearningPhase::Exploitation)
            && selection::is_recovery_trigger(
                &recent,
                config.recovery_trigger_consecutive_quizzes as u32,
                config.recovery_trigger_accuracy_threshold,
            );

        let empty = HashSet::new();
        let outcome = if is_recovery {
            selection::plan_recovery(&snapshot, &view, &chapter_keys, &empty, selection::DAILY_QUIZ_SIZE)
        } else {
            match view.learning_phase {
                LearningPhase::Exploration => selection::plan_exploration(
                    &snapshot,
                    &view,
                    &chapter_keys,
                    &empty,
                    selection::DAILY_QUIZ_SIZE,
                ),
                LearningPhase::Exploitation => {
                    let due_set = state.spaced_repetition.due_set(user_id, now).await?;
                    selection::plan_exploitation(
                        &snapshot,
                        &view,
                        &chapter_keys,
                        &due_set,
                        &empty,
                        selection::DAILY_QUIZ_SIZE,
                    )
                }
            }
        };

        if matches!(outcome, SelectionOutcome::Partial(_)) {
            tracing::warn!(user_id = %user_id, "daily quiz selection returned fewer than requested questions");
        }

        let metadata = SessionMetadata::DailyQuiz {
            quiz_number: view.completed_quiz_count + 1,
            learning_phase: view.learning_phase,
            is_recovery_quiz: is_recovery,
        };

        state
            .session_coordinator
            .create(
                user_id,
                SessionKind::DailyQuiz,
                metadata,
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
        .find_in_progress(user_id, SessionKind::DailyQuiz)
        .await?
        .ok_or_else(|| DomainError::NotFound("no in-progress daily quiz session".to_string()))?;
    let question = load_question(&state, req.question_id).await?;
    let theta_multiplier = SessionKind::DailyQuiz.theta_multiplier();

    let response = grade_answer(
        &state,
        &session,
        &question,
        &req.student_answer,
        req.time_taken_seconds,
        theta_multiplier,
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
    let session = load_owned_session(&state, body.session_id, user_id, SessionKind::DailyQuiz).await?;
    let config = super::support::resolve_tier_config(&state, user_id, now).await?;

    let completed = state
        .session_coordinator
        .complete(
            session.session_id,
            config.learning_phase_quiz_threshold as u32,
            now,
        )
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
