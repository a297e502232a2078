//! Snap practice: a small DB-first bundle for one chapter. When the catalog
//! can't fill the request the planner reports `SelectionOutcome::Partial`;
//! without a live AI collaborator wired up, we answer from the catalog or
//! report `SnapSource::None`, documented as an open question in DESIGN.md
//! rather than faked with synthetic questions.

use std::collections::HashSet;
use std::sync::Arc;

use ascent_domain::dto::{ApiEnvelope, CompleteSessionRequest, CompleteSessionResponse, SnapPracticeRequest, SnapPracticeResponse};
use ascent_domain::model::{ChapterKey, Feature};
use ascent_domain::session::{SessionKind, SessionMetadata, SnapSource};
use ascent_domain::DomainError;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use validator::Validate;

use ascent_engine::selection::{self, SelectionOutcome};

use crate::AppState;
use crate::middleware::auth::AuthUser;

use super::support::{load_owned_session, reserve_quota};

pub async fn questions(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<SnapPracticeRequest>,
) -> Result<Json<ApiEnvelope<SnapPracticeResponse>>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let now = Utc::now();
    let (_config, reservation) = reserve_quota(&state, user_id, Feature::SnapSolve, now).await?;

    let chapter_key = ChapterKey(req.chapter_key.clone());
    let result = async {
        let snapshot = state
            .question_index
            .snapshot(std::slice::from_ref(&req.chapter_key))
            .await?;
        let outcome = selection::plan_snap_practice(
            &snapshot,
            &chapter_key,
            req.difficulty_hint.unwrap_or(0.0),
            &HashSet::new(),
        );

        let source = match &outcome {
            SelectionOutcome::Full(_) => SnapSource::Database,
            SelectionOutcome::Partial(q) if q.is_empty() => SnapSource::None,
            SelectionOutcome::Partial(_) => {
                tracing::info!(
                    chapter_key = %chapter_key.as_str(),
                    "snap practice catalog returned a partial set; no AI collaborator configured"
                );
                SnapSource::Database
            }
        };

        if outcome.questions().is_empty() {
            return Ok::<_, DomainError>((outcome, source, None));
        }

        let session = state
            .session_coordinator
            .create(
                user_id,
                SessionKind::SnapPractice,
                SessionMetadata::SnapPractice {
                    chapter_key: chapter_key.clone(),
                    source,
                },
                outcome.questions().to_vec(),
                now,
            )
            .await?;
        Ok((outcome, source, Some(session)))
    }
    .await;

    match result {
        Ok((outcome, source, Some(session))) => Ok(Json(ApiEnvelope::ok(SnapPracticeResponse {
            source,
            questions: session
                .questions
                .iter()
                .map(|q| ascent_domain::dto::QuestionSummary {
                    question_id: q.question_id,
                    position: q.position,
                    rationale: q.rationale,
                })
                .collect(),
        }))),
        Ok((_, source, None)) => Ok(Json(ApiEnvelope::ok(SnapPracticeResponse { source, questions: Vec::new() }))),
        Err(e) => {
            reservation.rollback(&state, user_id).await;
            Err(e)
        }
    }
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CompleteSessionRequest>,
) -> Result<Json<ApiEnvelope<CompleteSessionResponse>>, DomainError> {
    let now = Utc::now();
    let session = load_owned_session(&state, body.session_id, user_id, SessionKind::SnapPractice).await?;

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
        passed: None,
        overall_theta: view.overall_theta,
        overall_percentile: view.overall_percentile,
    })))
}
