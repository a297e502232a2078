//! Read-only analytics surfaces over a user's proficiency row and their
//! theta-snapshot history. No writes here; every handler is a projection.

use std::sync::Arc;

use ascent_domain::dto::{AnalyticsOverviewResponse, ApiEnvelope, ChapterProficiency, TimelineResponse};
use ascent_domain::model::Subject;
use ascent_domain::DomainError;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::AppState;
use crate::middleware::auth::AuthUser;

const DEFAULT_TIMELINE_LIMIT: i64 = 30;

pub async fn overview(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiEnvelope<AnalyticsOverviewResponse>>, DomainError> {
    let view = state.users.get_proficiency_view(user_id).await?;
    Ok(Json(ApiEnvelope::ok(AnalyticsOverviewResponse {
        overall_theta: view.overall_theta,
        overall_percentile: view.overall_percentile,
        total_questions_attempted: view.total_questions_attempted,
        total_questions_correct: view.total_questions_correct,
        completed_quiz_count: view.completed_quiz_count,
        learning_phase: view.learning_phase,
        current_day: view.current_day,
    })))
}

pub async fn mastery_by_subject(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(subject): Path<String>,
) -> Result<Json<ApiEnvelope<Vec<ChapterProficiency>>>, DomainError> {
    let subject: Subject = subject
        .parse()
        .map_err(|_| DomainError::Validation(format!("unknown subject: {subject}")))?;
    let view = state.users.get_proficiency_view(user_id).await?;

    let chapters = view
        .theta_by_chapter
        .iter()
        .filter(|(key, _)| key.as_str().starts_with(subject.as_str()))
        .map(|(key, chapter_state)| ChapterProficiency::from_state(key.as_str(), chapter_state))
        .collect();
    Ok(Json(ApiEnvelope::ok(chapters)))
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    limit: Option<i64>,
    before: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn mastery_timeline(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<ApiEnvelope<TimelineResponse>>, DomainError> {
    let points = state
        .snapshot_store
        .timeline(user_id, query.limit.unwrap_or(DEFAULT_TIMELINE_LIMIT), query.before)
        .await?;
    Ok(Json(ApiEnvelope::ok(TimelineResponse { points })))
}

/// Same underlying snapshot series as `mastery_timeline`; the split is
/// conceptual (mastery = theta/percentile, accuracy = per-quiz hit rate),
/// but `theta_snapshots` only carries theta/percentile plus an optional
/// `quiz_performance`, so both routes answer from one table.
pub async fn accuracy_timeline(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<ApiEnvelope<TimelineResponse>>, DomainError> {
    let points = state
        .snapshot_store
        .timeline(user_id, query.limit.unwrap_or(DEFAULT_TIMELINE_LIMIT), query.before)
        .await?;
    Ok(Json(ApiEnvelope::ok(TimelineResponse { points })))
}

pub async fn all_chapters(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiEnvelope<Vec<ChapterProficiency>>>, DomainError> {
    let view = state.users.get_proficiency_view(user_id).await?;
    let mut chapters: Vec<ChapterProficiency> = view
        .theta_by_chapter
        .iter()
        .map(|(key, chapter_state)| ChapterProficiency::from_state(key.as_str(), chapter_state))
        .collect();
    chapters.sort_by(|a, b| a.chapter_key.cmp(&b.chapter_key));
    Ok(Json(ApiEnvelope::ok(chapters)))
}

/// Days this user was active in the last week, derived from the theta
/// snapshot series (there's no dedicated daily-activity log table; every
/// completed quiz and the weekly sweep both write a snapshot row, so the
/// last 7 days of snapshots double as an activity calendar).
pub async fn weekly_activity(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiEnvelope<TimelineResponse>>, DomainError> {
    let points = state.snapshot_store.timeline(user_id, 7, None).await?;
    Ok(Json(ApiEnvelope::ok(TimelineResponse { points })))
}
