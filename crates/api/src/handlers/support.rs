//! Shared orchestration helpers used by every session-kind handler family
//! (daily quiz, chapter practice, unlock quiz, snap practice, mock tests):
//! quota reservation, owned-session lookup, and the submit-answer sequence.
//! Generalized out of what would otherwise be five near-identical handler
//! bodies into one shared set of helpers rather than duplicating the
//! sequence per entity.

use std::sync::Arc;

use ascent_domain::dto::{GenerateSessionResponse, QuestionSummary, SubmitAnswerResponse};
use ascent_domain::model::{ChapterState, Feature, Question};
use ascent_domain::session::{Session, SessionKind};
use ascent_domain::{DomainError, clock};
use ascent_engine::{QuotaGateError, SubmitOutcome};
use ascent_storage::TierConfigRow;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::AppState;

/// Maps the engine's quota-gate error into the HTTP-facing error type.
/// Written by hand rather than a `From` impl: both `QuotaGateError`
/// (engine crate) and `DomainError` (domain crate) are foreign to this
/// crate, so the orphan rule blocks a blanket conversion.
pub fn quota_gate_error(err: QuotaGateError) -> DomainError {
    match err {
        QuotaGateError::UnknownTier(tier) => {
            DomainError::Fatal(format!("unknown tier config: {tier}"))
        }
        QuotaGateError::Storage(e) => DomainError::from(e),
    }
}

pub fn session_response(session: &Session) -> GenerateSessionResponse {
    GenerateSessionResponse {
        session_id: session.session_id,
        kind: session.kind,
        questions: session
            .questions
            .iter()
            .map(|q| QuestionSummary {
                question_id: q.question_id,
                position: q.position,
                rationale: q.rationale,
            })
            .collect(),
        expires_at: session.expires_at,
    }
}

pub async fn load_question(state: &AppState, question_id: Uuid) -> Result<Question, DomainError> {
    state
        .questions
        .get_by_id(question_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("question {question_id} not found")))
}

/// Fetches a session, verifying it belongs to `user_id` and is of
/// `expected_kind`. A session owned by someone else is reported as
/// not-found rather than forbidden, to avoid leaking session existence.
pub async fn load_owned_session(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    expected_kind: SessionKind,
) -> Result<Session, DomainError> {
    let session = state
        .sessions
        .get(session_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("session {session_id} not found")))?;

    if session.user_id != user_id {
        return Err(DomainError::NotFound(format!(
            "session {session_id} not found"
        )));
    }

    if session.kind != expected_kind {
        return Err(DomainError::Validation(format!(
            "session {session_id} is a {} session, not {}",
            session.kind.as_str(),
            expected_kind.as_str()
        )));
    }

    Ok(session)
}

/// A successful quota reservation, held by the handler until the downstream
/// write either succeeds (drop it) or fails (call `rollback`).
pub struct QuotaReservation {
    pub feature: Feature,
    pub period_key: String,
}

impl QuotaReservation {
    pub async fn rollback(&self, state: &AppState, user_id: Uuid) {
        if let Err(e) = state
            .quota_gate
            .rollback(user_id, self.feature, &self.period_key)
            .await
        {
            tracing::warn!(
                user_id = %user_id,
                feature = self.feature.as_str(),
                error = %e,
                "failed to roll back quota reservation"
            );
        }
    }
}

/// Resolves the user's effective tier config, for call sites that need a
/// threshold column (learning-phase threshold, recovery trigger) without
/// reserving any quota.
pub async fn resolve_tier_config(
    state: &AppState,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<TierConfigRow, DomainError> {
    let subscription = state
        .users
        .get_subscription_info(user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("user {user_id} not found")))?;

    let tier = state
        .quota_gate
        .effective_tier(user_id, &subscription, now)
        .await;
    state
        .quota_gate
        .tier_config(tier)
        .await
        .map_err(quota_gate_error)
}

/// Resolves the user's tier, looks up the feature's configured limit and
/// reset period, and reserves one unit. Returns the tier config (callers
/// that need threshold columns off it, e.g. unlock-quiz pass/fail, avoid a
/// second lookup) plus the reservation handle.
pub async fn reserve_quota(
    state: &AppState,
    user_id: Uuid,
    feature: Feature,
    now: DateTime<Utc>,
) -> Result<(TierConfigRow, QuotaReservation), DomainError> {
    let config = resolve_tier_config(state, user_id, now).await?;

    let limit = ascent_engine::tier::limit_for(feature, &config);
    let period = ascent_engine::tier::quota_period_for(feature, &config.chapter_practice_quota_kind);

    let (period_key, resets_at) = match period {
        ascent_domain::model::QuotaPeriod::Daily => {
            (clock::ist_day_key(now), clock::next_ist_midnight(now))
        }
        ascent_domain::model::QuotaPeriod::Weekly => {
            (clock::ist_week_key(now), clock::next_ist_week_start(now))
        }
        ascent_domain::model::QuotaPeriod::Monthly => {
            (clock::ist_month_key(now), clock::next_ist_month_start(now))
        }
    };

    let decision = state
        .quota_gate
        .reserve(user_id, feature, limit, &period_key, resets_at)
        .await
        .map_err(quota_gate_error)?;

    if !decision.allowed {
        return Err(DomainError::QuotaExhausted {
            used: decision.used,
            limit: decision.limit,
            resets_at: decision.resets_at,
        });
    }

    Ok((
        config,
        QuotaReservation {
            feature,
            period_key,
        },
    ))
}

/// Prior chapter proficiency (θ, SE) used both to score this submission and
/// to feed `proficiency::plan_chapter_update` once the session completes.
pub async fn prior_chapter_state(
    state: &AppState,
    user_id: Uuid,
    chapter_key: &str,
) -> Result<ChapterState, DomainError> {
    let view = state.users.get_proficiency_view(user_id).await?;
    Ok(view
        .theta_by_chapter
        .get(&ascent_domain::model::ChapterKey(chapter_key.to_string()))
        .copied()
        .unwrap_or_else(|| ChapterState::new_cold(Utc::now())))
}

/// Grades one answer against an already-loaded session and question, folding
/// the already-answered replay path into the same response shape.
pub async fn submit_answer(
    state: &AppState,
    session: &Session,
    question: &Question,
    student_answer: &str,
    time_taken_seconds: u32,
    theta_multiplier: f64,
    now: DateTime<Utc>,
) -> Result<SubmitAnswerResponse, DomainError> {
    let prior = prior_chapter_state(state, session.user_id, question.chapter_key().as_str()).await?;

    let outcome = state
        .session_coordinator
        .submit_answer(
            session.session_id,
            question,
            student_answer,
            time_taken_seconds,
            prior,
            theta_multiplier,
            now,
        )
        .await?;

    let refreshed = state
        .sessions
        .get(session.session_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("session {} not found", session.session_id)))?;

    match outcome {
        SubmitOutcome::Graded {
            is_correct,
            correct_answer,
        } => Ok(SubmitAnswerResponse {
            question_id: question.question_id,
            is_correct,
            correct_answer,
            questions_answered: refreshed.questions_answered,
            correct_count: refreshed.correct_count,
            replayed: false,
        }),
        SubmitOutcome::AlreadyAnswered => {
            let stored = state
                .responses
                .get(session.session_id, question.question_id)
                .await?
                .ok_or_else(|| {
                    DomainError::Fatal(format!(
                        "session {} reports question {} answered but no response row exists",
                        session.session_id, question.question_id
                    ))
                })?;
            Ok(SubmitAnswerResponse {
                question_id: question.question_id,
                is_correct: stored.is_correct,
                correct_answer: stored.correct_answer,
                questions_answered: refreshed.questions_answered,
                correct_count: refreshed.correct_count,
                replayed: true,
            })
        }
        SubmitOutcome::InFlight => Err(DomainError::StateConflict(format!(
            "question {} in session {} is already being submitted",
            question.question_id, session.session_id
        ))),
    }
}
