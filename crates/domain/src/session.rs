//! Session state machine types shared by all session kinds, per the
//! life-cycle: create → answer* → complete, with expire/invalidate/abandon
//! as alternate terminal transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ChapterKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    DailyQuiz,
    ChapterPractice,
    UnlockQuiz,
    SnapPractice,
    MockTest,
    InitialAssessment,
}

impl SessionKind {
    /// θ-delta scaling factor applied to a planned chapter update, per §4.7.
    pub fn theta_multiplier(&self) -> f64 {
        match self {
            SessionKind::DailyQuiz | SessionKind::InitialAssessment => 1.0,
            SessionKind::ChapterPractice => 0.5,
            SessionKind::SnapPractice => 0.4,
            SessionKind::UnlockQuiz | SessionKind::MockTest => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::DailyQuiz => "daily_quiz",
            SessionKind::ChapterPractice => "chapter_practice",
            SessionKind::UnlockQuiz => "unlock_quiz",
            SessionKind::SnapPractice => "snap_practice",
            SessionKind::MockTest => "mock_test",
            SessionKind::InitialAssessment => "initial_assessment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completing,
    Completed,
    Expired,
    Invalidated,
    Abandoned,
}

/// Kind-specific metadata carried alongside the common session fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionMetadata {
    DailyQuiz {
        quiz_number: u32,
        learning_phase: crate::model::LearningPhase,
        is_recovery_quiz: bool,
    },
    ChapterPractice {
        chapter_key: ChapterKey,
    },
    UnlockQuiz {
        chapter_key: ChapterKey,
    },
    SnapPractice {
        chapter_key: ChapterKey,
        source: SnapSource,
    },
    MockTest {
        template_id: String,
    },
    InitialAssessment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapSource {
    Database,
    Ai,
    Mixed,
    None,
}

/// Why a question was selected for its position, per §4.4's output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRationale {
    Exploration,
    DeliberatePractice,
    Review,
}

/// One ordered position within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionQuestion {
    pub position: u32,
    pub question_id: Uuid,
    pub rationale: SelectionRationale,
    pub answered: bool,
    /// Write-sentinel preventing concurrent answer-submission writers;
    /// expires 30s after being set (checked at read time, no sweeper).
    pub answering_since: Option<DateTime<Utc>>,
    /// Mock-test-only: an ungraded answer saved ahead of the final submit,
    /// settable and clearable independent of `answered`.
    pub draft_answer: Option<String>,
}

impl SessionQuestion {
    pub fn sentinel_expired(&self, now: DateTime<Utc>) -> bool {
        match self.answering_since {
            Some(since) => now - since > chrono::Duration::seconds(30),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub questions: Vec<SessionQuestion>,
    pub questions_answered: u32,
    pub correct_count: u32,
    pub total_time_seconds: u32,
    pub metadata: SessionMetadata,
    pub invalidation_reason: Option<String>,
}

impl Session {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed
                | SessionStatus::Expired
                | SessionStatus::Invalidated
                | SessionStatus::Abandoned
        )
    }

    /// Whether this session should be lazily marked expired on next touch.
    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, SessionStatus::InProgress)
            && self.expires_at.map(|exp| exp < now).unwrap_or(false)
    }

    pub fn accuracy(&self) -> f64 {
        if self.questions_answered == 0 {
            0.0
        } else {
            self.correct_count as f64 / self.questions_answered as f64
        }
    }
}

/// One graded answer for (session_id, question_id). Written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub session_id: Uuid,
    pub question_id: Uuid,
    pub student_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub time_taken_seconds: u32,
    pub irt: crate::model::IrtParameters,
    pub chapter_key: ChapterKey,
    pub sub_topics: Vec<String>,
    pub theta_delta: f64,
    pub answered_at: DateTime<Utc>,
}

/// Errors specific to the session state machine; converted to
/// [`crate::errors::DomainError`] at the API boundary.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} already completed")]
    AlreadyCompleted(Uuid),
    #[error("session {0} is being completed by another request")]
    InProgressByPeer(Uuid),
    #[error("question {0} is not part of session {1}")]
    QuestionNotFound(Uuid, Uuid),
    #[error("user {0} not found while completing session {1}")]
    UserNotFound(Uuid, Uuid),
    #[error("session {0} expired")]
    Expired(Uuid),
    #[error("session {0} invalidated: {1}")]
    Invalidated(Uuid, String),
    #[error("too many in-progress sessions of this kind for user {0}")]
    DuplicateInProgress(Uuid),
}

impl From<SessionError> for crate::errors::DomainError {
    fn from(err: SessionError) -> Self {
        use crate::errors::DomainError;
        match err {
            SessionError::AlreadyCompleted(_)
            | SessionError::InProgressByPeer(_)
            | SessionError::Expired(_)
            | SessionError::Invalidated(_, _)
            | SessionError::DuplicateInProgress(_) => DomainError::StateConflict(err.to_string()),
            SessionError::QuestionNotFound(_, _) => DomainError::NotFound(err.to_string()),
            SessionError::UserNotFound(_, _) => DomainError::NotFound(err.to_string()),
        }
    }
}
