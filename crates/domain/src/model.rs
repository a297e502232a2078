//! Core data model: users, chapters, questions, quotas, review intervals,
//! and theta snapshots. Session and response types live in [`crate::session`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::irt::{SE_CEIL, SE_FLOOR, THETA_MAX, THETA_MIN};

/// Exam subject. The catalog covers exactly these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Physics,
    Chemistry,
    Mathematics,
}

impl Subject {
    pub const ALL: [Subject; 3] = [Subject::Physics, Subject::Chemistry, Subject::Mathematics];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Physics => "physics",
            Subject::Chemistry => "chemistry",
            Subject::Mathematics => "mathematics",
        }
    }
}

impl std::str::FromStr for Subject {
    type Err = crate::errors::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physics" => Ok(Subject::Physics),
            "chemistry" => Ok(Subject::Chemistry),
            "mathematics" => Ok(Subject::Mathematics),
            other => Err(crate::errors::DomainError::Validation(format!(
                "unknown subject: {other}"
            ))),
        }
    }
}

/// Canonical `subject_chapter` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterKey(pub String);

impl ChapterKey {
    pub fn new(subject: Subject, chapter: &str) -> Self {
        Self(format!("{}_{}", subject.as_str(), chapter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    McqSingle,
    Numerical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IrtParameters {
    /// Discrimination, a ∈ [0.3, 3]
    pub a: f64,
    /// Difficulty, b ∈ [-3, 3]
    pub b: f64,
    /// Guessing, c ∈ [0, 1]
    pub c: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnswerRange {
    pub min: f64,
    pub max: f64,
}

/// Immutable catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: Uuid,
    pub subject: Subject,
    pub chapter: String,
    pub sub_topics: Vec<String>,
    pub question_type: QuestionType,
    pub correct_answer: String,
    pub answer_range: Option<AnswerRange>,
    pub irt: IrtParameters,
    pub initial_assessment_eligible: bool,
}

impl Question {
    pub fn chapter_key(&self) -> ChapterKey {
        ChapterKey::new(self.subject, &self.chapter)
    }
}

/// Per-(user, chapter) proficiency state. θ clamped on every write; SE
/// non-increasing except on assessment reset (`reset_for_assessment`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChapterState {
    pub theta: f64,
    pub confidence_se: f64,
    pub attempts: u32,
    pub correct: u32,
    pub last_updated: DateTime<Utc>,
}

impl ChapterState {
    pub fn new_cold(now: DateTime<Utc>) -> Self {
        Self {
            theta: 0.0,
            confidence_se: SE_CEIL,
            attempts: 0,
            correct: 0,
            last_updated: now,
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.correct as f64 / self.attempts as f64
        }
    }

    pub fn percentile(&self) -> u8 {
        crate::irt::percentile(self.theta)
    }

    /// Clamp invariants: θ ∈ [-3, 3], SE ∈ [0.15, 0.6].
    pub fn clamped(mut self) -> Self {
        self.theta = self.theta.clamp(THETA_MIN, THETA_MAX);
        self.confidence_se = self.confidence_se.clamp(SE_FLOOR, SE_CEIL);
        self
    }

    /// Assessment completion resets SE upward to reflect a fresh cold-start
    /// estimate rather than accumulated confidence from a stale prior.
    pub fn reset_for_assessment(theta: f64, se: f64, now: DateTime<Utc>) -> Self {
        Self {
            theta: theta.clamp(THETA_MIN, THETA_MAX),
            confidence_se: se.clamp(SE_FLOOR, SE_CEIL),
            attempts: 0,
            correct: 0,
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubjectState {
    pub theta: f64,
    pub percentile: u8,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningPhase {
    Exploration,
    Exploitation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    NotStarted,
    Processing,
    Completed,
    Error,
}

/// Subtopic-level accuracy counters, keyed by sub-topic name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtopicAccuracy {
    pub correct: u32,
    pub total: u32,
}

/// In-memory aggregate view of a user's proficiency state, assembled by the
/// storage layer from normalized rows and consumed by the engine crate's
/// pure rollup/selection functions. Not itself persisted as one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProficiencyView {
    pub user_id: Uuid,
    pub overall_theta: f64,
    pub overall_percentile: u8,
    pub theta_by_subject: HashMap<Subject, SubjectState>,
    pub theta_by_chapter: HashMap<ChapterKey, ChapterState>,
    pub subtopic_accuracy: HashMap<String, SubtopicAccuracy>,
    pub total_questions_attempted: u64,
    pub total_questions_correct: u64,
    pub total_time_spent_minutes: u64,
    pub completed_quiz_count: u32,
    pub learning_phase: LearningPhase,
    pub current_day: u32,
    pub assessment_status: AssessmentStatus,
    pub assessment_baseline: Option<HashMap<ChapterKey, ChapterState>>,
}

impl ProficiencyView {
    pub fn new_cold(user_id: Uuid) -> Self {
        Self {
            user_id,
            overall_theta: 0.0,
            overall_percentile: 50,
            theta_by_subject: HashMap::new(),
            theta_by_chapter: HashMap::new(),
            subtopic_accuracy: HashMap::new(),
            total_questions_attempted: 0,
            total_questions_correct: 0,
            total_time_spent_minutes: 0,
            completed_quiz_count: 0,
            learning_phase: LearningPhase::Exploration,
            current_day: 1,
            assessment_status: AssessmentStatus::NotStarted,
            assessment_baseline: None,
        }
    }
}

/// Feature keys gated by the tier & quota gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    SnapSolve,
    DailyQuiz,
    AiTutor,
    ChapterPractice,
    MockTests,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::SnapSolve,
        Feature::DailyQuiz,
        Feature::AiTutor,
        Feature::ChapterPractice,
        Feature::MockTests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::SnapSolve => "snap_solve",
            Feature::DailyQuiz => "daily_quiz",
            Feature::AiTutor => "ai_tutor",
            Feature::ChapterPractice => "chapter_practice",
            Feature::MockTests => "mock_tests",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    Daily,
    Weekly,
    Monthly,
}

/// Per (user, feature, period_key) usage counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub user_id: Uuid,
    pub feature: Feature,
    pub period_key: String,
    pub used: i64,
    /// -1 means unlimited.
    pub limit: i64,
    pub resets_at: DateTime<Utc>,
}

impl QuotaCounter {
    pub fn is_unlimited(&self) -> bool {
        self.limit == -1
    }

    pub fn remaining(&self) -> Option<i64> {
        if self.is_unlimited() {
            None
        } else {
            Some((self.limit - self.used).max(0))
        }
    }
}

/// Fixed ladder of spaced-repetition intervals (days).
pub const REVIEW_LADDER: [u32; 5] = [1, 3, 7, 14, 30];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewInterval {
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub interval_days: u32,
    pub next_review: DateTime<Utc>,
    pub times_reviewed: u32,
}

impl ReviewInterval {
    pub fn new_after_incorrect(user_id: Uuid, question_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            question_id,
            interval_days: REVIEW_LADDER[0],
            next_review: now + chrono::Duration::days(REVIEW_LADDER[0] as i64),
            times_reviewed: 1,
        }
    }

    /// Promote one rung on the ladder after a correct review; clamps at the
    /// top rung rather than panicking once fully mastered.
    pub fn promote(&mut self, now: DateTime<Utc>) {
        let current_index = REVIEW_LADDER
            .iter()
            .position(|&d| d == self.interval_days)
            .unwrap_or(0);
        let next_index = (current_index + 1).min(REVIEW_LADDER.len() - 1);
        self.interval_days = REVIEW_LADDER[next_index];
        self.next_review = now + chrono::Duration::days(self.interval_days as i64);
        self.times_reviewed += 1;
    }

    pub fn reset_after_incorrect(&mut self, now: DateTime<Utc>) {
        self.interval_days = REVIEW_LADDER[0];
        self.next_review = now + chrono::Duration::days(REVIEW_LADDER[0] as i64);
        self.times_reviewed += 1;
    }
}

/// Immutable post-completion snapshot for timeline queries. Keyed by either
/// `quiz_id` (per-quiz snapshot) or an ISO week key (weekly sweep snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThetaSnapshot {
    pub user_id: Uuid,
    pub period_key: String,
    pub captured_at: DateTime<Utc>,
    pub theta_by_chapter: HashMap<ChapterKey, ChapterState>,
    pub theta_by_subject: HashMap<Subject, SubjectState>,
    pub overall_theta: f64,
    pub overall_percentile: u8,
    pub quiz_performance: Option<QuizPerformance>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuizPerformance {
    pub questions_answered: u32,
    pub correct_count: u32,
    pub total_time_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub date: DateTime<Utc>,
    pub theta: f64,
    pub percentile: u8,
    pub quiz_number: Option<u32>,
}
