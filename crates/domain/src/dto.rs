//! Request/response DTOs for the HTTP surface (§6), validated at the API
//! boundary via `validator`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::model::{ChapterState, Feature, LearningPhase, Subject, SubjectState};
use crate::session::{SelectionRationale, SessionKind};

/// Envelope wrapping every successful HTTP response body, per §6: the
/// request id itself travels on the `x-request-id` response header (set by
/// `tower-http`'s `SetRequestIdLayer`), so the envelope only carries the
/// success flag and payload.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub student_answer: String,
    #[validate(range(min = 0, max = 7200))]
    pub time_taken_seconds: u32,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub question_id: Uuid,
    pub is_correct: bool,
    pub correct_answer: String,
    pub questions_answered: u32,
    pub correct_count: u32,
    /// True if this call observed an already-answered position and replayed
    /// the stored result rather than scoring a new submission.
    pub replayed: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AssessmentResponseItem {
    pub question_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub student_answer: String,
    #[validate(range(min = 0, max = 7200))]
    pub time_taken_seconds: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssessmentSubmitRequest {
    #[validate(length(equal = 30))]
    #[validate(nested)]
    pub responses: Vec<AssessmentResponseItem>,
}

#[derive(Debug, Serialize)]
pub struct AssessmentSubmitResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChapterProficiency {
    pub chapter_key: String,
    pub theta: f64,
    pub confidence_se: f64,
    pub percentile: u8,
    pub accuracy: f64,
    pub attempts: u32,
}

impl ChapterProficiency {
    pub fn from_state(chapter_key: &str, state: &ChapterState) -> Self {
        Self {
            chapter_key: chapter_key.to_string(),
            theta: state.theta,
            confidence_se: state.confidence_se,
            percentile: state.percentile(),
            accuracy: state.accuracy(),
            attempts: state.attempts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubjectProficiency {
    pub subject: Subject,
    pub theta: f64,
    pub percentile: u8,
    pub accuracy: f64,
}

impl SubjectProficiency {
    pub fn from_state(subject: Subject, state: &SubjectState) -> Self {
        Self {
            subject,
            theta: state.theta,
            percentile: state.percentile,
            accuracy: state.accuracy,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AssessmentResultsResponse {
    pub status: crate::model::AssessmentStatus,
    pub overall_theta: f64,
    pub overall_percentile: u8,
    pub by_chapter: Vec<ChapterProficiency>,
    pub by_subject: Vec<SubjectProficiency>,
}

/// Body shared by every `.../complete` endpoint that only needs to name the
/// session being finished.
#[derive(Debug, Deserialize, Validate)]
pub struct CompleteSessionRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateChapterPracticeRequest {
    #[validate(length(min = 1, max = 128))]
    pub chapter_key: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionSummary {
    pub question_id: Uuid,
    pub position: u32,
    pub rationale: SelectionRationale,
}

#[derive(Debug, Serialize)]
pub struct GenerateSessionResponse {
    pub session_id: Uuid,
    pub kind: SessionKind,
    pub questions: Vec<QuestionSummary>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CompleteSessionResponse {
    pub session_id: Uuid,
    pub accuracy: f64,
    pub questions_answered: u32,
    pub correct_count: u32,
    pub total_time_seconds: u32,
    pub passed: Option<bool>,
    pub overall_theta: f64,
    pub overall_percentile: u8,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SnapPracticeRequest {
    #[validate(length(min = 1, max = 128))]
    pub chapter_key: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub difficulty_hint: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SnapPracticeResponse {
    pub source: crate::session::SnapSource,
    pub questions: Vec<QuestionSummary>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MockTestStartRequest {
    #[validate(length(min = 1, max = 64))]
    pub template_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MockTestSaveAnswerRequest {
    pub question_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub student_answer: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MockTestClearAnswerRequest {
    pub question_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct QuotaStatus {
    pub feature: Feature,
    pub used: i64,
    pub limit: i64,
    pub resets_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub tier: String,
    pub features: Vec<Feature>,
    pub usage: Vec<QuotaStatus>,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub points: Vec<crate::model::TimelinePoint>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsOverviewResponse {
    pub overall_theta: f64,
    pub overall_percentile: u8,
    pub total_questions_attempted: u64,
    pub total_questions_correct: u64,
    pub completed_quiz_count: u32,
    pub learning_phase: LearningPhase,
    pub current_day: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn assessment_submit_requires_exactly_thirty_responses() {
        let req = AssessmentSubmitRequest {
            responses: vec![AssessmentResponseItem {
                question_id: Uuid::nil(),
                student_answer: "A".to_string(),
                time_taken_seconds: 10,
            }],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn submit_answer_rejects_empty_answer() {
        let req = SubmitAnswerRequest {
            question_id: Uuid::nil(),
            student_answer: "".to_string(),
            time_taken_seconds: 10,
        };
        assert!(req.validate().is_err());
    }
}
