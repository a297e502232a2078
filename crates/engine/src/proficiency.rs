//! Proficiency Store's pure planning half (C4). Unit-testable without a
//! database; the persistence gateway lives in `ascent_storage::user_repository`.

use std::collections::HashMap;

use ascent_domain::irt::{self, ItemResponse};
use ascent_domain::model::{ChapterKey, ChapterState, ProficiencyView, Subject, SubjectState};
use chrono::{DateTime, Utc};

/// Per-submission SE decay applied outside the multiplier=1 path.
const SE_DECAY_PER_SUBMISSION: f64 = 0.98;

/// Scale the raw MAP θ delta by `multiplier` and fold it into `prior`,
/// accumulating attempts/correct at full weight regardless of multiplier,
/// per §4.2.
pub fn plan_chapter_update(
    prior: ChapterState,
    responses: &[ItemResponse],
    multiplier: f64,
    now: DateTime<Utc>,
) -> ChapterState {
    if responses.is_empty() {
        return prior;
    }

    let map = irt::map_update(prior.theta, prior.confidence_se, responses);
    let raw_delta = map.theta - prior.theta;
    let theta = prior.theta + raw_delta * multiplier;

    let confidence_se = if multiplier == 1.0 {
        map.se
    } else {
        prior.confidence_se * SE_DECAY_PER_SUBMISSION.powi(responses.len() as i32)
    };

    let correct = responses.iter().filter(|r| r.correct).count() as u32;

    ChapterState {
        theta,
        confidence_se,
        attempts: prior.attempts + responses.len() as u32,
        correct: prior.correct + correct,
        last_updated: now,
    }
    .clamped()
}

/// The subject/overall rollup produced by folding a chapter map, per §4.2.
#[derive(Debug, Clone)]
pub struct SubjectRollup {
    pub theta_by_subject: HashMap<Subject, SubjectState>,
    pub overall_theta: f64,
    pub overall_percentile: u8,
}

/// Subject prefix of a `ChapterKey`, e.g. `physics_kinematics` -> `Physics`.
fn subject_of(chapter_key: &ChapterKey) -> Option<Subject> {
    Subject::ALL.into_iter().find(|s| {
        let prefix = format!("{}_", s.as_str());
        chapter_key.as_str().starts_with(&prefix)
    })
}

/// Attempt-weighted rollup from chapter to subject to overall, per §4.2.
/// Chapters with zero attempts are excluded from every weighted mean.
pub fn rollup_subjects(theta_by_chapter: &HashMap<ChapterKey, ChapterState>) -> SubjectRollup {
    let mut per_subject: HashMap<Subject, (f64, u64, u64, u64)> = HashMap::new(); // (theta*attempts sum, attempts, correct, total)

    for (key, state) in theta_by_chapter {
        if state.attempts == 0 {
            continue;
        }
        let Some(subject) = subject_of(key) else {
            continue;
        };
        let entry = per_subject.entry(subject).or_insert((0.0, 0, 0, 0));
        entry.0 += state.theta * state.attempts as f64;
        entry.1 += state.attempts as u64;
        entry.2 += state.correct as u64;
        entry.3 += state.attempts as u64;
    }

    let mut theta_by_subject = HashMap::new();
    let mut overall_weighted_theta = 0.0;
    let mut overall_attempts = 0u64;

    for (subject, (theta_sum, attempts, correct, total)) in per_subject {
        let theta = theta_sum / attempts as f64;
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        theta_by_subject.insert(
            subject,
            SubjectState {
                theta,
                percentile: irt::percentile(theta),
                accuracy,
            },
        );
        overall_weighted_theta += theta * attempts as f64;
        overall_attempts += attempts;
    }

    let overall_theta = if overall_attempts == 0 {
        0.0
    } else {
        overall_weighted_theta / overall_attempts as f64
    };

    SubjectRollup {
        theta_by_subject,
        overall_theta,
        overall_percentile: irt::percentile(overall_theta),
    }
}

/// Fold a completed session's per-chapter deltas into the user's current
/// proficiency view, recomputing the subject/overall rollup from the
/// merged chapter map. Callers pass the result to
/// `UserRepository::write_atomic` inside the completion transaction.
pub fn fold_chapter_deltas(
    current: &ProficiencyView,
    deltas: &HashMap<ChapterKey, ChapterState>,
) -> (HashMap<ChapterKey, ChapterState>, SubjectRollup) {
    let mut merged = current.theta_by_chapter.clone();
    for (key, state) in deltas {
        merged.insert(key.clone(), *state);
    }
    let rollup = rollup_subjects(&merged);
    (merged, rollup)
}
