//! Adaptive learning engine: the pure planning and orchestration layer
//! sitting between the HTTP surface and `ascent_storage`'s repositories.
//! One module per functional component (C4-C11); each takes repository
//! handles by value and exposes `async` methods that return `Result<_,
//! DomainError>` or the narrower storage/domain error types its callers
//! already know how to convert.

pub mod proficiency;
pub mod question_index;
pub mod scheduled_jobs;
pub mod selection;
pub mod session_coordinator;
pub mod snapshot;
pub mod snapshot_worker;
pub mod spaced_repetition;
pub mod tier;

pub use proficiency::{SubjectRollup, fold_chapter_deltas, plan_chapter_update, rollup_subjects};
pub use question_index::{QuestionIndex, QuestionIndexSnapshot};
pub use scheduled_jobs::{JobReport, ScheduledJobs};
pub use selection::{MockTestTemplate, PlannedQuestion, SelectionOutcome, is_recovery_trigger};
pub use session_coordinator::{SessionCoordinator, SubmitOutcome};
pub use snapshot::SnapshotStore;
pub use snapshot_worker::{RecordCompletion, RecordSweep, SnapshotWorker};
pub use spaced_repetition::SpacedRepetition;
pub use tier::{QuotaGate, QuotaGateError, TierCache};
