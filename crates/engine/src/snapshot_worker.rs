//! Post-commit snapshot dispatch (C10), a `kameo` actor: a small struct
//! holding the state a sequence of messages mutates, with one `Message<T>`
//! impl per operation. Here the "state" is just the `SnapshotStore` handle,
//! and the messages are fire-and-forget write requests so
//! `SessionCoordinator::complete` doesn't block its caller on the snapshot
//! write landing.

use ascent_domain::model::ProficiencyView;
use chrono::{DateTime, Utc};
use kameo::Actor;
use kameo::message::{Context, Message};

use crate::snapshot::SnapshotStore;

#[derive(Actor)]
pub struct SnapshotWorker {
    store: SnapshotStore,
}

impl SnapshotWorker {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }
}

/// Write a per-completion snapshot tagging the quiz's own performance.
pub struct RecordCompletion {
    pub view: ProficiencyView,
    pub session: ascent_domain::session::Session,
    pub period_key: String,
    pub now: DateTime<Utc>,
}

/// Write a standing snapshot with no quiz attached, used by the scheduled
/// weekly sweep.
pub struct RecordSweep {
    pub view: ProficiencyView,
    pub period_key: String,
    pub now: DateTime<Utc>,
}

impl Message<RecordCompletion> for SnapshotWorker {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: RecordCompletion,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if let Err(err) = self
            .store
            .record_completion(&msg.view, &msg.session, msg.period_key, msg.now)
            .await
        {
            tracing::error!(error = %err, user_id = %msg.view.user_id, "snapshot write failed");
        }
    }
}

impl Message<RecordSweep> for SnapshotWorker {
    type Reply = ();

    async fn handle(&mut self, msg: RecordSweep, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if let Err(err) = self.store.record_sweep(&msg.view, msg.period_key, msg.now).await {
            tracing::error!(error = %err, user_id = %msg.view.user_id, "sweep snapshot write failed");
        }
    }
}
