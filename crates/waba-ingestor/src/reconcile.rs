//! Reconciliation queue (spec §4.F item 2: "enqueue for reconciliation").
//!
//! A status event that arrives before our own send has recorded
//! `campaign_contacts.message_id` cannot be projected yet. Rather than drop
//! it, it is handed to a background worker that retries the lookup a
//! bounded number of times with backoff before giving up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::warn;
use waba_core::{PersistenceGateway, StatusApplyOutcome, StatusEventInput};

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF: Duration = Duration::from_secs(2);

struct PendingEvent {
    event: StatusEventInput,
    attempt: u32,
}

/// Handle held by [`crate::ingestor::ReplyIngestor`] to enqueue a status
/// event whose contact wasn't found yet.
#[derive(Clone)]
pub(crate) struct Reconciler {
    tx: UnboundedSender<PendingEvent>,
}

impl Reconciler {
    pub(crate) fn enqueue(&self, event: StatusEventInput) {
        let _ = self.tx.send(PendingEvent { event, attempt: 1 });
    }
}

/// Spawn the retry worker.
pub(crate) fn spawn(gateway: Arc<dyn PersistenceGateway>) -> Reconciler {
    let (tx, mut rx) = unbounded_channel::<PendingEvent>();
    let worker_tx = tx.clone();

    tokio::spawn(async move {
        while let Some(pending) = rx.recv().await {
            let gateway = gateway.clone();
            let worker_tx = worker_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(BACKOFF).await;
                retry(&gateway, &worker_tx, pending).await;
            });
        }
    });

    Reconciler { tx }
}

async fn retry(gateway: &Arc<dyn PersistenceGateway>, worker_tx: &UnboundedSender<PendingEvent>, pending: PendingEvent) {
    match gateway.apply_status_event(pending.event.clone()).await {
        Ok(StatusApplyOutcome::NoMatchingContact) if pending.attempt < MAX_ATTEMPTS => {
            let _ = worker_tx.send(PendingEvent {
                event: pending.event,
                attempt: pending.attempt + 1,
            });
        }
        Ok(StatusApplyOutcome::NoMatchingContact) => {
            warn!(
                message_id = %pending.event.message_id,
                attempts = pending.attempt,
                "reconciliation exhausted: no matching contact ever appeared"
            );
        }
        Ok(_) => {}
        Err(e) => {
            warn!(message_id = %pending.event.message_id, error = %e, "reconciliation retry failed");
        }
    }
}
