//! Concrete `TraceEmitter` (spec §4.H).
//!
//! Persists a curated high-signal phase set by default; the `WABA_TRACE_ALL`
//! environment variable widens persistence to every phase during
//! investigations. Structured logs via `tracing` are always emitted
//! regardless of the curated set or the sink's persistence state, so an
//! operator never loses visibility when the backing table disappears.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, warn};
use waba_core::model::TraceEvent;
use waba_core::TraceEmitter;

use crate::store::TraceStore;

/// Phases persisted by default: run boundaries, batch boundaries, send
/// outcomes, rehost outcomes, webhook effects, and completion
/// (spec §4.H, verbatim).
const CURATED_PHASES: &[&str] = &[
    "workflow_run_start",
    "campaign_dispatch_batch_claimed",
    "meta_send_ok",
    "meta_send_fail",
    "template_media_rehost_start",
    "template_media_rehost_ok",
    "template_media_rehost_fail",
    "webhook_failed_details",
    "campaign_completed",
];

/// Environment flag that widens persistence to every phase.
pub const WIDEN_ENV_VAR: &str = "WABA_TRACE_ALL";

pub struct TraceSink {
    tx: Option<UnboundedSender<TraceEvent>>,
    widen: bool,
}

impl TraceSink {
    /// Build a sink with no backing store: every event is logged, none
    /// persisted. Used where no trace table is configured.
    #[must_use]
    pub fn logging_only() -> Self {
        Self { tx: None, widen: widen_from_env() }
    }

    /// Build a sink backed by `store`, spawning a background task that
    /// drains events and self-disables on `Error::MissingTable`
    /// (spec §4.H "falls back to structured logs only").
    pub fn persistent(store: Arc<dyn TraceStore>) -> Self {
        let (tx, mut rx) = unbounded_channel::<TraceEvent>();
        let disabled = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if disabled.load(Ordering::Relaxed) {
                    continue;
                }
                if let Err(e) = store.insert(&event).await {
                    if e.is_degradable() {
                        warn!(error = %e, "trace sink disabling persistence: backing table missing");
                        disabled.store(true, Ordering::Relaxed);
                    } else {
                        warn!(error = %e, "trace sink failed to persist event");
                    }
                }
            }
        });

        Self { tx: Some(tx), widen: widen_from_env() }
    }
}

fn widen_from_env() -> bool {
    std::env::var(WIDEN_ENV_VAR).is_ok_and(|v| v != "0" && !v.is_empty())
}

impl TraceEmitter for TraceSink {
    fn emit(&self, event: TraceEvent) {
        debug!(
            phase = %event.phase,
            step = %event.step,
            ok = event.ok,
            campaign_id = ?event.campaign_id,
            "trace event"
        );

        if !self.widen && !CURATED_PHASES.contains(&event.phase.as_str()) {
            return;
        }
        if let Some(tx) = &self.tx {
            // Fire-and-forget: observability must never gate correctness
            // (spec Design Notes). A closed receiver just drops the event.
            let _ = tx.send(event);
        }
    }
}
