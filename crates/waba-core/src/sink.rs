//! The trace-emitting seam every subsystem writes phase events through
//! (spec §4.H). Kept here, not in `waba-trace`, so every crate can accept
//! `Arc<dyn TraceEmitter>` without depending on the concrete sink.

use std::sync::Arc;

use crate::model::TraceEvent;

/// Fire-and-forget phase event sink. Implementations must never block or
/// fail the caller (spec Design Notes: "Observability must never gate
/// correctness").
pub trait TraceEmitter: Send + Sync {
    fn emit(&self, event: TraceEvent);
}

/// A `TraceEmitter` that discards every event; used where no sink is wired
/// (unit tests, components run without observability configured).
pub struct NoopTraceEmitter;

impl TraceEmitter for NoopTraceEmitter {
    fn emit(&self, _event: TraceEvent) {}
}

/// Build a trace-id-scoped helper that fills in `trace_id`/`ts` for callers
/// emitting several events from the same logical operation.
#[must_use]
pub fn noop() -> Arc<dyn TraceEmitter> {
    Arc::new(NoopTraceEmitter)
}
