//! Storage seam for persisted trace events (spec §4.H, `campaign_trace_events`).
//!
//! Kept separate from [`waba_core::PersistenceGateway`] because the sink's
//! failure mode is different: a missing table disables the sink for the
//! rest of the process instead of propagating to the caller.

use async_trait::async_trait;
use waba_core::model::TraceEvent;
use waba_core::Result;

/// Durable backing store for trace events. `waba-postgres` implements this
/// against `campaign_trace_events`; tests use an in-memory stand-in.
#[async_trait]
pub trait TraceStore: Send + Sync {
    async fn insert(&self, event: &TraceEvent) -> Result<()>;
}
