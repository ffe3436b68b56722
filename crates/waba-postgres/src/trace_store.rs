//! `waba_trace::TraceStore` backed by `campaign_trace_events` (spec §4.H).

use async_trait::async_trait;

use waba_core::model::TraceEvent;
use waba_core::Result;
use waba_trace::TraceStore;

use crate::error::from_postgres;
use crate::gateway::PostgresGateway;

#[async_trait]
impl TraceStore for PostgresGateway {
    async fn insert(&self, event: &TraceEvent) -> Result<()> {
        self.client()
            .execute(
                "INSERT INTO campaign_trace_events
                     (trace_id, ts, campaign_id, step, phase, ok, ms, batch_index, contact_id,
                      phone_masked, extra)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (trace_id) DO NOTHING",
                &[
                    &event.trace_id,
                    &event.ts,
                    &event.campaign_id,
                    &event.step,
                    &event.phase,
                    &event.ok,
                    &event.ms.map(|v| v as i64),
                    &event.batch_index.map(|v| v as i64),
                    &event.contact_id,
                    &event.phone_masked,
                    &event.extra,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "campaign_trace_events"))?;
        Ok(())
    }
}
