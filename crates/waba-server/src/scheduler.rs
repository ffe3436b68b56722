//! Scheduler clock (spec §4.E "Lifecycle"): materializes `Scheduled`
//! campaigns whose `scheduled_at` has elapsed, then drives each to
//! completion.

use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::state::AppState;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

pub fn spawn(state: AppState) {
    tokio::spawn(async move {
        loop {
            match state.dispatcher.materialize_scheduled(Utc::now()).await {
                Ok(materialized) => {
                    for campaign_id in materialized {
                        let dispatcher = state.dispatcher.clone();
                        tokio::spawn(async move {
                            if let Err(e) = dispatcher.run_campaign(&campaign_id).await {
                                warn!(campaign_id, error = %e, "campaign run failed");
                            }
                        });
                    }
                }
                Err(e) => warn!(error = %e, "scheduler materialize sweep failed"),
            }
            tokio::time::sleep(TICK_INTERVAL).await;
        }
    });
}
