//! Startup reaper (spec §5 "process shutdown"; see `SPEC_FULL.md`
//! supplement): returns `sending` rows stuck past `sending_timeout` to
//! `pending` so a dispatcher restart picks them back up.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::state::AppState;

const SENDING_TIMEOUT: chrono::Duration = chrono::Duration::minutes(10);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub fn spawn(state: AppState) {
    tokio::spawn(async move {
        loop {
            let cutoff = Utc::now() - SENDING_TIMEOUT;
            match state.gateway.reap_stale_sending(cutoff).await {
                Ok(reaped) if !reaped.is_empty() => {
                    info!(count = reaped.len(), "reaped stale sending rows");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "reap sweep failed"),
            }
            tokio::time::sleep(SWEEP_INTERVAL).await;
        }
    });
}
