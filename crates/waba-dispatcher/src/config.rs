//! Campaign Dispatcher static configuration (spec §4.E).

use serde::{Deserialize, Serialize};
use waba_core::{settings, PersistenceGateway, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherConfig {
    pub batch_size: u32,
    pub send_concurrency: u32,
    /// Bound on `rate_limited` requeues before a row is failed outright
    /// (spec §9 Open Question: bounded, configurable, default 3).
    pub max_rate_limited_retries: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            send_concurrency: 4,
            max_rate_limited_retries: 3,
        }
    }
}

/// Load the dispatcher config from settings, falling back to the default.
pub async fn load_config(gateway: &dyn PersistenceGateway) -> Result<DispatcherConfig> {
    match gateway.get_setting(settings::DISPATCHER_CONFIG).await? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(DispatcherConfig::default()),
    }
}
