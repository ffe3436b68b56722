//! Turbo: the adaptive per-sender rate controller (spec §4.C).
//!
//! One [`TurboController`] is shared across every dispatch worker of a
//! process. Per-sender state lives in a [`dashmap::DashMap`] guarded
//! entry-by-entry with `parking_lot::Mutex` (spec Design Notes:
//! "keep them in a dedicated in-process registry guarded by a mutex") and
//! is mirrored to the settings store after every mutation so restarts
//! resume from the last persisted target, not `startMps`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use waba_core::{settings, PersistenceGateway, Result};

/// Static Turbo configuration (spec §4.C "Configuration").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurboConfig {
    pub enabled: bool,
    pub send_concurrency: u32,
    pub batch_size: u32,
    pub start_mps: f64,
    pub max_mps: f64,
    pub min_mps: f64,
    pub cooldown_sec: u64,
    pub min_increase_gap_sec: u64,
    pub send_floor_delay_ms: u64,
}

impl Default for TurboConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            send_concurrency: 4,
            batch_size: 50,
            start_mps: 10.0,
            max_mps: 40.0,
            min_mps: 5.0,
            cooldown_sec: 30,
            min_increase_gap_sec: 10,
            send_floor_delay_ms: 0,
        }
    }
}

/// Per-sender runtime state, persisted verbatim at `turbo.state.<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TurboState {
    target_mps: f64,
    last_emit_at: Option<DateTime<Utc>>,
    last_increase_at: Option<DateTime<Utc>>,
    last_decrease_at: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
}

impl TurboState {
    fn fresh(start_mps: f64) -> Self {
        Self {
            target_mps: start_mps,
            last_emit_at: None,
            last_increase_at: None,
            last_decrease_at: None,
            cooldown_until: None,
        }
    }
}

/// The adaptive rate controller for one process.
pub struct TurboController {
    gateway: Arc<dyn PersistenceGateway>,
    senders: DashMap<String, Arc<Mutex<TurboState>>>,
}

impl TurboController {
    #[must_use]
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            senders: DashMap::new(),
        }
    }

    /// Load the static config from settings, falling back to the default.
    pub async fn config(&self) -> Result<TurboConfig> {
        match self.gateway.get_setting(settings::TURBO_CONFIG).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(TurboConfig::default()),
        }
    }

    async fn state_for(&self, phone_number_id: &str, config: &TurboConfig) -> Result<Arc<Mutex<TurboState>>> {
        if let Some(existing) = self.senders.get(phone_number_id) {
            return Ok(existing.clone());
        }
        let key = settings::turbo_state_key(phone_number_id);
        let loaded = match self.gateway.get_setting(&key).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|_| TurboState::fresh(config.start_mps)),
            None => TurboState::fresh(config.start_mps),
        };
        let state = Arc::new(Mutex::new(loaded));
        self.senders
            .insert(phone_number_id.to_string(), state.clone());
        Ok(state)
    }

    async fn persist(&self, phone_number_id: &str, state: &TurboState) -> Result<()> {
        let key = settings::turbo_state_key(phone_number_id);
        self.gateway
            .put_setting(&key, serde_json::to_value(state)?)
            .await
    }

    /// Block until this call may emit one message (token-bucket, capacity 1).
    pub async fn acquire(&self, phone_number_id: &str) -> Result<()> {
        let config = self.config().await?;
        let state = self.state_for(phone_number_id, &config).await?;

        let wait = {
            let guard = state.lock();
            let interval = Duration::from_secs_f64(1.0 / guard.target_mps.max(f64::MIN_POSITIVE));
            match guard.last_emit_at {
                Some(last) => {
                    let elapsed = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
                    interval.saturating_sub(elapsed)
                }
                None => Duration::ZERO,
            }
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        state.lock().last_emit_at = Some(Utc::now());
        Ok(())
    }

    /// Report a successful send; additive-increase `target_mps` by 1 when
    /// the increase gap has elapsed and the sender is not cooling down.
    pub async fn report_ok(&self, phone_number_id: &str) -> Result<()> {
        let config = self.config().await?;
        let state = self.state_for(phone_number_id, &config).await?;
        let snapshot = {
            let mut guard = state.lock();
            let now = Utc::now();
            let in_cooldown = guard.cooldown_until.is_some_and(|until| now < until);
            let gap_elapsed = guard.last_increase_at.map_or(true, |last| {
                (now - last).num_seconds() as u64 >= config.min_increase_gap_sec
            });
            if !in_cooldown && gap_elapsed && guard.target_mps < config.max_mps {
                guard.target_mps = (guard.target_mps + 1.0).min(config.max_mps);
                guard.last_increase_at = Some(now);
            }
            guard.clone()
        };
        debug!(phone_number_id, target_mps = snapshot.target_mps, "turbo ok");
        self.persist(phone_number_id, &snapshot).await
    }

    /// Report a `rate_limited` classification; halve `target_mps` (floor
    /// `minMps`) and open a cooldown window.
    pub async fn report_rate_limited(&self, phone_number_id: &str) -> Result<()> {
        let config = self.config().await?;
        let state = self.state_for(phone_number_id, &config).await?;
        let snapshot = {
            let mut guard = state.lock();
            let now = Utc::now();
            guard.target_mps = (guard.target_mps / 2.0).max(config.min_mps);
            guard.cooldown_until = Some(now + chrono::Duration::seconds(config.cooldown_sec as i64));
            guard.last_decrease_at = Some(now);
            guard.clone()
        };
        info!(phone_number_id, target_mps = snapshot.target_mps, "turbo rate_limited");
        self.persist(phone_number_id, &snapshot).await
    }

    /// Restore `target_mps = startMps` and clear cooldown/increase bookkeeping.
    pub async fn reset_state(&self, phone_number_id: &str) -> Result<()> {
        let config = self.config().await?;
        let fresh = TurboState::fresh(config.start_mps);
        self.senders
            .insert(phone_number_id.to_string(), Arc::new(Mutex::new(fresh.clone())));
        self.persist(phone_number_id, &fresh).await
    }

    /// Current target MPS for a sender, for status endpoints and tests.
    pub async fn current_mps(&self, phone_number_id: &str) -> Result<f64> {
        let config = self.config().await?;
        let state = self.state_for(phone_number_id, &config).await?;
        let target_mps = state.lock().target_mps;
        Ok(target_mps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waba_core::MemoryGateway;

    fn controller() -> TurboController {
        TurboController::new(Arc::new(MemoryGateway::new()))
    }

    #[tokio::test]
    async fn starts_at_configured_start_mps() {
        let ctl = controller();
        ctl.gateway
            .put_setting(
                settings::TURBO_CONFIG,
                serde_json::to_value(TurboConfig {
                    start_mps: 10.0,
                    ..TurboConfig::default()
                })
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ctl.current_mps("pn1").await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn rate_limited_halves_and_floors_at_min_mps() {
        let ctl = controller();
        ctl.gateway
            .put_setting(
                settings::TURBO_CONFIG,
                serde_json::to_value(TurboConfig {
                    start_mps: 10.0,
                    min_mps: 5.0,
                    ..TurboConfig::default()
                })
                .unwrap(),
            )
            .await
            .unwrap();
        ctl.report_rate_limited("pn1").await.unwrap();
        assert_eq!(ctl.current_mps("pn1").await.unwrap(), 5.0);
        // Halving again must floor at min_mps, not go to 2.5.
        ctl.report_rate_limited("pn1").await.unwrap();
        assert_eq!(ctl.current_mps("pn1").await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn ok_does_not_raise_during_cooldown() {
        let ctl = controller();
        ctl.gateway
            .put_setting(
                settings::TURBO_CONFIG,
                serde_json::to_value(TurboConfig {
                    start_mps: 10.0,
                    min_mps: 5.0,
                    cooldown_sec: 3600,
                    min_increase_gap_sec: 0,
                    ..TurboConfig::default()
                })
                .unwrap(),
            )
            .await
            .unwrap();
        ctl.report_rate_limited("pn1").await.unwrap();
        assert_eq!(ctl.current_mps("pn1").await.unwrap(), 5.0);
        ctl.report_ok("pn1").await.unwrap();
        assert_eq!(ctl.current_mps("pn1").await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn ok_raises_by_one_once_gap_elapsed() {
        let ctl = controller();
        ctl.gateway
            .put_setting(
                settings::TURBO_CONFIG,
                serde_json::to_value(TurboConfig {
                    start_mps: 10.0,
                    max_mps: 40.0,
                    min_increase_gap_sec: 0,
                    cooldown_sec: 0,
                    ..TurboConfig::default()
                })
                .unwrap(),
            )
            .await
            .unwrap();
        ctl.report_ok("pn1").await.unwrap();
        assert_eq!(ctl.current_mps("pn1").await.unwrap(), 11.0);
    }

    #[tokio::test]
    async fn target_never_exceeds_max_mps() {
        let ctl = controller();
        ctl.gateway
            .put_setting(
                settings::TURBO_CONFIG,
                serde_json::to_value(TurboConfig {
                    start_mps: 39.5,
                    max_mps: 40.0,
                    min_increase_gap_sec: 0,
                    cooldown_sec: 0,
                    ..TurboConfig::default()
                })
                .unwrap(),
            )
            .await
            .unwrap();
        ctl.report_ok("pn1").await.unwrap();
        ctl.report_ok("pn1").await.unwrap();
        assert_eq!(ctl.current_mps("pn1").await.unwrap(), 40.0);
    }

    #[tokio::test]
    async fn reset_state_restores_start_mps() {
        let ctl = controller();
        ctl.gateway
            .put_setting(
                settings::TURBO_CONFIG,
                serde_json::to_value(TurboConfig {
                    start_mps: 10.0,
                    min_mps: 5.0,
                    ..TurboConfig::default()
                })
                .unwrap(),
            )
            .await
            .unwrap();
        ctl.report_rate_limited("pn1").await.unwrap();
        assert_eq!(ctl.current_mps("pn1").await.unwrap(), 5.0);
        ctl.reset_state("pn1").await.unwrap();
        assert_eq!(ctl.current_mps("pn1").await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn acquire_spaces_emissions_by_one_over_target() {
        let ctl = controller();
        ctl.gateway
            .put_setting(
                settings::TURBO_CONFIG,
                serde_json::to_value(TurboConfig {
                    start_mps: 20.0,
                    ..TurboConfig::default()
                })
                .unwrap(),
            )
            .await
            .unwrap();
        let start = std::time::Instant::now();
        ctl.acquire("pn1").await.unwrap();
        ctl.acquire("pn1").await.unwrap();
        // Second acquire must wait at least ~1/20s = 50ms.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
