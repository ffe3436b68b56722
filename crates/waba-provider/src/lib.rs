//! WhatsApp Business Provider Client (spec §4.A).
//!
//! The only component allowed to interpret raw provider payloads; every
//! other crate branches on [`waba_core::ProviderErrorClass`] alone.

mod classify;
mod http;

pub use classify::classify_status;
pub use http::HttpProviderClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waba_core::{ProviderErrorClass, Result};

/// Outcome of [`ProviderClient::send`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub ok: bool,
    pub provider_message_id: Option<String>,
    pub error_class: ProviderErrorClass,
    pub raw: serde_json::Value,
}

/// Outcome of [`ProviderClient::fetch_media`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaHandle {
    pub url: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of [`ProviderClient::probe`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneProbe {
    pub display_phone: String,
}

/// Normalized send/read calls to the upstream messaging API (spec §4.A).
///
/// Every call carries its own mandatory timeout (≤ 8s, see
/// [`HttpProviderClient::DEFAULT_TIMEOUT`]); implementations must never
/// block past it.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn send(&self, payload: serde_json::Value) -> Result<SendOutcome>;
    async fn fetch_media(&self, handle: &str, force: bool) -> Result<MediaHandle>;
    async fn probe(&self, phone_number_id: &str) -> Result<PhoneProbe>;
}
