//! reqwest-backed [`ProviderClient`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};
use waba_core::{Error, Result};

use crate::classify::classify_status;
use crate::{MediaHandle, PhoneProbe, ProviderClient, SendOutcome};

/// WhatsApp Business Cloud API client.
pub struct HttpProviderClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpProviderClient {
    /// Mandatory per-call timeout (spec §4.A: "Timeouts are mandatory (≤ 8s)").
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

    /// Build a client against the given API base URL (e.g.
    /// `https://graph.facebook.com/v19.0`) using a long-lived access token.
    ///
    /// # Errors
    /// Returns `Error::Internal` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            access_token: access_token.into(),
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn send(&self, payload: serde_json::Value) -> Result<SendOutcome> {
        let url = format!("{}/messages", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        let status = resp.status().as_u16();
        let body: serde_json::Value = resp.json().await.unwrap_or(json!({}));
        let class = classify_status(status, Some(&body));
        debug!(status, ?class, "provider send classified");

        let provider_message_id = body
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(SendOutcome {
            ok: matches!(class, waba_core::ProviderErrorClass::Ok),
            provider_message_id,
            error_class: class,
            raw: body,
        })
    }

    async fn fetch_media(&self, handle: &str, force: bool) -> Result<MediaHandle> {
        let url = format!("{}/{handle}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("force", force.to_string())])
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        let status = resp.status().as_u16();
        let body: serde_json::Value = resp.json().await.unwrap_or(json!({}));
        if let Some(err) = classify_status(status, Some(&body)).into_error(body.to_string()) {
            warn!(status, handle, "fetch_media failed");
            return Err(err);
        }

        let url = body
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Permanent("fetch_media response missing url".to_string()))?
            .to_string();
        // The Cloud API expires media URLs after five minutes; in the
        // absence of an explicit field this is the conservative bound
        // used to drive the rehost preventive-prepare pass (spec §4.G).
        let expires_at = chrono::Utc::now() + chrono::Duration::minutes(5);

        Ok(MediaHandle { url, expires_at })
    }

    async fn probe(&self, phone_number_id: &str) -> Result<PhoneProbe> {
        let url = format!("{}/{phone_number_id}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        let status = resp.status().as_u16();
        let body: serde_json::Value = resp.json().await.unwrap_or(json!({}));
        if let Some(err) = classify_status(status, Some(&body)).into_error(body.to_string()) {
            return Err(err);
        }

        let display_phone = body
            .get("display_phone_number")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(PhoneProbe { display_phone })
    }
}
