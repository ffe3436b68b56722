//! Media rehost: refresh an expired header media URL (spec §4.G).
//!
//! The retry-once-then-escalate orchestration around a `send` call lives
//! in the dispatch loop; this module owns the rehost step itself so every
//! caller shares one implementation.

use std::sync::Arc;

use serde_json::json;
use waba_core::model::mask_phone;
use waba_core::{Error, Result, TraceEmitter};
use waba_provider::ProviderClient;

/// Identifying context stamped on every trace event this module emits.
pub struct RehostContext<'a> {
    pub trace_id: &'a str,
    pub campaign_id: Option<&'a str>,
    pub contact_id: Option<&'a str>,
    pub phone: &'a str,
}

/// Refresh `handle` via `Provider.fetchMedia(handle, {force: true})` and
/// return the new URL. Emits `template_media_rehost_start` then
/// `template_media_rehost_ok` or `template_media_rehost_fail`.
///
/// A provider error other than `media_expired` during the refresh itself
/// escalates to [`Error::PolicyRejected`]: a rehost that cannot even fetch
/// a fresh handle is not worth a second sender-visible retry.
pub async fn rehost(
    provider: &Arc<dyn ProviderClient>,
    handle: &str,
    trace: &Arc<dyn TraceEmitter>,
    ctx: &RehostContext<'_>,
) -> Result<String> {
    emit(trace, ctx, "template_media_rehost_start", true, None);

    match provider.fetch_media(handle, true).await {
        Ok(media) => {
            emit(trace, ctx, "template_media_rehost_ok", true, None);
            Ok(media.url)
        }
        Err(e) => {
            emit(trace, ctx, "template_media_rehost_fail", false, Some(e.to_string()));
            Err(Error::PolicyRejected(format!("media rehost failed: {e}")))
        }
    }
}

fn emit(trace: &Arc<dyn TraceEmitter>, ctx: &RehostContext<'_>, phase: &str, ok: bool, detail: Option<String>) {
    trace.emit(waba_core::model::TraceEvent {
        trace_id: ctx.trace_id.to_string(),
        ts: chrono::Utc::now(),
        campaign_id: ctx.campaign_id.map(str::to_string),
        step: "template_precheck".to_string(),
        phase: phase.to_string(),
        ok,
        ms: None,
        batch_index: None,
        contact_id: ctx.contact_id.map(str::to_string),
        phone_masked: Some(mask_phone(ctx.phone)),
        extra: detail.map(|d| json!({ "detail": d })).unwrap_or(json!({})),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use waba_core::sink::NoopTraceEmitter;
    use waba_provider::{MediaHandle, PhoneProbe, SendOutcome};

    struct FakeProvider {
        fail: bool,
    }

    #[async_trait]
    impl ProviderClient for FakeProvider {
        async fn send(&self, _payload: serde_json::Value) -> Result<SendOutcome> {
            unimplemented!()
        }

        async fn fetch_media(&self, _handle: &str, force: bool) -> Result<MediaHandle> {
            assert!(force, "rehost must always force-refresh");
            if self.fail {
                Err(Error::Auth("token expired".to_string()))
            } else {
                Ok(MediaHandle {
                    url: "https://cdn.example/new".to_string(),
                    expires_at: chrono::Utc::now() + chrono::Duration::minutes(5),
                })
            }
        }

        async fn probe(&self, _phone_number_id: &str) -> Result<PhoneProbe> {
            unimplemented!()
        }
    }

    fn ctx() -> RehostContext<'static> {
        RehostContext {
            trace_id: "trace-1",
            campaign_id: Some("camp1"),
            contact_id: Some("c1"),
            phone: "+5511987654321",
        }
    }

    #[tokio::test]
    async fn rehost_ok_returns_new_url() {
        let provider: Arc<dyn ProviderClient> = Arc::new(FakeProvider { fail: false });
        let trace: Arc<dyn TraceEmitter> = Arc::new(NoopTraceEmitter);
        let url = rehost(&provider, "handle-1", &trace, &ctx()).await.unwrap();
        assert_eq!(url, "https://cdn.example/new");
    }

    #[tokio::test]
    async fn rehost_failure_escalates_to_policy_rejected() {
        let provider: Arc<dyn ProviderClient> = Arc::new(FakeProvider { fail: true });
        let trace: Arc<dyn TraceEmitter> = Arc::new(NoopTraceEmitter);
        let err = rehost(&provider, "handle-1", &trace, &ctx()).await.unwrap_err();
        assert!(matches!(err, Error::PolicyRejected(_)));
    }
}
