//! The Campaign Dispatcher's claim/precheck/fan-out/rehost loop (spec §4.E).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{info, warn};
use waba_core::model::{mask_phone, Campaign, CampaignContact, CampaignStatus, ContactStatus, Template, TraceEvent};
use waba_core::{ids, ContactOutcome, Error, PersistenceGateway, Result, TraceEmitter};
use waba_precheck::{precheck_contact, rehost, resolve_binding, RehostContext};
use waba_provider::{ProviderClient, SendOutcome};
use waba_turbo::TurboController;

use crate::config::load_config;
use crate::payload::{build_template_payload, HeaderMediaRef};

/// Outcome of a cancel request (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled { skipped: u64 },
    AlreadyCancelled,
}

/// Fans out one campaign's pending rows against the Rate Controller and the
/// Provider Client.
pub struct CampaignDispatcher {
    gateway: Arc<dyn PersistenceGateway>,
    provider: Arc<dyn ProviderClient>,
    turbo: Arc<TurboController>,
    trace: Arc<dyn TraceEmitter>,
}

impl CampaignDispatcher {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        provider: Arc<dyn ProviderClient>,
        turbo: Arc<TurboController>,
        trace: Arc<dyn TraceEmitter>,
    ) -> Self {
        Self { gateway, provider, turbo, trace }
    }

    /// Cancel a `sending`/`paused` campaign (spec §4.E "Cancellation").
    /// Idempotent on an already-cancelled campaign; conflicts on any other
    /// terminal status.
    pub async fn cancel_campaign(&self, campaign_id: &str) -> Result<CancelOutcome> {
        let mut campaign = self
            .gateway
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaigns/{campaign_id}")))?;

        if campaign.status == CampaignStatus::Cancelled {
            return Ok(CancelOutcome::AlreadyCancelled);
        }
        if campaign.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "campaign {campaign_id} is already terminal"
            )));
        }

        campaign.status = CampaignStatus::Cancelled;
        campaign.cancelled_at = Some(Utc::now());
        campaign.scheduled_at = None;
        self.gateway.put_campaign(campaign).await?;

        let skipped = self.gateway.skip_all_pending(campaign_id, "cancelled").await?;
        Ok(CancelOutcome::Cancelled { skipped })
    }

    /// Materialize every `Scheduled` campaign whose `scheduled_at` has
    /// elapsed into `Sending`, stamping `first_dispatch_at` (spec §4.E
    /// "Lifecycle": "only this transition may mutate `first_dispatch_at`").
    pub async fn materialize_scheduled(&self, now: chrono::DateTime<Utc>) -> Result<Vec<String>> {
        let mut materialized = Vec::new();
        for mut campaign in self.gateway.list_campaigns_by_status(CampaignStatus::Scheduled).await? {
            if campaign.scheduled_at.is_some_and(|at| at <= now) {
                campaign.status = CampaignStatus::Sending;
                campaign.started_at = Some(now);
                campaign.first_dispatch_at = Some(now);
                materialized.push(campaign.id.clone());
                self.gateway.put_campaign(campaign).await?;
            }
        }
        Ok(materialized)
    }

    /// Drive one campaign to completion: repeatedly claims and processes
    /// batches while the campaign remains `Sending` and pending rows exist.
    pub async fn run_campaign(&self, campaign_id: &str) -> Result<()> {
        loop {
            let campaign = self
                .gateway
                .get_campaign(campaign_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("campaigns/{campaign_id}")))?;
            if campaign.status != CampaignStatus::Sending {
                return Ok(());
            }

            let progressed = self.dispatch_batch(&campaign).await?;
            if !progressed {
                self.maybe_complete(campaign_id).await?;
                return Ok(());
            }
        }
    }

    /// Claim, precheck, and fan out exactly one batch. Returns `false` when
    /// there was nothing to claim (caller decides whether that means the
    /// campaign is done or merely mid-flight elsewhere).
    async fn dispatch_batch(&self, campaign: &Campaign) -> Result<bool> {
        let config = load_config(self.gateway.as_ref()).await?;
        let claimed = self.gateway.claim_pending(&campaign.id, config.batch_size).await?;
        if claimed.is_empty() {
            return Ok(false);
        }
        self.emit_campaign(
            &campaign.id,
            "campaign_dispatch_batch_claimed",
            true,
            None,
            json!({ "claimed": claimed.len() }),
        );

        let template = self
            .gateway
            .get_template(&campaign.template_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("templates/{}", campaign.template_name)))?;

        let mut sendable = Vec::new();
        for row in claimed {
            let result = precheck_contact(&row, &template, &campaign.template_variables);
            if result.ok {
                let normalized = result.normalized_phone.expect("ok precheck carries a normalized phone");
                sendable.push((row, normalized));
            } else {
                self.gateway
                    .mark_contact_result(
                        &row.id,
                        ContactOutcome::skipped(
                            result.skip_code.unwrap_or_else(|| "precheck_failed".to_string()),
                            result.reason.unwrap_or_default(),
                        ),
                    )
                    .await?;
            }
        }

        let concurrency = config.send_concurrency.max(1) as usize;
        futures::stream::iter(sendable)
            .for_each_concurrent(concurrency, |(row, phone)| {
                let this = self;
                let campaign = campaign.clone();
                let template = template.clone();
                let max_retries = config.max_rate_limited_retries;
                async move {
                    if let Err(e) = this.send_one(&campaign, &template, row, phone, max_retries).await {
                        warn!(campaign_id = %campaign.id, error = %e, "dispatch worker failed");
                    }
                }
            })
            .await;

        Ok(true)
    }

    async fn maybe_complete(&self, campaign_id: &str) -> Result<()> {
        let contacts = self.gateway.get_contacts(campaign_id).await?;
        let still_active = contacts
            .iter()
            .any(|c| matches!(c.status, ContactStatus::Pending | ContactStatus::Sending));
        if still_active {
            return Ok(());
        }
        let Some(mut campaign) = self.gateway.get_campaign(campaign_id).await? else {
            return Ok(());
        };
        if campaign.status != CampaignStatus::Sending {
            return Ok(());
        }
        campaign.status = CampaignStatus::Completed;
        campaign.completed_at = Some(Utc::now());
        self.gateway.put_campaign(campaign).await?;
        info!(campaign_id, "campaign completed");
        self.emit_campaign(campaign_id, "campaign_completed", true, None, json!({}));
        Ok(())
    }

    async fn send_one(
        &self,
        campaign: &Campaign,
        template: &Template,
        row: CampaignContact,
        normalized_phone: String,
        max_retries: u32,
    ) -> Result<()> {
        self.turbo.acquire(&campaign.phone_number_id).await?;

        let resolved = resolve_all(template, &campaign.template_variables, &row);
        let header_ref = template
            .header_media()
            .and_then(|c| c.header_media_handle.clone())
            .map(HeaderMediaRef::Handle);
        let payload = build_template_payload(&normalized_phone, template, &resolved, header_ref.as_ref());

        match self.provider.send(payload).await {
            Ok(outcome) if outcome.ok => {
                self.apply_sent(campaign, &row, &outcome).await?;
            }
            Ok(outcome) => {
                self.handle_classified(
                    campaign,
                    template,
                    &row,
                    &normalized_phone,
                    &resolved,
                    outcome.error_class,
                    max_retries,
                )
                .await?;
            }
            Err(e) => {
                self.emit(campaign, &row, "meta_send_fail", false, Some(e.to_string()));
                self.gateway
                    .mark_contact_result(&row.id, ContactOutcome::failed(e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn apply_sent(&self, campaign: &Campaign, row: &CampaignContact, outcome: &SendOutcome) -> Result<()> {
        self.turbo.report_ok(&campaign.phone_number_id).await?;
        self.gateway
            .mark_contact_result(
                &row.id,
                ContactOutcome::sent(outcome.provider_message_id.clone().unwrap_or_default(), Utc::now()),
            )
            .await?;
        self.emit(campaign, row, "meta_send_ok", true, None);
        Ok(())
    }

    async fn handle_classified(
        &self,
        campaign: &Campaign,
        template: &Template,
        row: &CampaignContact,
        normalized_phone: &str,
        resolved: &HashMap<String, Value>,
        class: waba_core::ProviderErrorClass,
        max_retries: u32,
    ) -> Result<()> {
        use waba_core::ProviderErrorClass as C;
        match class {
            C::Ok => unreachable!("Ok is handled by the caller before classification"),
            C::RateLimited => {
                self.turbo.report_rate_limited(&campaign.phone_number_id).await?;
                self.emit(campaign, row, "meta_send_fail", false, Some("rate_limited".to_string()));
                let requeued = self.gateway.requeue_rate_limited(&row.id, max_retries).await?;
                if !requeued {
                    self.gateway
                        .mark_contact_result(&row.id, ContactOutcome::failed("rate_limited"))
                        .await?;
                }
            }
            C::MediaExpired => {
                self.retry_with_rehost(campaign, template, row, normalized_phone, resolved).await?;
            }
            other => {
                self.emit(campaign, row, "meta_send_fail", false, Some(format!("{other:?}")));
                self.gateway
                    .mark_contact_result(&row.id, ContactOutcome::failed(format!("{other:?}")))
                    .await?;
            }
        }
        Ok(())
    }

    async fn retry_with_rehost(
        &self,
        campaign: &Campaign,
        template: &Template,
        row: &CampaignContact,
        normalized_phone: &str,
        resolved: &HashMap<String, Value>,
    ) -> Result<()> {
        let handle = template
            .header_media()
            .and_then(|c| c.header_media_handle.clone());
        let Some(handle) = handle else {
            // media_expired with no header media component: nothing to
            // rehost, fail outright.
            self.gateway
                .mark_contact_result(&row.id, ContactOutcome::failed("media_expired"))
                .await?;
            return Ok(());
        };

        let ctx = RehostContext {
            trace_id: &row.id,
            campaign_id: Some(&campaign.id),
            contact_id: Some(&row.contact_id),
            phone: normalized_phone,
        };

        let new_url = match rehost(&self.provider, &handle, &self.trace, &ctx).await {
            Ok(url) => url,
            Err(e) => {
                // `rehost` already escalated to `policy_rejected`.
                self.gateway
                    .mark_contact_result(&row.id, ContactOutcome::failed(e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        let media = HeaderMediaRef::Url(new_url);
        let payload = build_template_payload(normalized_phone, template, resolved, Some(&media));

        match self.provider.send(payload).await {
            Ok(outcome) if outcome.ok => {
                self.apply_sent(campaign, row, &outcome).await?;
            }
            Ok(outcome) if outcome.error_class == waba_core::ProviderErrorClass::MediaExpired => {
                // spec §4.G item 4: second attempt still expired, escalate
                // to policy_rejected and stop (do not loop).
                self.emit(campaign, row, "meta_send_fail", false, Some("media_expired_after_rehost".to_string()));
                self.gateway
                    .mark_contact_result(
                        &row.id,
                        ContactOutcome::failed("policy_rejected: media still expired after rehost"),
                    )
                    .await?;
            }
            Ok(outcome) => {
                self.gateway
                    .mark_contact_result(&row.id, ContactOutcome::failed(format!("{:?}", outcome.error_class)))
                    .await?;
            }
            Err(e) => {
                self.gateway
                    .mark_contact_result(&row.id, ContactOutcome::failed(e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    fn emit(&self, campaign: &Campaign, row: &CampaignContact, phase: &str, ok: bool, detail: Option<String>) {
        self.trace.emit(TraceEvent {
            trace_id: row.id.clone(),
            ts: Utc::now(),
            campaign_id: Some(campaign.id.clone()),
            step: "campaign_dispatch".to_string(),
            phase: phase.to_string(),
            ok,
            ms: None,
            batch_index: None,
            contact_id: Some(row.contact_id.clone()),
            phone_masked: Some(mask_phone(&row.phone)),
            extra: detail.map(|d| json!({ "detail": d })).unwrap_or(json!({})),
        });
    }

    /// Batch-boundary / completion events (spec §4.H "batch boundaries ...
    /// and completion") that have no single contact row to anchor on.
    fn emit_campaign(&self, campaign_id: &str, phase: &str, ok: bool, batch_index: Option<u64>, extra: Value) {
        self.trace.emit(TraceEvent {
            trace_id: ids::new_id(),
            ts: Utc::now(),
            campaign_id: Some(campaign_id.to_string()),
            step: "campaign_dispatch".to_string(),
            phase: phase.to_string(),
            ok,
            ms: None,
            batch_index,
            contact_id: None,
            phone_masked: None,
            extra,
        });
    }
}

fn resolve_all(template: &Template, bindings: &Value, contact: &CampaignContact) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    for variable in template.required_variables() {
        if let Some(value) = resolve_binding(&variable.key, bindings, contact) {
            map.insert(variable.key.clone(), value);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use crate::config::DispatcherConfig;
    use waba_core::model::{ComponentKind, ParameterFormat, TemplateComponent, TemplateVariable};
    use waba_core::sink::NoopTraceEmitter;
    use waba_core::MemoryGateway;
    use waba_provider::{MediaHandle, PhoneProbe};

    struct ScriptedProvider {
        sends: StdMutex<Vec<Result<SendOutcome>>>,
        media: StdMutex<Vec<Result<MediaHandle>>>,
    }

    impl ScriptedProvider {
        fn new(sends: Vec<Result<SendOutcome>>) -> Self {
            Self { sends: StdMutex::new(sends), media: StdMutex::new(Vec::new()) }
        }

        fn with_media(mut self, media: Vec<Result<MediaHandle>>) -> Self {
            self.media = StdMutex::new(media);
            self
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedProvider {
        async fn send(&self, _payload: Value) -> Result<SendOutcome> {
            let mut queue = self.sends.lock().unwrap();
            if queue.is_empty() {
                panic!("ScriptedProvider ran out of scripted sends");
            }
            queue.remove(0)
        }

        async fn fetch_media(&self, _handle: &str, _force: bool) -> Result<MediaHandle> {
            let mut queue = self.media.lock().unwrap();
            if queue.is_empty() {
                panic!("ScriptedProvider ran out of scripted media fetches");
            }
            queue.remove(0)
        }

        async fn probe(&self, _phone_number_id: &str) -> Result<PhoneProbe> {
            unimplemented!()
        }
    }

    fn ok_outcome(id: &str) -> Result<SendOutcome> {
        Ok(SendOutcome {
            ok: true,
            provider_message_id: Some(id.to_string()),
            error_class: waba_core::ProviderErrorClass::Ok,
            raw: json!({}),
        })
    }

    fn classified(class: waba_core::ProviderErrorClass) -> Result<SendOutcome> {
        Ok(SendOutcome { ok: false, provider_message_id: None, error_class: class, raw: json!({}) })
    }

    fn plain_template() -> Template {
        Template {
            name: "welcome".to_string(),
            language: "pt_BR".to_string(),
            category: "MARKETING".to_string(),
            parameter_format: ParameterFormat::Named,
            components: vec![TemplateComponent {
                kind: ComponentKind::Body,
                header_media: None,
                header_media_handle: None,
                variables: vec![TemplateVariable { key: "nome".to_string() }],
            }],
        }
    }

    fn media_template() -> Template {
        Template {
            name: "promo".to_string(),
            language: "pt_BR".to_string(),
            category: "MARKETING".to_string(),
            parameter_format: ParameterFormat::Named,
            components: vec![TemplateComponent {
                kind: ComponentKind::Header,
                header_media: Some(waba_core::model::HeaderMediaKind::Image),
                header_media_handle: Some("handle-1".to_string()),
                variables: vec![],
            }],
        }
    }

    fn row(id: &str) -> CampaignContact {
        CampaignContact {
            id: id.to_string(),
            campaign_id: "camp1".to_string(),
            contact_id: format!("{id}-contact"),
            phone: "+5511987654321".to_string(),
            name: "Ana".to_string(),
            email: String::new(),
            custom_fields: json!({}),
            status: waba_core::model::ContactStatus::Pending,
            message_id: None,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            skipped_at: None,
            skip_code: None,
            skip_reason: None,
            error: None,
            rate_limited_retries: 0,
            reaper_retries: 0,
        }
    }

    async fn setup(template: Template, template_variables: Value) -> (Arc<MemoryGateway>, Campaign) {
        let gw = Arc::new(MemoryGateway::new());
        gw.put_template(template.clone()).await.unwrap();
        let campaign = Campaign {
            id: "camp1".to_string(),
            name: "welcome".to_string(),
            template_name: template.name.clone(),
            phone_number_id: "pn1".to_string(),
            status: CampaignStatus::Sending,
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            first_dispatch_at: None,
            last_sent_at: None,
            completed_at: None,
            cancelled_at: None,
            template_variables,
        };
        gw.put_campaign(campaign.clone()).await.unwrap();
        (gw, campaign)
    }

    fn dispatcher(gw: Arc<MemoryGateway>, provider: ScriptedProvider) -> CampaignDispatcher {
        let gateway: Arc<dyn PersistenceGateway> = gw.clone();
        CampaignDispatcher::new(
            gateway.clone(),
            Arc::new(provider),
            Arc::new(TurboController::new(gateway)),
            Arc::new(NoopTraceEmitter),
        )
    }

    #[tokio::test]
    async fn successful_send_marks_row_sent_and_completes_campaign() {
        let (gw, campaign) = setup(plain_template(), json!({ "nome": "contact.name" })).await;
        gw.insert_contacts(vec![row("r1")]).await.unwrap();
        let d = dispatcher(gw.clone(), ScriptedProvider::new(vec![ok_outcome("wamid.1")]));

        d.run_campaign(&campaign.id).await.unwrap();

        let after = gw.get_contacts(&campaign.id).await.unwrap().remove(0);
        assert_eq!(after.status, waba_core::model::ContactStatus::Sent);
        assert_eq!(after.message_id.as_deref(), Some("wamid.1"));
        let completed = gw.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(completed.status, CampaignStatus::Completed);
    }

    #[tokio::test]
    async fn missing_variable_skips_without_touching_turbo() {
        let (gw, campaign) = setup(plain_template(), json!({})).await;
        gw.insert_contacts(vec![row("r1")]).await.unwrap();
        let d = dispatcher(gw.clone(), ScriptedProvider::new(vec![]));

        d.run_campaign(&campaign.id).await.unwrap();

        let after = gw.get_contacts(&campaign.id).await.unwrap().remove(0);
        assert_eq!(after.status, waba_core::model::ContactStatus::Skipped);
        assert_eq!(after.skip_code.as_deref(), Some("missing_variables"));
    }

    #[tokio::test]
    async fn rate_limited_requeues_then_fails_once_bound_exhausted() {
        let (gw, campaign) = setup(plain_template(), json!({ "nome": "contact.name" })).await;
        gw.put_setting(
            waba_core::settings::DISPATCHER_CONFIG,
            serde_json::to_value(DispatcherConfig { max_rate_limited_retries: 1, ..DispatcherConfig::default() })
                .unwrap(),
        )
        .await
        .unwrap();
        gw.insert_contacts(vec![row("r1")]).await.unwrap();
        let d = dispatcher(
            gw.clone(),
            ScriptedProvider::new(vec![
                classified(waba_core::ProviderErrorClass::RateLimited),
                classified(waba_core::ProviderErrorClass::RateLimited),
            ]),
        );

        d.run_campaign(&campaign.id).await.unwrap();

        let after = gw.get_contacts(&campaign.id).await.unwrap().remove(0);
        assert_eq!(after.status, waba_core::model::ContactStatus::Failed);
        assert_eq!(after.error.as_deref(), Some("rate_limited"));
        assert_eq!(after.rate_limited_retries, 2);
    }

    #[tokio::test]
    async fn media_expired_rehosts_and_retries_once_successfully() {
        let (gw, campaign) = setup(media_template(), json!({})).await;
        gw.insert_contacts(vec![row("r1")]).await.unwrap();
        let provider = ScriptedProvider::new(vec![
            classified(waba_core::ProviderErrorClass::MediaExpired),
            ok_outcome("wamid.2"),
        ])
        .with_media(vec![Ok(MediaHandle { url: "https://cdn.example/new".to_string(), expires_at: Utc::now() })]);
        let d = dispatcher(gw.clone(), provider);

        d.run_campaign(&campaign.id).await.unwrap();

        let after = gw.get_contacts(&campaign.id).await.unwrap().remove(0);
        assert_eq!(after.status, waba_core::model::ContactStatus::Sent);
        assert_eq!(after.message_id.as_deref(), Some("wamid.2"));
    }

    #[tokio::test]
    async fn media_expired_twice_escalates_to_policy_rejected() {
        let (gw, campaign) = setup(media_template(), json!({})).await;
        gw.insert_contacts(vec![row("r1")]).await.unwrap();
        let provider = ScriptedProvider::new(vec![
            classified(waba_core::ProviderErrorClass::MediaExpired),
            classified(waba_core::ProviderErrorClass::MediaExpired),
        ])
        .with_media(vec![Ok(MediaHandle { url: "https://cdn.example/new".to_string(), expires_at: Utc::now() })]);
        let d = dispatcher(gw.clone(), provider);

        d.run_campaign(&campaign.id).await.unwrap();

        let after = gw.get_contacts(&campaign.id).await.unwrap().remove(0);
        assert_eq!(after.status, waba_core::model::ContactStatus::Failed);
        assert!(after.error.unwrap().contains("policy_rejected"));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_skips_pending_rows() {
        let (gw, campaign) = setup(plain_template(), json!({})).await;
        gw.insert_contacts(vec![row("r1"), row("r2")]).await.unwrap();
        let d = dispatcher(gw.clone(), ScriptedProvider::new(vec![]));

        let first = d.cancel_campaign(&campaign.id).await.unwrap();
        assert_eq!(first, CancelOutcome::Cancelled { skipped: 2 });

        let second = d.cancel_campaign(&campaign.id).await.unwrap();
        assert_eq!(second, CancelOutcome::AlreadyCancelled);

        let cancelled = gw.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, CampaignStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_on_terminal_campaign_conflicts() {
        let (gw, campaign) = setup(plain_template(), json!({})).await;
        let mut completed = gw.get_campaign(&campaign.id).await.unwrap().unwrap();
        completed.status = CampaignStatus::Completed;
        gw.put_campaign(completed).await.unwrap();
        let d = dispatcher(gw.clone(), ScriptedProvider::new(vec![]));

        let err = d.cancel_campaign(&campaign.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn materialize_scheduled_flips_elapsed_campaigns_to_sending() {
        let (gw, campaign) = setup(plain_template(), json!({})).await;
        let mut scheduled = gw.get_campaign(&campaign.id).await.unwrap().unwrap();
        scheduled.status = CampaignStatus::Scheduled;
        scheduled.scheduled_at = Some(Utc::now() - chrono::Duration::minutes(1));
        gw.put_campaign(scheduled).await.unwrap();
        let d = dispatcher(gw.clone(), ScriptedProvider::new(vec![]));

        let materialized = d.materialize_scheduled(Utc::now()).await.unwrap();
        assert_eq!(materialized, vec![campaign.id.clone()]);

        let after = gw.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(after.status, CampaignStatus::Sending);
        assert!(after.first_dispatch_at.is_some());
    }
}
