//! The Reply Ingestor (spec §4.F): projects provider status callbacks onto
//! `campaign_contacts` and routes inbound messages to the Workflow Engine,
//! flow-form storage, or an external Responder.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use waba_core::model::{mask_phone, FlowSubmission, TraceEvent};
use waba_core::{ids, PersistenceGateway, Result, StatusApplyOutcome, StatusEventInput, TraceEmitter};
use waba_provider::{classify_status, ProviderClient};
use waba_workflow::{ResumeRequest, WorkflowEngine};

use crate::reconcile::{self, Reconciler};
use crate::verify::{check_webhook_token, VerifyOutcome};
use crate::webhook::{parse_webhook_payload, InboundMessage, InboundStatus, WebhookEvent};

/// What the caller (the HTTP layer) should do once ingestion completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    /// Respond `200` normally.
    Ok,
    /// Respond `200` but the event was dropped before processing
    /// (spec §4.F: "never teach the provider to back off").
    Degraded,
}

/// An inbound message that matched no waiting conversation and carried no
/// flow-form payload — handed to whatever external responder is configured.
/// Ingestion itself never replies (spec §4.F Non-goals).
#[derive(Debug, Clone)]
pub struct UnroutedMessage {
    pub from: String,
    pub to: String,
    pub message_id: String,
    pub text: Option<String>,
}

pub struct ReplyIngestor {
    gateway: Arc<dyn PersistenceGateway>,
    provider: Arc<dyn ProviderClient>,
    engine: Arc<WorkflowEngine>,
    trace: Arc<dyn TraceEmitter>,
    verify_token: Option<String>,
    reconciler: Reconciler,
}

impl ReplyIngestor {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        provider: Arc<dyn ProviderClient>,
        engine: Arc<WorkflowEngine>,
        trace: Arc<dyn TraceEmitter>,
        verify_token: Option<String>,
    ) -> Self {
        let reconciler = reconcile::spawn(gateway.clone());
        Self { gateway, provider, engine, trace, verify_token, reconciler }
    }

    /// `GET /webhook` verification challenge (spec §6).
    #[must_use]
    pub fn verify_challenge(&self, provided: &str) -> bool {
        crate::verify::verify_challenge(self.verify_token.as_deref(), provided)
    }

    /// `POST /webhook` (spec §4.F, §6). Returns the ack to send plus any
    /// inbound messages that need external routing.
    pub async fn ingest(
        &self,
        provided_token: Option<&str>,
        body: &Value,
    ) -> Result<(WebhookAck, Vec<UnroutedMessage>)> {
        match check_webhook_token(self.verify_token.as_deref(), provided_token) {
            VerifyOutcome::Rejected => {
                warn!("webhook request rejected: verify token mismatch");
                return Ok((WebhookAck::Degraded, Vec::new()));
            }
            VerifyOutcome::Degraded => {
                warn!("webhook accepted without a configured verify token");
            }
            VerifyOutcome::Verified => {}
        }

        let mut unrouted = Vec::new();
        for event in parse_webhook_payload(body) {
            match event {
                WebhookEvent::Status(status) => self.apply_status(status).await?,
                WebhookEvent::Message(message) => {
                    if let Some(u) = self.route_message(message).await? {
                        unrouted.push(u);
                    }
                }
            }
        }
        Ok((WebhookAck::Ok, unrouted))
    }

    async fn apply_status(&self, status: InboundStatus) -> Result<()> {
        let error_detail = status.raw_error.as_ref().map(|e| {
            let class = classify_status(400, Some(&serde_json::json!({ "error": e })));
            format!("{class:?}: {e}")
        });
        let is_media_expired = status.raw_error.as_ref().is_some_and(|e| {
            classify_status(400, Some(&serde_json::json!({ "error": e })))
                == waba_core::ProviderErrorClass::MediaExpired
        });

        let outcome = self
            .gateway
            .apply_status_event(StatusEventInput {
                message_id: status.message_id.clone(),
                status: status.status,
                ts: status.ts,
                error_detail: error_detail.clone(),
            })
            .await?;

        match outcome {
            StatusApplyOutcome::AlreadyApplied => {
                info!(message_id = %status.message_id, "duplicate status event ignored");
            }
            StatusApplyOutcome::NoMatchingContact => {
                warn!(message_id = %status.message_id, "status event for unknown contact, queued for reconciliation");
                self.reconciler.enqueue(StatusEventInput {
                    message_id: status.message_id.clone(),
                    status: status.status,
                    ts: status.ts,
                    error_detail: error_detail.clone(),
                });
            }
            StatusApplyOutcome::Applied => {}
        }

        if is_media_expired {
            self.trace.emit(TraceEvent {
                trace_id: ids::new_id(),
                ts: Utc::now(),
                campaign_id: None,
                step: "reply_ingestor".to_string(),
                phase: "webhook_failed_details".to_string(),
                ok: false,
                ms: None,
                batch_index: None,
                contact_id: None,
                phone_masked: None,
                extra: serde_json::json!({ "message_id": status.message_id, "error": error_detail }),
            });
            if let Some(contact) = self.gateway.get_contact_by_message_id(&status.message_id).await? {
                let handle = match self.gateway.get_campaign(&contact.campaign_id).await? {
                    Some(campaign) => self
                        .gateway
                        .get_template(&campaign.template_name)
                        .await?
                        .and_then(|t| t.header_media().and_then(|c| c.header_media_handle.clone())),
                    None => None,
                };
                if let Some(handle) = handle {
                    let trace_id = ids::new_id();
                    let ctx = waba_precheck::RehostContext {
                        trace_id: &trace_id,
                        campaign_id: Some(contact.campaign_id.as_str()),
                        contact_id: Some(contact.id.as_str()),
                        phone: contact.phone.as_str(),
                    };
                    if let Err(e) = waba_precheck::rehost(&self.provider, &handle, &self.trace, &ctx).await {
                        warn!(contact_id = %contact.id, error = %e, "media rehost after webhook failure did not complete");
                    }
                }
            }
        }
        Ok(())
    }

    async fn route_message(&self, message: InboundMessage) -> Result<Option<UnroutedMessage>> {
        if let Some(submission) = message.flow_submission.clone() {
            self.gateway
                .upsert_flow_submission(FlowSubmission {
                    id: ids::new_id(),
                    message_id: message.message_id.clone(),
                    raw: submission.clone(),
                    mapped: submission,
                    campaign_id: None,
                    contact_id: None,
                })
                .await?;
            return Ok(None);
        }

        if let Some(conversation) = self.gateway.find_any_waiting_conversation(&message.from).await? {
            let outcome = self
                .engine
                .resume(ResumeRequest {
                    workflow_id: conversation.workflow_id.clone(),
                    conversation_id: conversation.id.clone(),
                    from: message.from.clone(),
                    to: message.to.clone(),
                    message: message.text.clone().unwrap_or_default(),
                })
                .await?;
            info!(
                phone = %mask_phone(&message.from),
                execution_id = %outcome.execution_id,
                "resumed paused conversation from inbound message"
            );
            return Ok(None);
        }

        Ok(Some(UnroutedMessage {
            from: message.from,
            to: message.to,
            message_id: message.message_id,
            text: message.text,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use waba_core::model::{
        ContactStatus, ExecutionConfig, NodeKind, TriggerType, Visibility, Workflow, WorkflowEdge,
        WorkflowNode, WorkflowVersion,
    };
    use waba_core::MemoryGateway;
    use waba_provider::{MediaHandle, PhoneProbe, SendOutcome};
    use waba_workflow::{RunOutcome, RunRequest};

    struct FakeProvider;

    #[async_trait]
    impl ProviderClient for FakeProvider {
        async fn send(&self, _payload: Value) -> Result<SendOutcome> {
            Ok(SendOutcome {
                ok: true,
                provider_message_id: Some(ids::new_id()),
                error_class: waba_core::ProviderErrorClass::Ok,
                raw: Value::Null,
            })
        }
        async fn fetch_media(&self, _handle: &str, _force: bool) -> Result<MediaHandle> {
            unimplemented!("not exercised in these tests")
        }
        async fn probe(&self, _phone_number_id: &str) -> Result<PhoneProbe> {
            unimplemented!("not exercised in these tests")
        }
    }

    fn node(id: &str, kind: NodeKind) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            trigger_type: None,
            action_type: None,
            config: serde_json::json!({}),
        }
    }

    async fn ask_question_workflow(gateway: &Arc<MemoryGateway>) {
        let mut trigger = node("t1", NodeKind::Trigger);
        trigger.trigger_type = Some(TriggerType::Manual);
        let mut ask = node("ask", NodeKind::Action);
        ask.action_type = Some("whatsapp/ask-question".to_string());
        ask.config = serde_json::json!({ "message": "Qual seu nome?", "variableKey": "nome" });

        let version = WorkflowVersion {
            id: "v1".to_string(),
            workflow_id: "w1".to_string(),
            nodes: vec![trigger, ask],
            edges: vec![WorkflowEdge { from: "t1".into(), to: "ask".into() }],
            execution_config: ExecutionConfig::default(),
        };
        let workflow = Workflow {
            id: "w1".to_string(),
            name: "test".to_string(),
            description: String::new(),
            visibility: Visibility::Private,
            active_version_id: version.id.clone(),
        };
        gateway.put_workflow(workflow, version).await.unwrap();
    }

    fn setup() -> (ReplyIngestor, Arc<MemoryGateway>) {
        let gateway = Arc::new(MemoryGateway::new());
        let provider: Arc<dyn ProviderClient> = Arc::new(FakeProvider);
        let engine = Arc::new(WorkflowEngine::new(gateway.clone(), provider.clone(), waba_core::sink::noop()));
        let ingestor = ReplyIngestor::new(
            gateway.clone(),
            provider,
            engine,
            waba_core::sink::noop(),
            Some("my-token".to_string()),
        );
        (ingestor, gateway)
    }

    #[tokio::test]
    async fn verify_challenge_only_echoes_exact_match() {
        let (ingestor, _gw) = setup();
        assert!(ingestor.verify_challenge("my-token"));
        assert!(!ingestor.verify_challenge("wrong"));
    }

    #[tokio::test]
    async fn mismatched_token_is_degraded_and_processes_nothing() {
        let (ingestor, gw) = setup();
        let body = serde_json::json!({
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "pn1" },
                "messages": [{ "from": "+5511987654321", "id": "wamid.1", "text": { "body": "oi" } }],
            } }] }]
        });
        let (ack, unrouted) = ingestor.ingest(Some("wrong-token"), &body).await.unwrap();
        assert_eq!(ack, WebhookAck::Degraded);
        assert!(unrouted.is_empty());
        assert!(gw.find_any_waiting_conversation("+5511987654321").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inbound_message_resumes_a_waiting_conversation() {
        let (ingestor, gateway) = setup();
        ask_question_workflow(&gateway).await;

        let engine = WorkflowEngine::new(
            gateway.clone(),
            Arc::new(FakeProvider),
            waba_core::sink::noop(),
        );
        let RunOutcome { status, .. } = engine
            .run(RunRequest {
                workflow_id: "w1".to_string(),
                input: serde_json::json!({ "from": "+5511987654321" }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(status, waba_core::model::RunStatus::Waiting);

        let body = serde_json::json!({
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "pn1" },
                "messages": [{ "from": "+5511987654321", "id": "wamid.2", "text": { "body": "Ana" } }],
            } }] }]
        });
        let (ack, unrouted) = ingestor.ingest(Some("my-token"), &body).await.unwrap();
        assert_eq!(ack, WebhookAck::Ok);
        assert!(unrouted.is_empty());

        assert!(gateway.find_any_waiting_conversation("+5511987654321").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inbound_message_with_no_conversation_is_unrouted() {
        let (ingestor, _gw) = setup();
        let body = serde_json::json!({
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "pn1" },
                "messages": [{ "from": "+5511900000000", "id": "wamid.3", "text": { "body": "oi" } }],
            } }] }]
        });
        let (ack, unrouted) = ingestor.ingest(Some("my-token"), &body).await.unwrap();
        assert_eq!(ack, WebhookAck::Ok);
        assert_eq!(unrouted.len(), 1);
        assert_eq!(unrouted[0].from, "+5511900000000");
    }

    #[tokio::test]
    async fn flow_form_submission_is_stored_not_routed() {
        let (ingestor, _gw) = setup();
        let body = serde_json::json!({
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "pn1" },
                "messages": [{
                    "from": "+5511900000000",
                    "id": "wamid.4",
                    "interactive": { "nfm_reply": { "response_json": "{\"name\":\"Ana\"}" } },
                }],
            } }] }]
        });
        let (ack, unrouted) = ingestor.ingest(Some("my-token"), &body).await.unwrap();
        assert_eq!(ack, WebhookAck::Ok);
        assert!(unrouted.is_empty());
    }

    #[tokio::test]
    async fn delivered_status_projects_onto_the_matching_contact() {
        let (ingestor, gateway) = setup();
        gateway
            .insert_contacts(vec![waba_core::model::CampaignContact {
                id: "row1".to_string(),
                campaign_id: "c1".to_string(),
                contact_id: "contact1".to_string(),
                phone: "+5511987654321".to_string(),
                name: "Ana".to_string(),
                email: String::new(),
                custom_fields: serde_json::json!({}),
                status: ContactStatus::Sent,
                message_id: Some("wamid.10".to_string()),
                sent_at: Some(Utc::now()),
                delivered_at: None,
                read_at: None,
                skipped_at: None,
                skip_code: None,
                skip_reason: None,
                error: None,
                rate_limited_retries: 0,
                reaper_retries: 0,
            }])
            .await
            .unwrap();

        let body = serde_json::json!({
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "pn1" },
                "statuses": [{ "id": "wamid.10", "status": "delivered", "timestamp": "1700000000" }],
            } }] }]
        });
        let (ack, _unrouted) = ingestor.ingest(Some("my-token"), &body).await.unwrap();
        assert_eq!(ack, WebhookAck::Ok);

        let contacts = gateway.get_contacts("c1").await.unwrap();
        assert_eq!(contacts[0].status, ContactStatus::Delivered);
    }

    #[tokio::test]
    async fn duplicate_status_event_is_idempotent() {
        let (ingestor, gateway) = setup();
        gateway
            .insert_contacts(vec![waba_core::model::CampaignContact {
                id: "row1".to_string(),
                campaign_id: "c1".to_string(),
                contact_id: "contact1".to_string(),
                phone: "+5511987654321".to_string(),
                name: "Ana".to_string(),
                email: String::new(),
                custom_fields: serde_json::json!({}),
                status: ContactStatus::Sent,
                message_id: Some("wamid.11".to_string()),
                sent_at: Some(Utc::now()),
                delivered_at: None,
                read_at: None,
                skipped_at: None,
                skip_code: None,
                skip_reason: None,
                error: None,
                rate_limited_retries: 0,
                reaper_retries: 0,
            }])
            .await
            .unwrap();

        let body = serde_json::json!({
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "pn1" },
                "statuses": [{ "id": "wamid.11", "status": "read", "timestamp": "1700000000" }],
            } }] }]
        });
        ingestor.ingest(Some("my-token"), &body).await.unwrap();
        ingestor.ingest(Some("my-token"), &body).await.unwrap();

        let contacts = gateway.get_contacts("c1").await.unwrap();
        assert_eq!(contacts[0].status, ContactStatus::Read);
    }
}
