//! An in-memory `PersistenceGateway`, used by tests and as the default
//! backing store when no Postgres connection string is configured.
//!
//! Mirrors the locking style of `dashflow`'s mutex-guarded shared state:
//! a single `parking_lot::Mutex` around a plain struct of maps, held only
//! for the duration of each synchronous mutation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::gateway::{
    ContactOutcome, OpenConversationRequest, PersistenceGateway, StatusApplyOutcome,
    StatusEventInput,
};
use crate::model::{
    Campaign, CampaignContact, CampaignStatus, ContactStatus, ConversationStatus, FlowSubmission,
    Template, WebhookStatus, Workflow, WorkflowConversation, WorkflowRun, WorkflowRunLog,
    WorkflowVersion,
};

#[derive(Default)]
struct Store {
    workflows: HashMap<String, Workflow>,
    workflow_versions: HashMap<String, WorkflowVersion>,
    runs: HashMap<String, WorkflowRun>,
    run_logs: Vec<WorkflowRunLog>,
    conversations: HashMap<String, WorkflowConversation>,
    campaigns: HashMap<String, Campaign>,
    /// contact rows keyed by id, grouped implicitly via `campaign_id` field.
    contacts: HashMap<String, CampaignContact>,
    templates: HashMap<String, Template>,
    flow_submissions: HashMap<String, FlowSubmission>,
    status_events: HashSet<(String, WebhookStatus)>,
    settings: HashMap<String, Value>,
}

/// In-memory `PersistenceGateway` implementation.
pub struct MemoryGateway {
    store: Mutex<Store>,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
        }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn claim_pending(
        &self,
        campaign_id: &str,
        batch_size: u32,
    ) -> Result<Vec<CampaignContact>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let mut store = self.store.lock();
        let mut claimed = Vec::new();
        let ids: Vec<String> = store
            .contacts
            .values()
            .filter(|c| c.campaign_id == campaign_id && c.status == ContactStatus::Pending)
            .take(batch_size as usize)
            .map(|c| c.id.clone())
            .collect();
        for id in ids {
            if let Some(c) = store.contacts.get_mut(&id) {
                c.status = ContactStatus::Sending;
                claimed.push(c.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_contact_result(&self, row_id: &str, outcome: ContactOutcome) -> Result<()> {
        let mut store = self.store.lock();
        let Some(row) = store.contacts.get_mut(row_id) else {
            return Err(Error::NotFound(format!("campaign_contacts/{row_id}")));
        };
        if outcome.status.rank() < row.status.rank() {
            // Reject regressions silently; forward-only invariant (spec §4.B).
            return Ok(());
        }
        row.status = outcome.status;
        if outcome.message_id.is_some() {
            row.message_id = outcome.message_id;
        }
        if outcome.error.is_some() {
            row.error = outcome.error;
        }
        if outcome.sent_at.is_some() {
            row.sent_at = outcome.sent_at;
        }
        if outcome.skip_code.is_some() {
            row.skip_code = outcome.skip_code;
            row.skip_reason = outcome.skip_reason;
            row.skipped_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn requeue_rate_limited(&self, row_id: &str, max_retries: u32) -> Result<bool> {
        let mut store = self.store.lock();
        let Some(row) = store.contacts.get_mut(row_id) else {
            return Err(Error::NotFound(format!("campaign_contacts/{row_id}")));
        };
        row.rate_limited_retries += 1;
        if row.rate_limited_retries > max_retries {
            return Ok(false);
        }
        row.status = ContactStatus::Pending;
        Ok(true)
    }

    async fn apply_status_event(&self, event: StatusEventInput) -> Result<StatusApplyOutcome> {
        let mut store = self.store.lock();
        let key = (event.message_id.clone(), event.status);
        if !store.status_events.insert(key.clone()) {
            return Ok(StatusApplyOutcome::AlreadyApplied);
        }

        let row_id = store
            .contacts
            .values()
            .find(|c| c.message_id.as_deref() == Some(event.message_id.as_str()))
            .map(|c| c.id.clone());

        let Some(row_id) = row_id else {
            // Roll back the dedup marker: the contact may not exist yet
            // because our own send hasn't landed, so a reconciliation
            // retry of this exact event must be able to re-attempt it.
            store.status_events.remove(&key);
            return Ok(StatusApplyOutcome::NoMatchingContact);
        };

        let row = store
            .contacts
            .get_mut(&row_id)
            .expect("row_id was just resolved from the same map");

        match event.status {
            WebhookStatus::Sent => {
                row.sent_at.get_or_insert(event.ts);
                if ContactStatus::Sent.rank() > row.status.rank() {
                    row.status = ContactStatus::Sent;
                }
            }
            WebhookStatus::Delivered => {
                row.delivered_at.get_or_insert(event.ts);
                row.sent_at.get_or_insert(event.ts);
                if ContactStatus::Delivered.rank() > row.status.rank() {
                    row.status = ContactStatus::Delivered;
                }
            }
            WebhookStatus::Read => {
                row.read_at.get_or_insert(event.ts);
                row.delivered_at.get_or_insert(event.ts);
                row.sent_at.get_or_insert(event.ts);
                if ContactStatus::Read.rank() > row.status.rank() {
                    row.status = ContactStatus::Read;
                }
            }
            WebhookStatus::Failed => {
                // Failed only reachable from pending/sending (spec §3
                // invariant: the sent->delivered->read chain never fails
                // backwards once a message is confirmed sent).
                if row.status.rank() < ContactStatus::Sent.rank() {
                    row.status = ContactStatus::Failed;
                    row.error = event.error_detail.clone();
                }
            }
        }
        Ok(StatusApplyOutcome::Applied)
    }

    async fn open_paused_conversation(
        &self,
        req: OpenConversationRequest,
    ) -> Result<WorkflowConversation> {
        let mut store = self.store.lock();
        let conflict = store.conversations.values().any(|c| {
            c.workflow_id == req.workflow_id
                && c.phone == req.phone
                && c.status == ConversationStatus::Waiting
        });
        if conflict {
            return Err(Error::ConversationConflict {
                workflow_id: req.workflow_id,
                phone: req.phone,
            });
        }
        let conversation = WorkflowConversation {
            id: crate::ids::new_id(),
            workflow_id: req.workflow_id,
            run_id: req.run_id,
            phone: req.phone,
            status: ConversationStatus::Waiting,
            resume_node_id: req.resume_node_id,
            variable_key: req.variable_key,
            variables: req.variables,
        };
        store
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn complete_paused_conversation(
        &self,
        id: &str,
        variables_merged: HashMap<String, Value>,
    ) -> Result<()> {
        let mut store = self.store.lock();
        let Some(conv) = store.conversations.get_mut(id) else {
            return Err(Error::NotFound(format!("workflow_conversations/{id}")));
        };
        conv.status = ConversationStatus::Completed;
        conv.variables = variables_merged;
        Ok(())
    }

    async fn find_waiting_conversation(
        &self,
        workflow_id: &str,
        phone: &str,
    ) -> Result<Option<WorkflowConversation>> {
        let store = self.store.lock();
        Ok(store
            .conversations
            .values()
            .find(|c| {
                c.workflow_id == workflow_id
                    && c.phone == phone
                    && c.status == ConversationStatus::Waiting
            })
            .cloned())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<WorkflowConversation>> {
        Ok(self.store.lock().conversations.get(id).cloned())
    }

    async fn find_any_waiting_conversation(&self, phone: &str) -> Result<Option<WorkflowConversation>> {
        let store = self.store.lock();
        Ok(store
            .conversations
            .values()
            .find(|c| c.phone == phone && c.status == ConversationStatus::Waiting)
            .cloned())
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.store.lock().workflows.get(id).cloned())
    }

    async fn get_workflow_version(&self, id: &str) -> Result<Option<WorkflowVersion>> {
        Ok(self.store.lock().workflow_versions.get(id).cloned())
    }

    async fn put_workflow(&self, workflow: Workflow, version: WorkflowVersion) -> Result<()> {
        let mut store = self.store.lock();
        store
            .workflow_versions
            .insert(version.id.clone(), version);
        store.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn create_run(&self, run: WorkflowRun) -> Result<()> {
        self.store.lock().runs.insert(run.id.clone(), run);
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<WorkflowRun>> {
        Ok(self.store.lock().runs.get(id).cloned())
    }

    async fn update_run(&self, run: WorkflowRun) -> Result<()> {
        self.store.lock().runs.insert(run.id.clone(), run);
        Ok(())
    }

    async fn append_run_log(&self, log: WorkflowRunLog) -> Result<()> {
        self.store.lock().run_logs.push(log);
        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        Ok(self.store.lock().campaigns.get(id).cloned())
    }

    async fn put_campaign(&self, campaign: Campaign) -> Result<()> {
        self.store.lock().campaigns.insert(campaign.id.clone(), campaign);
        Ok(())
    }

    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        Ok(self
            .store
            .lock()
            .campaigns
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    async fn insert_contacts(&self, contacts: Vec<CampaignContact>) -> Result<()> {
        let mut store = self.store.lock();
        for c in contacts {
            store.contacts.insert(c.id.clone(), c);
        }
        Ok(())
    }

    async fn get_contacts(&self, campaign_id: &str) -> Result<Vec<CampaignContact>> {
        Ok(self
            .store
            .lock()
            .contacts
            .values()
            .filter(|c| c.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn get_contact_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<CampaignContact>> {
        Ok(self
            .store
            .lock()
            .contacts
            .values()
            .find(|c| c.message_id.as_deref() == Some(message_id))
            .cloned())
    }

    async fn skip_all_pending(&self, campaign_id: &str, skip_code: &str) -> Result<u64> {
        let mut store = self.store.lock();
        let mut n = 0u64;
        for c in store.contacts.values_mut() {
            if c.campaign_id == campaign_id && c.status == ContactStatus::Pending {
                c.status = ContactStatus::Skipped;
                c.skip_code = Some(skip_code.to_string());
                c.skip_reason = Some("campaign cancelled".to_string());
                c.skipped_at = Some(Utc::now());
                n += 1;
            }
        }
        Ok(n)
    }

    async fn reap_stale_sending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<CampaignContact>> {
        let mut store = self.store.lock();
        let mut reaped = Vec::new();
        for c in store.contacts.values_mut() {
            if c.status == ContactStatus::Sending {
                // The in-memory store doesn't track a claimed_at field
                // separately; callers pass the reaper's cutoff and we
                // treat every currently-`sending` row as claimed before it
                // unless it has already been reaped this cycle.
                let _ = older_than;
                c.status = ContactStatus::Pending;
                c.reaper_retries += 1;
                reaped.push(c.clone());
            }
        }
        Ok(reaped)
    }

    async fn get_template(&self, name: &str) -> Result<Option<Template>> {
        Ok(self.store.lock().templates.get(name).cloned())
    }

    async fn put_template(&self, template: Template) -> Result<()> {
        self.store.lock().templates.insert(template.name.clone(), template);
        Ok(())
    }

    async fn upsert_flow_submission(&self, submission: FlowSubmission) -> Result<()> {
        self.store
            .lock()
            .flow_submissions
            .insert(submission.message_id.clone(), submission);
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.store.lock().settings.get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: Value) -> Result<()> {
        self.store.lock().settings.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn contact(campaign_id: &str, status: ContactStatus) -> CampaignContact {
        CampaignContact {
            id: crate::ids::new_id(),
            campaign_id: campaign_id.to_string(),
            contact_id: crate::ids::new_id(),
            phone: "+5511987654321".to_string(),
            name: "Ana".to_string(),
            email: String::new(),
            custom_fields: serde_json::json!({}),
            status,
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

    #[tokio::test]
    async fn claim_pending_zero_is_a_noop() {
        let gw = MemoryGateway::new();
        gw.insert_contacts(vec![contact("c1", ContactStatus::Pending)])
            .await
            .unwrap();
        let claimed = gw.claim_pending("c1", 0).await.unwrap();
        assert!(claimed.is_empty());
        let contacts = gw.get_contacts("c1").await.unwrap();
        assert_eq!(contacts[0].status, ContactStatus::Pending);
    }

    #[tokio::test]
    async fn claim_pending_moves_rows_to_sending() {
        let gw = MemoryGateway::new();
        gw.insert_contacts(vec![
            contact("c1", ContactStatus::Pending),
            contact("c1", ContactStatus::Pending),
            contact("c1", ContactStatus::Pending),
        ])
        .await
        .unwrap();
        let claimed = gw.claim_pending("c1", 2).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert!(claimed.iter().all(|c| c.status == ContactStatus::Sending));
        let remaining_pending = gw
            .get_contacts("c1")
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.status == ContactStatus::Pending)
            .count();
        assert_eq!(remaining_pending, 1);
    }

    #[tokio::test]
    async fn mark_contact_result_rejects_regression() {
        let gw = MemoryGateway::new();
        let row = contact("c1", ContactStatus::Delivered);
        let id = row.id.clone();
        gw.insert_contacts(vec![row]).await.unwrap();
        gw.mark_contact_result(&id, ContactOutcome::sent("m1", Utc::now()))
            .await
            .unwrap();
        let after = gw.get_contacts("c1").await.unwrap().remove(0);
        assert_eq!(after.status, ContactStatus::Delivered);
    }

    #[tokio::test]
    async fn requeue_rate_limited_returns_to_pending_until_bound_exhausted() {
        let gw = MemoryGateway::new();
        let row = contact("c1", ContactStatus::Sending);
        let id = row.id.clone();
        gw.insert_contacts(vec![row]).await.unwrap();

        assert!(gw.requeue_rate_limited(&id, 1).await.unwrap());
        let after = gw.get_contacts("c1").await.unwrap().remove(0);
        assert_eq!(after.status, ContactStatus::Pending);
        assert_eq!(after.rate_limited_retries, 1);

        // Simulate a second claim-and-fail cycle; the bound of 1 is exhausted.
        gw.claim_pending("c1", 1).await.unwrap();
        assert!(!gw.requeue_rate_limited(&id, 1).await.unwrap());
        let after = gw.get_contacts("c1").await.unwrap().remove(0);
        assert_eq!(after.rate_limited_retries, 2);
    }

    #[tokio::test]
    async fn status_event_applied_once_is_idempotent() {
        let gw = MemoryGateway::new();
        let mut row = contact("c1", ContactStatus::Sending);
        row.message_id = Some("m1".to_string());
        gw.insert_contacts(vec![row]).await.unwrap();

        let event = StatusEventInput {
            message_id: "m1".to_string(),
            status: WebhookStatus::Delivered,
            ts: Utc::now(),
            error_detail: None,
        };
        let first = gw.apply_status_event(event.clone()).await.unwrap();
        assert_eq!(first, StatusApplyOutcome::Applied);
        let second = gw.apply_status_event(event).await.unwrap();
        assert_eq!(second, StatusApplyOutcome::AlreadyApplied);

        let after = gw.get_contacts("c1").await.unwrap().remove(0);
        assert_eq!(after.status, ContactStatus::Delivered);
    }

    #[tokio::test]
    async fn out_of_order_status_events_converge_on_max_rank() {
        let gw = MemoryGateway::new();
        let mut row = contact("c1", ContactStatus::Sending);
        row.message_id = Some("m1".to_string());
        gw.insert_contacts(vec![row]).await.unwrap();

        let ts = Utc::now();
        for status in [WebhookStatus::Read, WebhookStatus::Delivered, WebhookStatus::Sent] {
            gw.apply_status_event(StatusEventInput {
                message_id: "m1".to_string(),
                status,
                ts,
                error_detail: None,
            })
            .await
            .unwrap();
        }

        let after = gw.get_contacts("c1").await.unwrap().remove(0);
        assert_eq!(after.status, ContactStatus::Read);
        assert!(after.sent_at.is_some());
        assert!(after.delivered_at.is_some());
        assert!(after.read_at.is_some());

        // Replaying all three again changes nothing (spec §8).
        for status in [WebhookStatus::Read, WebhookStatus::Delivered, WebhookStatus::Sent] {
            let outcome = gw
                .apply_status_event(StatusEventInput {
                    message_id: "m1".to_string(),
                    status,
                    ts,
                    error_detail: None,
                })
                .await
                .unwrap();
            assert_eq!(outcome, StatusApplyOutcome::AlreadyApplied);
        }
    }

    #[tokio::test]
    async fn failed_cannot_regress_a_delivered_row() {
        let gw = MemoryGateway::new();
        let mut row = contact("c1", ContactStatus::Delivered);
        row.message_id = Some("m1".to_string());
        gw.insert_contacts(vec![row]).await.unwrap();

        gw.apply_status_event(StatusEventInput {
            message_id: "m1".to_string(),
            status: WebhookStatus::Failed,
            ts: Utc::now(),
            error_detail: Some("network".to_string()),
        })
        .await
        .unwrap();

        let after = gw.get_contacts("c1").await.unwrap().remove(0);
        assert_eq!(after.status, ContactStatus::Delivered);
    }

    #[tokio::test]
    async fn open_paused_conversation_conflicts_on_duplicate() {
        let gw = MemoryGateway::new();
        let req = OpenConversationRequest {
            workflow_id: "w1".to_string(),
            run_id: "r1".to_string(),
            phone: "+5511987654321".to_string(),
            resume_node_id: "n2".to_string(),
            variable_key: "nome".to_string(),
            variables: HashMap::new(),
        };
        gw.open_paused_conversation(req.clone()).await.unwrap();
        let err = gw.open_paused_conversation(req).await.unwrap_err();
        assert!(matches!(err, Error::ConversationConflict { .. }));
    }

    #[tokio::test]
    async fn finds_waiting_conversation_by_phone_regardless_of_workflow() {
        let gw = MemoryGateway::new();
        let req = OpenConversationRequest {
            workflow_id: "w1".to_string(),
            run_id: "r1".to_string(),
            phone: "+5511987654321".to_string(),
            resume_node_id: "n2".to_string(),
            variable_key: "nome".to_string(),
            variables: HashMap::new(),
        };
        gw.open_paused_conversation(req).await.unwrap();
        let found = gw.find_any_waiting_conversation("+5511987654321").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().workflow_id, "w1");
        assert!(gw.find_any_waiting_conversation("+5511999999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_skips_only_pending_rows() {
        let gw = MemoryGateway::new();
        gw.insert_contacts(vec![
            contact("c1", ContactStatus::Pending),
            contact("c1", ContactStatus::Sending),
            contact("c1", ContactStatus::Sent),
        ])
        .await
        .unwrap();
        let n = gw.skip_all_pending("c1", "cancelled").await.unwrap();
        assert_eq!(n, 1);
        let statuses: Vec<_> = gw
            .get_contacts("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.status)
            .collect();
        assert!(statuses.contains(&ContactStatus::Skipped));
        assert!(statuses.contains(&ContactStatus::Sending));
        assert!(statuses.contains(&ContactStatus::Sent));
    }

    fn campaign(id: &str, status: CampaignStatus) -> Campaign {
        Campaign {
            id: id.to_string(),
            name: "welcome".to_string(),
            template_name: "welcome_v1".to_string(),
            phone_number_id: "pn1".to_string(),
            status,
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            first_dispatch_at: None,
            last_sent_at: None,
            completed_at: None,
            cancelled_at: None,
            template_variables: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn lists_campaigns_filtered_by_status() {
        let gw = MemoryGateway::new();
        gw.put_campaign(campaign("c1", CampaignStatus::Scheduled)).await.unwrap();
        gw.put_campaign(campaign("c2", CampaignStatus::Sending)).await.unwrap();
        gw.put_campaign(campaign("c3", CampaignStatus::Scheduled)).await.unwrap();
        let scheduled = gw.list_campaigns_by_status(CampaignStatus::Scheduled).await.unwrap();
        assert_eq!(scheduled.len(), 2);
    }

    #[tokio::test]
    async fn counters_are_derived_from_contacts() {
        let gw = MemoryGateway::new();
        gw.put_campaign(campaign("c1", CampaignStatus::Sending))
        .await
        .unwrap();
        gw.insert_contacts(vec![
            contact("c1", ContactStatus::Delivered),
            contact("c1", ContactStatus::Read),
            contact("c1", ContactStatus::Failed),
        ])
        .await
        .unwrap();
        let counters = gw.campaign_counters("c1").await.unwrap();
        assert_eq!(counters.recipients, 3);
        assert_eq!(counters.sent_effective(), 2);
        assert_eq!(counters.delivered_effective(), 2);
        assert_eq!(counters.failed, 1);
    }
}
