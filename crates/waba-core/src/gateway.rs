//! The Persistence Gateway trait (spec §4.B).
//!
//! Every other component borrows read-only snapshots or issues writes
//! through this trait; no component caches mutable state beyond a single
//! operation except the Rate Controller (spec §3 "Ownership").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::{
    Campaign, CampaignContact, CampaignStatus, ContactStatus, FlowSubmission, Template,
    WebhookStatus, Workflow, WorkflowConversation, WorkflowRun, WorkflowRunLog, WorkflowVersion,
};

/// Outcome recorded for a single contact send attempt
/// (spec §4.B `markContactResult`).
#[derive(Debug, Clone)]
pub struct ContactOutcome {
    pub status: ContactStatus,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub skip_code: Option<String>,
    pub skip_reason: Option<String>,
}

impl ContactOutcome {
    /// A successful send.
    #[must_use]
    pub fn sent(message_id: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            status: ContactStatus::Sent,
            message_id: Some(message_id.into()),
            error: None,
            sent_at: Some(sent_at),
            skip_code: None,
            skip_reason: None,
        }
    }

    /// A failed send with the classified error message.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ContactStatus::Failed,
            message_id: None,
            error: Some(error.into()),
            sent_at: None,
            skip_code: None,
            skip_reason: None,
        }
    }

    /// A row skipped before a send was ever attempted (precheck failure,
    /// cancellation).
    #[must_use]
    pub fn skipped(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: ContactStatus::Skipped,
            message_id: None,
            error: None,
            sent_at: None,
            skip_code: Some(code.into()),
            skip_reason: Some(reason.into()),
        }
    }
}

/// Input to `applyStatusEvent` (spec §4.B, §4.F).
#[derive(Debug, Clone)]
pub struct StatusEventInput {
    pub message_id: String,
    pub status: WebhookStatus,
    pub ts: DateTime<Utc>,
    /// Present on `failed` events; the provider's classified error detail.
    pub error_detail: Option<String>,
}

/// Result of applying one status event (spec §4.F, §8 idempotence law).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusApplyOutcome {
    /// The `(message_id, status)` pair was already recorded; no-op.
    AlreadyApplied,
    /// Applied, but no `campaign_contacts` row matched `message_id` yet.
    NoMatchingContact,
    /// Applied and projected onto the matching contact row.
    Applied,
}

/// Input to `openPausedConversation` (spec §4.B).
#[derive(Debug, Clone)]
pub struct OpenConversationRequest {
    pub workflow_id: String,
    pub run_id: String,
    pub phone: String,
    pub resume_node_id: String,
    pub variable_key: String,
    pub variables: HashMap<String, Value>,
}

/// Typed access to every persisted entity plus the atomic operations the
/// core relies on (spec §4.B).
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    // ---- atomic operations -------------------------------------------------

    /// Mark up to `batch_size` `pending` rows of `campaign_id` as `sending`
    /// in one transaction and return the claimed rows. `batch_size == 0`
    /// returns an empty vector with no state changes (spec §8 boundary).
    async fn claim_pending(
        &self,
        campaign_id: &str,
        batch_size: u32,
    ) -> Result<Vec<CampaignContact>>;

    /// Apply a forward-only transition to a contact row. Regressions are
    /// rejected (return `Ok(())` without mutating, per "reject regressions").
    async fn mark_contact_result(&self, row_id: &str, outcome: ContactOutcome) -> Result<()>;

    /// Return a `sending` row to `pending` after a `rate_limited` response,
    /// bounded by `max_retries` (spec §4.E step 3.e). Increments
    /// `rate_limited_retries` regardless of outcome. Returns `true` if the
    /// row was requeued, `false` once the bound is exhausted — the caller
    /// must then fail the row itself via `mark_contact_result`.
    async fn requeue_rate_limited(&self, row_id: &str, max_retries: u32) -> Result<bool>;

    /// Idempotently record and project a webhook status event. A
    /// `NoMatchingContact` outcome rolls back the dedup record, so a
    /// reconciliation retry of the same event can re-attempt the lookup
    /// once the contact exists (spec §4.F item 2).
    async fn apply_status_event(&self, event: StatusEventInput) -> Result<StatusApplyOutcome>;

    /// Open a paused conversation; fails with `Error::ConversationConflict`
    /// if another `waiting` conversation already exists for
    /// `(workflow_id, phone)`.
    async fn open_paused_conversation(
        &self,
        req: OpenConversationRequest,
    ) -> Result<WorkflowConversation>;

    /// Mark a conversation `completed`, merging the final variable map.
    async fn complete_paused_conversation(
        &self,
        id: &str,
        variables_merged: HashMap<String, Value>,
    ) -> Result<()>;

    /// The single `waiting` conversation for `(workflow_id, phone)`, if any.
    async fn find_waiting_conversation(
        &self,
        workflow_id: &str,
        phone: &str,
    ) -> Result<Option<WorkflowConversation>>;

    async fn get_conversation(&self, id: &str) -> Result<Option<WorkflowConversation>>;

    /// The single `waiting` conversation for `phone`, regardless of which
    /// workflow opened it (spec §4.F "Inbound projection": "Look up a
    /// `waiting` `workflow_conversations` row for the sending phone").
    async fn find_any_waiting_conversation(&self, phone: &str) -> Result<Option<WorkflowConversation>>;

    // ---- workflows -----------------------------------------------------

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>>;
    async fn get_workflow_version(&self, id: &str) -> Result<Option<WorkflowVersion>>;
    async fn put_workflow(&self, workflow: Workflow, version: WorkflowVersion) -> Result<()>;

    async fn create_run(&self, run: WorkflowRun) -> Result<()>;
    async fn get_run(&self, id: &str) -> Result<Option<WorkflowRun>>;
    async fn update_run(&self, run: WorkflowRun) -> Result<()>;
    async fn append_run_log(&self, log: WorkflowRunLog) -> Result<()>;

    // ---- campaigns -------------------------------------------------------

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>>;
    async fn put_campaign(&self, campaign: Campaign) -> Result<()>;
    /// Campaigns currently in `status`, for the scheduler clock's
    /// materialization sweep (spec §4.E "Lifecycle").
    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;
    async fn insert_contacts(&self, contacts: Vec<CampaignContact>) -> Result<()>;
    async fn get_contacts(&self, campaign_id: &str) -> Result<Vec<CampaignContact>>;
    async fn get_contact_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<CampaignContact>>;
    /// Best-effort: move every still-`pending` row of `campaign_id` to
    /// `skipped` with `skip_code = "cancelled"` (spec §4.E Cancellation).
    async fn skip_all_pending(&self, campaign_id: &str, skip_code: &str) -> Result<u64>;
    /// Rows stuck in `sending` older than `older_than`, returned to
    /// `pending` with their reaper retry counter incremented (spec §5).
    async fn reap_stale_sending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<CampaignContact>>;

    // ---- templates / flow submissions ------------------------------------

    async fn get_template(&self, name: &str) -> Result<Option<Template>>;
    async fn put_template(&self, template: Template) -> Result<()>;
    async fn upsert_flow_submission(&self, submission: FlowSubmission) -> Result<()>;

    // ---- settings ----------------------------------------------------------

    async fn get_setting(&self, key: &str) -> Result<Option<Value>>;
    async fn put_setting(&self, key: &str, value: Value) -> Result<()>;

    // ---- derived --------------------------------------------------------

    /// Campaign-level counters, always recomputed from `campaign_contacts`
    /// (spec §3: "counters are derived and must be reconcilable").
    async fn campaign_counters(
        &self,
        campaign_id: &str,
    ) -> Result<crate::model::CampaignCounters> {
        let contacts = self.get_contacts(campaign_id).await?;
        let mut counters = crate::model::CampaignCounters {
            recipients: contacts.len() as u64,
            ..Default::default()
        };
        for c in &contacts {
            match c.status {
                ContactStatus::Sent => counters.sent += 1,
                ContactStatus::Delivered => counters.delivered += 1,
                ContactStatus::Read => counters.read += 1,
                ContactStatus::Failed => counters.failed += 1,
                ContactStatus::Skipped => counters.skipped += 1,
                ContactStatus::Pending | ContactStatus::Sending => {}
            }
        }
        Ok(counters)
    }
}
