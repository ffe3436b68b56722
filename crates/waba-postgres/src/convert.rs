//! Plain-text encodings for the model's enums. Kept as explicit matches
//! rather than leaning on `serde_json` round-tripping so a renamed variant
//! fails to compile here instead of silently changing a stored column's
//! vocabulary.

use waba_core::model::{
    CampaignStatus, ContactStatus, ConversationStatus, NodeKind, ParameterFormat, RunStatus,
    StepStatus, TriggerType, Visibility, WebhookStatus,
};
use waba_core::Error;

pub fn campaign_status_to_text(s: CampaignStatus) -> &'static str {
    match s {
        CampaignStatus::Draft => "draft",
        CampaignStatus::Scheduled => "scheduled",
        CampaignStatus::Sending => "sending",
        CampaignStatus::Paused => "paused",
        CampaignStatus::Completed => "completed",
        CampaignStatus::Cancelled => "cancelled",
        CampaignStatus::Failed => "failed",
    }
}

pub fn campaign_status_from_text(s: &str) -> Result<CampaignStatus, Error> {
    match s {
        "draft" => Ok(CampaignStatus::Draft),
        "scheduled" => Ok(CampaignStatus::Scheduled),
        "sending" => Ok(CampaignStatus::Sending),
        "paused" => Ok(CampaignStatus::Paused),
        "completed" => Ok(CampaignStatus::Completed),
        "cancelled" => Ok(CampaignStatus::Cancelled),
        "failed" => Ok(CampaignStatus::Failed),
        other => Err(Error::Internal(format!("unknown campaign status: {other}"))),
    }
}

pub fn contact_status_to_text(s: ContactStatus) -> &'static str {
    match s {
        ContactStatus::Pending => "pending",
        ContactStatus::Sending => "sending",
        ContactStatus::Sent => "sent",
        ContactStatus::Delivered => "delivered",
        ContactStatus::Read => "read",
        ContactStatus::Failed => "failed",
        ContactStatus::Skipped => "skipped",
    }
}

pub fn contact_status_from_text(s: &str) -> Result<ContactStatus, Error> {
    match s {
        "pending" => Ok(ContactStatus::Pending),
        "sending" => Ok(ContactStatus::Sending),
        "sent" => Ok(ContactStatus::Sent),
        "delivered" => Ok(ContactStatus::Delivered),
        "read" => Ok(ContactStatus::Read),
        "failed" => Ok(ContactStatus::Failed),
        "skipped" => Ok(ContactStatus::Skipped),
        other => Err(Error::Internal(format!("unknown contact status: {other}"))),
    }
}

pub fn webhook_status_to_text(s: WebhookStatus) -> &'static str {
    match s {
        WebhookStatus::Sent => "sent",
        WebhookStatus::Delivered => "delivered",
        WebhookStatus::Read => "read",
        WebhookStatus::Failed => "failed",
    }
}

pub fn webhook_status_from_text(s: &str) -> Result<WebhookStatus, Error> {
    match s {
        "sent" => Ok(WebhookStatus::Sent),
        "delivered" => Ok(WebhookStatus::Delivered),
        "read" => Ok(WebhookStatus::Read),
        "failed" => Ok(WebhookStatus::Failed),
        other => Err(Error::Internal(format!("unknown webhook status: {other}"))),
    }
}

pub fn visibility_to_text(v: Visibility) -> &'static str {
    match v {
        Visibility::Private => "private",
        Visibility::Public => "public",
    }
}

pub fn visibility_from_text(s: &str) -> Result<Visibility, Error> {
    match s {
        "private" => Ok(Visibility::Private),
        "public" => Ok(Visibility::Public),
        other => Err(Error::Internal(format!("unknown visibility: {other}"))),
    }
}

pub fn trigger_type_to_text(t: TriggerType) -> &'static str {
    match t {
        TriggerType::Webhook => "webhook",
        TriggerType::Keywords => "keywords",
        TriggerType::Manual => "manual",
        TriggerType::Resume => "resume",
    }
}

pub fn trigger_type_from_text(s: &str) -> Result<TriggerType, Error> {
    match s {
        "webhook" => Ok(TriggerType::Webhook),
        "keywords" => Ok(TriggerType::Keywords),
        "manual" => Ok(TriggerType::Manual),
        "resume" => Ok(TriggerType::Resume),
        other => Err(Error::Internal(format!("unknown trigger type: {other}"))),
    }
}

pub fn run_status_to_text(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Queued => "queued",
        RunStatus::Running => "running",
        RunStatus::Waiting => "waiting",
        RunStatus::Success => "success",
        RunStatus::Failed => "failed",
        RunStatus::Skipped => "skipped",
        RunStatus::Error => "error",
    }
}

pub fn run_status_from_text(s: &str) -> Result<RunStatus, Error> {
    match s {
        "queued" => Ok(RunStatus::Queued),
        "running" => Ok(RunStatus::Running),
        "waiting" => Ok(RunStatus::Waiting),
        "success" => Ok(RunStatus::Success),
        "failed" => Ok(RunStatus::Failed),
        "skipped" => Ok(RunStatus::Skipped),
        "error" => Ok(RunStatus::Error),
        other => Err(Error::Internal(format!("unknown run status: {other}"))),
    }
}

pub fn step_status_to_text(s: StepStatus) -> &'static str {
    match s {
        StepStatus::Running => "running",
        StepStatus::Success => "success",
        StepStatus::Error => "error",
    }
}

pub fn step_status_from_text(s: &str) -> Result<StepStatus, Error> {
    match s {
        "running" => Ok(StepStatus::Running),
        "success" => Ok(StepStatus::Success),
        "error" => Ok(StepStatus::Error),
        other => Err(Error::Internal(format!("unknown step status: {other}"))),
    }
}

pub fn node_kind_to_text(k: NodeKind) -> &'static str {
    match k {
        NodeKind::Trigger => "trigger",
        NodeKind::Action => "action",
        NodeKind::Add => "add",
    }
}

pub fn node_kind_from_text(s: &str) -> Result<NodeKind, Error> {
    match s {
        "trigger" => Ok(NodeKind::Trigger),
        "action" => Ok(NodeKind::Action),
        "add" => Ok(NodeKind::Add),
        other => Err(Error::Internal(format!("unknown node kind: {other}"))),
    }
}

pub fn conversation_status_to_text(s: ConversationStatus) -> &'static str {
    match s {
        ConversationStatus::Waiting => "waiting",
        ConversationStatus::Completed => "completed",
    }
}

pub fn conversation_status_from_text(s: &str) -> Result<ConversationStatus, Error> {
    match s {
        "waiting" => Ok(ConversationStatus::Waiting),
        "completed" => Ok(ConversationStatus::Completed),
        other => Err(Error::Internal(format!("unknown conversation status: {other}"))),
    }
}

pub fn parameter_format_to_text(p: ParameterFormat) -> &'static str {
    match p {
        ParameterFormat::Positional => "positional",
        ParameterFormat::Named => "named",
    }
}

pub fn parameter_format_from_text(s: &str) -> Result<ParameterFormat, Error> {
    match s {
        "positional" => Ok(ParameterFormat::Positional),
        "named" => Ok(ParameterFormat::Named),
        other => Err(Error::Internal(format!("unknown parameter format: {other}"))),
    }
}

/// SQL `CASE` expression computing `ContactStatus::rank()` for `column`,
/// so forward-only transitions can be enforced inside a single atomic
/// `UPDATE ... WHERE` instead of a separate read-then-write round trip.
pub fn contact_rank_case_sql(column: &str) -> String {
    format!(
        "CASE {column} \
         WHEN 'pending' THEN 0 WHEN 'sending' THEN 1 WHEN 'sent' THEN 2 \
         WHEN 'delivered' THEN 3 WHEN 'read' THEN 4 ELSE 5 END"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_status_round_trips() {
        for s in [
            CampaignStatus::Draft,
            CampaignStatus::Scheduled,
            CampaignStatus::Sending,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Cancelled,
            CampaignStatus::Failed,
        ] {
            let text = campaign_status_to_text(s);
            assert_eq!(campaign_status_from_text(text).unwrap(), s);
        }
    }

    #[test]
    fn contact_status_round_trips() {
        for s in [
            ContactStatus::Pending,
            ContactStatus::Sending,
            ContactStatus::Sent,
            ContactStatus::Delivered,
            ContactStatus::Read,
            ContactStatus::Failed,
            ContactStatus::Skipped,
        ] {
            let text = contact_status_to_text(s);
            assert_eq!(contact_status_from_text(text).unwrap(), s);
        }
    }

    #[test]
    fn unknown_status_text_is_rejected() {
        assert!(campaign_status_from_text("bogus").is_err());
        assert!(contact_status_from_text("bogus").is_err());
        assert!(webhook_status_from_text("bogus").is_err());
    }

    #[test]
    fn rank_case_sql_orders_the_happy_path() {
        let sql = contact_rank_case_sql("status");
        assert!(sql.contains("WHEN 'pending' THEN 0"));
        assert!(sql.contains("WHEN 'read' THEN 4"));
        assert!(sql.ends_with("ELSE 5 END"));
    }
}
