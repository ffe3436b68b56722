//! Campaign and per-recipient entities (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a `Campaign` (spec §3, §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl CampaignStatus {
    /// Cancelling is a no-op (not a conflict) when already `Cancelled`,
    /// and a conflict for every other terminal status (spec §6).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CampaignStatus::Completed | CampaignStatus::Cancelled | CampaignStatus::Failed
        )
    }
}

/// Derived, reconcilable counters (spec §3: "must be reconcilable from
/// `campaign_contacts`"). Never stored as independently-mutated fields;
/// always recomputed from the contact rows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CampaignCounters {
    pub recipients: u64,
    pub sent: u64,
    pub delivered: u64,
    pub read: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl CampaignCounters {
    /// `sent + delivered + read`, per spec §4.E "Counters".
    #[must_use]
    pub fn sent_effective(&self) -> u64 {
        self.sent + self.delivered + self.read
    }

    /// `delivered + read`, per spec §4.E "Counters".
    #[must_use]
    pub fn delivered_effective(&self) -> u64 {
        self.delivered + self.read
    }
}

/// Named outbound batch (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub template_name: String,
    /// The sending WABA phone number id; the Turbo key and `Provider.send`
    /// target (spec §5 "Turbo state is shared ... for a sender").
    pub phone_number_id: String,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub first_dispatch_at: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Variable bindings shared across recipients (literal/contact-field/
    /// custom-field bindings resolved per-contact by `waba-precheck`).
    pub template_variables: serde_json::Value,
}

/// Per-recipient status (spec §3). Transitions are forward-only along
/// `pending -> sending -> (sent -> delivered -> read) | failed | skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContactStatus {
    Pending,
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
    Skipped,
}

impl ContactStatus {
    /// Rank used by the forward-only invariant. `Failed`/`Skipped` share
    /// the terminal tier: neither can be reached from `Delivered`/`Read`,
    /// enforced separately by the gateway, not by this rank alone.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            ContactStatus::Pending => 0,
            ContactStatus::Sending => 1,
            ContactStatus::Sent => 2,
            ContactStatus::Delivered => 3,
            ContactStatus::Read => 4,
            ContactStatus::Failed | ContactStatus::Skipped => 5,
        }
    }

    /// True once a terminal status (including the webhook-driven chain's
    /// own terminal, `Read`) is reached.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ContactStatus::Read | ContactStatus::Failed | ContactStatus::Skipped
        )
    }
}

/// Per-recipient row (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignContact {
    pub id: String,
    pub campaign_id: String,
    pub contact_id: String,
    pub phone: String,
    pub name: String,
    pub email: String,
    pub custom_fields: serde_json::Value,
    pub status: ContactStatus,
    pub message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,
    pub skip_code: Option<String>,
    pub skip_reason: Option<String>,
    pub error: Option<String>,
    /// Count of `rate_limited` requeues already spent on this row
    /// (spec §9 Open Question: bounded, configurable, default 3).
    pub rate_limited_retries: u32,
    /// Count of times a `sending`-reaper returned this row to `pending`.
    pub reaper_retries: u32,
}

/// Webhook-delivered status notification (spec §3, §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Idempotent record of one webhook status signal (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub message_id: String,
    pub status: WebhookStatus,
    pub last_received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_derive_effective_totals() {
        let c = CampaignCounters {
            recipients: 10,
            sent: 2,
            delivered: 3,
            read: 4,
            failed: 1,
            skipped: 0,
        };
        assert_eq!(c.sent_effective(), 9);
        assert_eq!(c.delivered_effective(), 7);
    }

    #[test]
    fn status_rank_is_monotonic_along_happy_path() {
        assert!(ContactStatus::Pending.rank() < ContactStatus::Sending.rank());
        assert!(ContactStatus::Sending.rank() < ContactStatus::Sent.rank());
        assert!(ContactStatus::Sent.rank() < ContactStatus::Delivered.rank());
        assert!(ContactStatus::Delivered.rank() < ContactStatus::Read.rank());
    }
}
