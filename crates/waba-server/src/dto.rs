//! Wire DTOs for the HTTP surface (spec §6). Kept separate from the
//! domain types in `waba-core`/`waba-workflow`, which are not
//! camelCase-annotated: the wire format is a presentation concern of this
//! crate alone.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use waba_core::model::{CampaignContact, ContactStatus, RunStatus};
use waba_precheck::PrecheckResult;
use waba_workflow::RunOutcome;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequestDto {
    pub workflow_id: String,
    #[serde(default)]
    pub input: Value,
    pub start_node_ids: Option<Vec<String>>,
    pub initial_variables: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeInput {
    pub from: String,
    pub to: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequestDto {
    pub workflow_id: String,
    pub conversation_id: String,
    pub input: ResumeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcomeDto {
    pub execution_id: String,
    pub status: RunStatus,
    pub output: Value,
}

impl From<RunOutcome> for RunOutcomeDto {
    fn from(o: RunOutcome) -> Self {
        Self { execution_id: o.execution_id, status: o.status, output: o.output }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcomeDto {
    pub already_cancelled: bool,
    pub skipped: u64,
}

/// One row of `POST /campaigns/precheck`'s `contacts[]` input. Ad hoc and
/// never persisted; distinct from `CampaignContact` which carries
/// campaign-scoped state this dry run doesn't have yet.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckContactDto {
    #[serde(default)]
    pub contact_id: String,
    pub phone: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub custom_fields: Value,
}

impl PrecheckContactDto {
    pub fn into_campaign_contact(self) -> CampaignContact {
        CampaignContact {
            id: String::new(),
            campaign_id: String::new(),
            contact_id: self.contact_id,
            phone: self.phone,
            name: self.name,
            email: self.email,
            custom_fields: self.custom_fields,
            status: ContactStatus::Pending,
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
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckRequestDto {
    pub template_name: String,
    pub contacts: Vec<PrecheckContactDto>,
    #[serde(default)]
    pub template_variables: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckTotalsDto {
    pub total: u64,
    pub valid: u64,
    pub skipped: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckResultDto {
    pub ok: bool,
    pub normalized_phone: Option<String>,
    pub skip_code: Option<String>,
    pub reason: Option<String>,
    pub missing: Vec<String>,
}

impl From<PrecheckResult> for PrecheckResultDto {
    fn from(r: PrecheckResult) -> Self {
        Self {
            ok: r.ok,
            normalized_phone: r.normalized_phone,
            skip_code: r.skip_code,
            reason: r.reason,
            missing: r.missing,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckResponseDto {
    pub ok: bool,
    pub totals: PrecheckTotalsDto,
    pub results: Vec<PrecheckResultDto>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}
