//! Process-wide settings keys (spec §6).
//!
//! Settings are stored as opaque JSON values keyed by string; any key may
//! be absent, in which case the documented default applies.

/// Key for the webhook verification token (spec §4.F).
pub const WEBHOOK_VERIFY_TOKEN: &str = "webhook_verify_token";
/// Key for the Turbo rate controller's static configuration (spec §4.C).
pub const TURBO_CONFIG: &str = "turbo.config";
/// Key prefix for the Turbo rate controller's per-sender runtime state.
/// Full key is `turbo.state.<phone_number_id>`.
pub const TURBO_STATE_PREFIX: &str = "turbo.state";
/// Key for the workflow engine's default per-step retry policy (spec §6).
pub const WORKFLOW_EXECUTION_CONFIG: &str = "workflow_execution_config";
/// Key for how long an inbox stays in human-handoff mode.
pub const INBOX_HUMAN_MODE_TIMEOUT_HOURS: &str = "inbox_human_mode_timeout_hours";
/// Key identifying the workflow used for booking flows.
pub const BOOKING_FLOW_ID: &str = "booking_flow_id";
/// Key for the Campaign Dispatcher's static configuration (spec §4.E).
pub const DISPATCHER_CONFIG: &str = "dispatcher.config";

/// Build the full settings key for one sender's Turbo runtime state.
#[must_use]
pub fn turbo_state_key(phone_number_id: &str) -> String {
    format!("{TURBO_STATE_PREFIX}.{phone_number_id}")
}
