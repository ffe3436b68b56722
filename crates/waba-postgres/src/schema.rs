//! DDL for the tables named in spec §6. Table names are fixed Rust
//! constants, never taken from configuration or user input, so the
//! identifier-validation discipline the teacher applies to a
//! caller-supplied table name doesn't apply here — every statement below
//! is a literal.

use tokio_postgres::Client;

use crate::error::SetupError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    visibility TEXT NOT NULL,
    active_version_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workflow_versions (
    id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL,
    nodes JSONB NOT NULL,
    edges JSONB NOT NULL,
    execution_config JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workflow_versions_workflow_id ON workflow_versions (workflow_id);

CREATE TABLE IF NOT EXISTS workflow_runs (
    id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL,
    version_id TEXT NOT NULL,
    status TEXT NOT NULL,
    trigger_type TEXT NOT NULL,
    input JSONB NOT NULL,
    output JSONB NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    finished_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_workflow_runs_workflow_id ON workflow_runs (workflow_id);

CREATE TABLE IF NOT EXISTS workflow_run_logs (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    node_name TEXT NOT NULL,
    node_type TEXT NOT NULL,
    status TEXT NOT NULL,
    input JSONB NOT NULL,
    output JSONB NOT NULL,
    error TEXT,
    started_at TIMESTAMPTZ NOT NULL,
    completed_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_workflow_run_logs_run_id ON workflow_run_logs (run_id);

CREATE TABLE IF NOT EXISTS workflow_conversations (
    id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL,
    run_id TEXT NOT NULL,
    phone TEXT NOT NULL,
    status TEXT NOT NULL,
    resume_node_id TEXT NOT NULL,
    variable_key TEXT NOT NULL,
    variables JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workflow_conversations_phone ON workflow_conversations (phone, status);
-- Enforces "at most one waiting conversation per (workflow_id, phone)"
-- (spec §3) as a hard backstop, not just an application-level check.
CREATE UNIQUE INDEX IF NOT EXISTS idx_workflow_conversations_waiting_unique
    ON workflow_conversations (workflow_id, phone)
    WHERE status = 'waiting';

CREATE TABLE IF NOT EXISTS campaigns (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    template_name TEXT NOT NULL,
    phone_number_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    scheduled_at TIMESTAMPTZ,
    started_at TIMESTAMPTZ,
    first_dispatch_at TIMESTAMPTZ,
    last_sent_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    cancelled_at TIMESTAMPTZ,
    template_variables JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns (status);

CREATE TABLE IF NOT EXISTS campaign_contacts (
    id TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL,
    contact_id TEXT NOT NULL,
    phone TEXT NOT NULL,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    custom_fields JSONB NOT NULL,
    status TEXT NOT NULL,
    message_id TEXT,
    sent_at TIMESTAMPTZ,
    delivered_at TIMESTAMPTZ,
    read_at TIMESTAMPTZ,
    skipped_at TIMESTAMPTZ,
    skip_code TEXT,
    skip_reason TEXT,
    error TEXT,
    rate_limited_retries INTEGER NOT NULL DEFAULT 0,
    reaper_retries INTEGER NOT NULL DEFAULT 0,
    claimed_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_campaign_contacts_campaign_status ON campaign_contacts (campaign_id, status);
CREATE INDEX IF NOT EXISTS idx_campaign_contacts_message_id ON campaign_contacts (message_id);

CREATE TABLE IF NOT EXISTS templates (
    name TEXT PRIMARY KEY,
    language TEXT NOT NULL,
    category TEXT NOT NULL,
    parameter_format TEXT NOT NULL,
    components JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS flow_submissions (
    message_id TEXT PRIMARY KEY,
    id TEXT NOT NULL,
    raw JSONB NOT NULL,
    mapped JSONB NOT NULL,
    campaign_id TEXT,
    contact_id TEXT
);

CREATE TABLE IF NOT EXISTS status_events (
    message_id TEXT NOT NULL,
    status TEXT NOT NULL,
    last_received_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (message_id, status)
);

CREATE TABLE IF NOT EXISTS campaign_trace_events (
    trace_id TEXT PRIMARY KEY,
    ts TIMESTAMPTZ NOT NULL,
    campaign_id TEXT,
    step TEXT NOT NULL,
    phase TEXT NOT NULL,
    ok BOOLEAN NOT NULL,
    ms BIGINT,
    batch_index BIGINT,
    contact_id TEXT,
    phone_masked TEXT,
    extra JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_campaign_trace_events_campaign_id ON campaign_trace_events (campaign_id);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value JSONB NOT NULL
);
"#;

/// Create every table this crate needs, idempotently. Called once from
/// `PostgresGateway::connect`.
pub async fn initialize(client: &Client) -> Result<(), SetupError> {
    client.batch_execute(SCHEMA_SQL).await.map_err(SetupError::Schema)
}
