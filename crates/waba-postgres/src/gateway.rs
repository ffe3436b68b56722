//! `PostgreSQL`-backed [`PersistenceGateway`] (spec §4.B, §6).
//!
//! Grounded on `dashflow-postgres-checkpointer`'s connection and schema
//! pattern: a plain `NoTls` connection with the connection future driven
//! by a spawned background task, `CREATE TABLE IF NOT EXISTS` run once at
//! construction, and every data value passed as a query parameter. Unlike
//! that crate's single caller-supplied table name, every table name here
//! is a fixed literal, so `validate_identifier`-style defense has nothing
//! to validate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio_postgres::NoTls;
use tracing::{error, info};

use waba_core::gateway::{
    ContactOutcome, OpenConversationRequest, PersistenceGateway, StatusApplyOutcome,
    StatusEventInput,
};
use waba_core::model::{
    Campaign, CampaignContact, CampaignStatus, FlowSubmission, Template, Workflow,
    WorkflowConversation, WorkflowRun, WorkflowRunLog, WorkflowVersion,
};
use waba_core::{ids, Error, Result};

use crate::convert::{
    campaign_status_to_text, contact_rank_case_sql, contact_status_to_text,
    conversation_status_to_text, node_kind_to_text, parameter_format_to_text, run_status_to_text,
    step_status_to_text, trigger_type_to_text, visibility_to_text, webhook_status_to_text,
};
use crate::error::{from_postgres, SetupError};
use crate::rows;
use crate::schema;

/// Owns the single `tokio_postgres::Client` this process uses. Shared as
/// `Arc<PostgresGateway>` so the same connection backs both the
/// [`PersistenceGateway`] and `waba_trace::TraceStore` implementations.
pub struct PostgresGateway {
    client: tokio_postgres::Client,
}

impl PostgresGateway {
    /// Connect and run schema setup. `connection_string` is a libpq
    /// keyword/value or URI string (e.g. `host=localhost user=waba
    /// dbname=waba`).
    pub async fn connect(connection_string: &str) -> std::result::Result<Self, SetupError> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(SetupError::Connection)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection driver terminated");
            }
        });

        schema::initialize(&client).await?;
        info!("postgres gateway connected and schema initialized");
        Ok(Self { client })
    }

    pub(crate) fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    async fn claim_pending(
        &self,
        campaign_id: &str,
        batch_size: u32,
    ) -> Result<Vec<CampaignContact>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query(
                "UPDATE campaign_contacts
                 SET status = 'sending', claimed_at = now()
                 WHERE id IN (
                     SELECT id FROM campaign_contacts
                     WHERE campaign_id = $1 AND status = 'pending'
                     ORDER BY id
                     LIMIT $2
                     FOR UPDATE SKIP LOCKED
                 )
                 RETURNING *",
                &[&campaign_id, &i64::from(batch_size)],
            )
            .await
            .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        rows.iter().map(rows::campaign_contact_from_row).collect()
    }

    async fn mark_contact_result(&self, row_id: &str, outcome: ContactOutcome) -> Result<()> {
        let rank = contact_rank_case_sql("status");
        let new_rank = contact_rank_case_sql("$2");
        let skipped_at = outcome.skip_code.as_ref().map(|_| Utc::now());
        let sql = format!(
            "UPDATE campaign_contacts SET
                 status = $2,
                 message_id = COALESCE($3, message_id),
                 error = COALESCE($4, error),
                 sent_at = COALESCE($5, sent_at),
                 skip_code = COALESCE($6, skip_code),
                 skip_reason = COALESCE($7, skip_reason),
                 skipped_at = COALESCE($8, skipped_at)
             WHERE id = $1 AND ({rank}) <= ({new_rank})"
        );
        let affected = self
            .client
            .execute(
                &sql,
                &[
                    &row_id,
                    &contact_status_to_text(outcome.status),
                    &outcome.message_id,
                    &outcome.error,
                    &outcome.sent_at,
                    &outcome.skip_code,
                    &outcome.skip_reason,
                    &skipped_at,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        if affected == 0 {
            // Either a regression (silently rejected, matches the
            // in-memory gateway) or the row doesn't exist. Disambiguate
            // so callers still see `NotFound` for a bad id.
            let exists = self
                .client
                .query_opt("SELECT 1 FROM campaign_contacts WHERE id = $1", &[&row_id])
                .await
                .map_err(|e| from_postgres(e, "campaign_contacts"))?;
            if exists.is_none() {
                return Err(Error::NotFound(format!("campaign_contacts/{row_id}")));
            }
        }
        Ok(())
    }

    async fn requeue_rate_limited(&self, row_id: &str, max_retries: u32) -> Result<bool> {
        let row = self
            .client
            .query_opt(
                "UPDATE campaign_contacts
                 SET rate_limited_retries = rate_limited_retries + 1,
                     status = CASE WHEN rate_limited_retries + 1 <= $2 THEN 'pending' ELSE status END
                 WHERE id = $1
                 RETURNING rate_limited_retries <= $2",
                &[&row_id, &(i64::from(max_retries))],
            )
            .await
            .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        let Some(row) = row else {
            return Err(Error::NotFound(format!("campaign_contacts/{row_id}")));
        };
        Ok(row.get(0))
    }

    async fn apply_status_event(&self, event: StatusEventInput) -> Result<StatusApplyOutcome> {
        let inserted = self
            .client
            .execute(
                "INSERT INTO status_events (message_id, status, last_received_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT DO NOTHING",
                &[
                    &event.message_id,
                    &webhook_status_to_text(event.status),
                    &event.ts,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "status_events"))?;
        if inserted == 0 {
            return Ok(StatusApplyOutcome::AlreadyApplied);
        }

        let row = self
            .client
            .query_opt(
                "SELECT id FROM campaign_contacts WHERE message_id = $1",
                &[&event.message_id],
            )
            .await
            .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        let Some(row) = row else {
            // Roll back the dedup row: the contact may not exist yet
            // because our own send hasn't landed, so a reconciliation
            // retry of this exact event must be able to re-attempt it.
            self.client
                .execute(
                    "DELETE FROM status_events WHERE message_id = $1 AND status = $2",
                    &[&event.message_id, &webhook_status_to_text(event.status)],
                )
                .await
                .map_err(|e| from_postgres(e, "status_events"))?;
            return Ok(StatusApplyOutcome::NoMatchingContact);
        };
        let row_id: String = row.get(0);

        use waba_core::model::WebhookStatus;
        let rank = contact_rank_case_sql("status");
        match event.status {
            WebhookStatus::Sent => {
                self.client
                    .execute(
                        &format!(
                            "UPDATE campaign_contacts SET
                                 sent_at = COALESCE(sent_at, $2),
                                 status = CASE WHEN ({rank}) < 2 THEN 'sent' ELSE status END
                             WHERE id = $1"
                        ),
                        &[&row_id, &event.ts],
                    )
                    .await
            }
            WebhookStatus::Delivered => {
                self.client
                    .execute(
                        &format!(
                            "UPDATE campaign_contacts SET
                                 sent_at = COALESCE(sent_at, $2),
                                 delivered_at = COALESCE(delivered_at, $2),
                                 status = CASE WHEN ({rank}) < 3 THEN 'delivered' ELSE status END
                             WHERE id = $1"
                        ),
                        &[&row_id, &event.ts],
                    )
                    .await
            }
            WebhookStatus::Read => {
                self.client
                    .execute(
                        &format!(
                            "UPDATE campaign_contacts SET
                                 sent_at = COALESCE(sent_at, $2),
                                 delivered_at = COALESCE(delivered_at, $2),
                                 read_at = COALESCE(read_at, $2),
                                 status = CASE WHEN ({rank}) < 4 THEN 'read' ELSE status END
                             WHERE id = $1"
                        ),
                        &[&row_id, &event.ts],
                    )
                    .await
            }
            WebhookStatus::Failed => {
                // Only reachable from pending/sending (spec §3: the
                // sent->delivered->read chain never fails backwards).
                self.client
                    .execute(
                        &format!(
                            "UPDATE campaign_contacts SET
                                 status = 'failed', error = $3
                             WHERE id = $1 AND ({rank}) < 2"
                        ),
                        &[&row_id, &event.ts, &event.error_detail],
                    )
                    .await
            }
        }
        .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        Ok(StatusApplyOutcome::Applied)
    }

    async fn open_paused_conversation(
        &self,
        req: OpenConversationRequest,
    ) -> Result<WorkflowConversation> {
        let conversation = WorkflowConversation {
            id: ids::new_id(),
            workflow_id: req.workflow_id.clone(),
            run_id: req.run_id,
            phone: req.phone.clone(),
            status: waba_core::model::ConversationStatus::Waiting,
            resume_node_id: req.resume_node_id,
            variable_key: req.variable_key,
            variables: req.variables,
        };
        let variables_json = serde_json::to_value(&conversation.variables)?;
        let result = self
            .client
            .execute(
                "INSERT INTO workflow_conversations
                     (id, workflow_id, run_id, phone, status, resume_node_id, variable_key, variables)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &conversation.id,
                    &conversation.workflow_id,
                    &conversation.run_id,
                    &conversation.phone,
                    &conversation_status_to_text(conversation.status),
                    &conversation.resume_node_id,
                    &conversation.variable_key,
                    &variables_json,
                ],
            )
            .await;
        match result {
            Ok(_) => Ok(conversation),
            Err(e) => {
                if let Some(db_err) = e.as_db_error() {
                    if db_err.code() == &tokio_postgres::error::SqlState::UNIQUE_VIOLATION {
                        return Err(Error::ConversationConflict {
                            workflow_id: req.workflow_id,
                            phone: req.phone,
                        });
                    }
                }
                Err(from_postgres(e, "workflow_conversations"))
            }
        }
    }

    async fn complete_paused_conversation(
        &self,
        id: &str,
        variables_merged: HashMap<String, Value>,
    ) -> Result<()> {
        let variables_json = serde_json::to_value(&variables_merged)?;
        let affected = self
            .client
            .execute(
                "UPDATE workflow_conversations SET status = 'completed', variables = $2 WHERE id = $1",
                &[&id, &variables_json],
            )
            .await
            .map_err(|e| from_postgres(e, "workflow_conversations"))?;
        if affected == 0 {
            return Err(Error::NotFound(format!("workflow_conversations/{id}")));
        }
        Ok(())
    }

    async fn find_waiting_conversation(
        &self,
        workflow_id: &str,
        phone: &str,
    ) -> Result<Option<WorkflowConversation>> {
        let row = self
            .client
            .query_opt(
                "SELECT * FROM workflow_conversations
                 WHERE workflow_id = $1 AND phone = $2 AND status = 'waiting'",
                &[&workflow_id, &phone],
            )
            .await
            .map_err(|e| from_postgres(e, "workflow_conversations"))?;
        row.as_ref().map(rows::workflow_conversation_from_row).transpose()
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<WorkflowConversation>> {
        let row = self
            .client
            .query_opt("SELECT * FROM workflow_conversations WHERE id = $1", &[&id])
            .await
            .map_err(|e| from_postgres(e, "workflow_conversations"))?;
        row.as_ref().map(rows::workflow_conversation_from_row).transpose()
    }

    async fn find_any_waiting_conversation(
        &self,
        phone: &str,
    ) -> Result<Option<WorkflowConversation>> {
        let row = self
            .client
            .query_opt(
                "SELECT * FROM workflow_conversations WHERE phone = $1 AND status = 'waiting'",
                &[&phone],
            )
            .await
            .map_err(|e| from_postgres(e, "workflow_conversations"))?;
        row.as_ref().map(rows::workflow_conversation_from_row).transpose()
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let row = self
            .client
            .query_opt("SELECT * FROM workflows WHERE id = $1", &[&id])
            .await
            .map_err(|e| from_postgres(e, "workflows"))?;
        row.as_ref().map(rows::workflow_from_row).transpose()
    }

    async fn get_workflow_version(&self, id: &str) -> Result<Option<WorkflowVersion>> {
        let row = self
            .client
            .query_opt("SELECT * FROM workflow_versions WHERE id = $1", &[&id])
            .await
            .map_err(|e| from_postgres(e, "workflow_versions"))?;
        row.as_ref().map(rows::workflow_version_from_row).transpose()
    }

    async fn put_workflow(&self, workflow: Workflow, version: WorkflowVersion) -> Result<()> {
        let nodes_json = serde_json::to_value(&version.nodes)?;
        let edges_json = serde_json::to_value(&version.edges)?;
        let config_json = serde_json::to_value(version.execution_config)?;
        self.client
            .execute(
                "INSERT INTO workflow_versions (id, workflow_id, nodes, edges, execution_config)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (id) DO UPDATE SET
                     workflow_id = EXCLUDED.workflow_id,
                     nodes = EXCLUDED.nodes,
                     edges = EXCLUDED.edges,
                     execution_config = EXCLUDED.execution_config",
                &[
                    &version.id,
                    &version.workflow_id,
                    &nodes_json,
                    &edges_json,
                    &config_json,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "workflow_versions"))?;
        self.client
            .execute(
                "INSERT INTO workflows (id, name, description, visibility, active_version_id)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (id) DO UPDATE SET
                     name = EXCLUDED.name,
                     description = EXCLUDED.description,
                     visibility = EXCLUDED.visibility,
                     active_version_id = EXCLUDED.active_version_id",
                &[
                    &workflow.id,
                    &workflow.name,
                    &workflow.description,
                    &visibility_to_text(workflow.visibility),
                    &workflow.active_version_id,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "workflows"))?;
        Ok(())
    }

    async fn create_run(&self, run: WorkflowRun) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO workflow_runs
                     (id, workflow_id, version_id, status, trigger_type, input, output, started_at, finished_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &run.id,
                    &run.workflow_id,
                    &run.version_id,
                    &run_status_to_text(run.status),
                    &trigger_type_to_text(run.trigger_type),
                    &run.input,
                    &run.output,
                    &run.started_at,
                    &run.finished_at,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "workflow_runs"))?;
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<WorkflowRun>> {
        let row = self
            .client
            .query_opt("SELECT * FROM workflow_runs WHERE id = $1", &[&id])
            .await
            .map_err(|e| from_postgres(e, "workflow_runs"))?;
        row.as_ref().map(rows::workflow_run_from_row).transpose()
    }

    async fn update_run(&self, run: WorkflowRun) -> Result<()> {
        let affected = self
            .client
            .execute(
                "UPDATE workflow_runs SET
                     status = $2, input = $3, output = $4, finished_at = $5
                 WHERE id = $1",
                &[
                    &run.id,
                    &run_status_to_text(run.status),
                    &run.input,
                    &run.output,
                    &run.finished_at,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "workflow_runs"))?;
        if affected == 0 {
            return Err(Error::NotFound(format!("workflow_runs/{}", run.id)));
        }
        Ok(())
    }

    async fn append_run_log(&self, log: WorkflowRunLog) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO workflow_run_logs
                     (id, run_id, node_id, node_name, node_type, status, input, output, error, started_at, completed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    &log.id,
                    &log.run_id,
                    &log.node_id,
                    &log.node_name,
                    &node_kind_to_text(log.node_type),
                    &step_status_to_text(log.status),
                    &log.input,
                    &log.output,
                    &log.error,
                    &log.started_at,
                    &log.completed_at,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "workflow_run_logs"))?;
        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let row = self
            .client
            .query_opt("SELECT * FROM campaigns WHERE id = $1", &[&id])
            .await
            .map_err(|e| from_postgres(e, "campaigns"))?;
        row.as_ref().map(rows::campaign_from_row).transpose()
    }

    async fn put_campaign(&self, campaign: Campaign) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO campaigns
                     (id, name, template_name, phone_number_id, status, created_at, scheduled_at,
                      started_at, first_dispatch_at, last_sent_at, completed_at, cancelled_at,
                      template_variables)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                 ON CONFLICT (id) DO UPDATE SET
                     name = EXCLUDED.name,
                     template_name = EXCLUDED.template_name,
                     phone_number_id = EXCLUDED.phone_number_id,
                     status = EXCLUDED.status,
                     scheduled_at = EXCLUDED.scheduled_at,
                     started_at = EXCLUDED.started_at,
                     first_dispatch_at = EXCLUDED.first_dispatch_at,
                     last_sent_at = EXCLUDED.last_sent_at,
                     completed_at = EXCLUDED.completed_at,
                     cancelled_at = EXCLUDED.cancelled_at,
                     template_variables = EXCLUDED.template_variables",
                &[
                    &campaign.id,
                    &campaign.name,
                    &campaign.template_name,
                    &campaign.phone_number_id,
                    &campaign_status_to_text(campaign.status),
                    &campaign.created_at,
                    &campaign.scheduled_at,
                    &campaign.started_at,
                    &campaign.first_dispatch_at,
                    &campaign.last_sent_at,
                    &campaign.completed_at,
                    &campaign.cancelled_at,
                    &campaign.template_variables,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "campaigns"))?;
        Ok(())
    }

    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let rows = self
            .client
            .query(
                "SELECT * FROM campaigns WHERE status = $1",
                &[&campaign_status_to_text(status)],
            )
            .await
            .map_err(|e| from_postgres(e, "campaigns"))?;
        rows.iter().map(rows::campaign_from_row).collect()
    }

    async fn insert_contacts(&self, contacts: Vec<CampaignContact>) -> Result<()> {
        for c in contacts {
            self.client
                .execute(
                    "INSERT INTO campaign_contacts
                         (id, campaign_id, contact_id, phone, name, email, custom_fields, status,
                          message_id, sent_at, delivered_at, read_at, skipped_at, skip_code,
                          skip_reason, error, rate_limited_retries, reaper_retries)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
                    &[
                        &c.id,
                        &c.campaign_id,
                        &c.contact_id,
                        &c.phone,
                        &c.name,
                        &c.email,
                        &c.custom_fields,
                        &contact_status_to_text(c.status),
                        &c.message_id,
                        &c.sent_at,
                        &c.delivered_at,
                        &c.read_at,
                        &c.skipped_at,
                        &c.skip_code,
                        &c.skip_reason,
                        &c.error,
                        &(c.rate_limited_retries as i32),
                        &(c.reaper_retries as i32),
                    ],
                )
                .await
                .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        }
        Ok(())
    }

    async fn get_contacts(&self, campaign_id: &str) -> Result<Vec<CampaignContact>> {
        let rows = self
            .client
            .query(
                "SELECT * FROM campaign_contacts WHERE campaign_id = $1",
                &[&campaign_id],
            )
            .await
            .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        rows.iter().map(rows::campaign_contact_from_row).collect()
    }

    async fn get_contact_by_message_id(&self, message_id: &str) -> Result<Option<CampaignContact>> {
        let row = self
            .client
            .query_opt(
                "SELECT * FROM campaign_contacts WHERE message_id = $1",
                &[&message_id],
            )
            .await
            .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        row.as_ref().map(rows::campaign_contact_from_row).transpose()
    }

    async fn skip_all_pending(&self, campaign_id: &str, skip_code: &str) -> Result<u64> {
        let affected = self
            .client
            .execute(
                "UPDATE campaign_contacts SET
                     status = 'skipped', skip_code = $2, skip_reason = 'campaign cancelled',
                     skipped_at = now()
                 WHERE campaign_id = $1 AND status = 'pending'",
                &[&campaign_id, &skip_code],
            )
            .await
            .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        Ok(affected)
    }

    async fn reap_stale_sending(&self, older_than: DateTime<Utc>) -> Result<Vec<CampaignContact>> {
        let rows = self
            .client
            .query(
                "UPDATE campaign_contacts
                 SET status = 'pending', reaper_retries = reaper_retries + 1
                 WHERE id IN (
                     SELECT id FROM campaign_contacts
                     WHERE status = 'sending' AND claimed_at < $1
                     FOR UPDATE SKIP LOCKED
                 )
                 RETURNING *",
                &[&older_than],
            )
            .await
            .map_err(|e| from_postgres(e, "campaign_contacts"))?;
        rows.iter().map(rows::campaign_contact_from_row).collect()
    }

    async fn get_template(&self, name: &str) -> Result<Option<Template>> {
        let row = self
            .client
            .query_opt("SELECT * FROM templates WHERE name = $1", &[&name])
            .await
            .map_err(|e| from_postgres(e, "templates"))?;
        row.as_ref().map(rows::template_from_row).transpose()
    }

    async fn put_template(&self, template: Template) -> Result<()> {
        let components_json = serde_json::to_value(&template.components)?;
        self.client
            .execute(
                "INSERT INTO templates (name, language, category, parameter_format, components)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (name) DO UPDATE SET
                     language = EXCLUDED.language,
                     category = EXCLUDED.category,
                     parameter_format = EXCLUDED.parameter_format,
                     components = EXCLUDED.components",
                &[
                    &template.name,
                    &template.language,
                    &template.category,
                    &parameter_format_to_text(template.parameter_format),
                    &components_json,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "templates"))?;
        Ok(())
    }

    async fn upsert_flow_submission(&self, submission: FlowSubmission) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO flow_submissions (message_id, id, raw, mapped, campaign_id, contact_id)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (message_id) DO UPDATE SET
                     id = EXCLUDED.id,
                     raw = EXCLUDED.raw,
                     mapped = EXCLUDED.mapped,
                     campaign_id = EXCLUDED.campaign_id,
                     contact_id = EXCLUDED.contact_id",
                &[
                    &submission.message_id,
                    &submission.id,
                    &submission.raw,
                    &submission.mapped,
                    &submission.campaign_id,
                    &submission.contact_id,
                ],
            )
            .await
            .map_err(|e| from_postgres(e, "flow_submissions"))?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        let row = self
            .client
            .query_opt("SELECT value FROM settings WHERE key = $1", &[&key])
            .await
            .map_err(|e| from_postgres(e, "settings"))?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn put_setting(&self, key: &str, value: Value) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO settings (key, value) VALUES ($1, $2)
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
                &[&key, &value],
            )
            .await
            .map_err(|e| from_postgres(e, "settings"))?;
        Ok(())
    }
}
