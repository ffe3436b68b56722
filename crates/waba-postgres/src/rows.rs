//! `tokio_postgres::Row` -> domain struct mapping, one function per table.

use tokio_postgres::Row;
use waba_core::model::{
    Campaign, CampaignContact, ExecutionConfig, Template, TemplateComponent, Workflow,
    WorkflowConversation, WorkflowEdge, WorkflowNode, WorkflowRun, WorkflowVersion,
};
use waba_core::Error;

use crate::convert::{
    campaign_status_from_text, contact_status_from_text, conversation_status_from_text,
    parameter_format_from_text, run_status_from_text, trigger_type_from_text, visibility_from_text,
};

pub fn campaign_from_row(row: &Row) -> Result<Campaign, Error> {
    Ok(Campaign {
        id: row.get("id"),
        name: row.get("name"),
        template_name: row.get("template_name"),
        phone_number_id: row.get("phone_number_id"),
        status: campaign_status_from_text(row.get("status"))?,
        created_at: row.get("created_at"),
        scheduled_at: row.get("scheduled_at"),
        started_at: row.get("started_at"),
        first_dispatch_at: row.get("first_dispatch_at"),
        last_sent_at: row.get("last_sent_at"),
        completed_at: row.get("completed_at"),
        cancelled_at: row.get("cancelled_at"),
        template_variables: row.get("template_variables"),
    })
}

pub fn campaign_contact_from_row(row: &Row) -> Result<CampaignContact, Error> {
    let rate_limited_retries: i32 = row.get("rate_limited_retries");
    let reaper_retries: i32 = row.get("reaper_retries");
    Ok(CampaignContact {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        contact_id: row.get("contact_id"),
        phone: row.get("phone"),
        name: row.get("name"),
        email: row.get("email"),
        custom_fields: row.get("custom_fields"),
        status: contact_status_from_text(row.get("status"))?,
        message_id: row.get("message_id"),
        sent_at: row.get("sent_at"),
        delivered_at: row.get("delivered_at"),
        read_at: row.get("read_at"),
        skipped_at: row.get("skipped_at"),
        skip_code: row.get("skip_code"),
        skip_reason: row.get("skip_reason"),
        error: row.get("error"),
        rate_limited_retries: rate_limited_retries.max(0) as u32,
        reaper_retries: reaper_retries.max(0) as u32,
    })
}

pub fn template_from_row(row: &Row) -> Result<Template, Error> {
    let components_json: serde_json::Value = row.get("components");
    let components: Vec<TemplateComponent> = serde_json::from_value(components_json)?;
    Ok(Template {
        name: row.get("name"),
        language: row.get("language"),
        category: row.get("category"),
        parameter_format: parameter_format_from_text(row.get("parameter_format"))?,
        components,
    })
}

pub fn workflow_from_row(row: &Row) -> Result<Workflow, Error> {
    Ok(Workflow {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        visibility: visibility_from_text(row.get("visibility"))?,
        active_version_id: row.get("active_version_id"),
    })
}

pub fn workflow_version_from_row(row: &Row) -> Result<WorkflowVersion, Error> {
    let nodes_json: serde_json::Value = row.get("nodes");
    let edges_json: serde_json::Value = row.get("edges");
    let config_json: serde_json::Value = row.get("execution_config");
    let nodes: Vec<WorkflowNode> = serde_json::from_value(nodes_json)?;
    let edges: Vec<WorkflowEdge> = serde_json::from_value(edges_json)?;
    let execution_config: ExecutionConfig = serde_json::from_value(config_json)?;
    Ok(WorkflowVersion {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        nodes,
        edges,
        execution_config,
    })
}

pub fn workflow_run_from_row(row: &Row) -> Result<WorkflowRun, Error> {
    Ok(WorkflowRun {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        version_id: row.get("version_id"),
        status: run_status_from_text(row.get("status"))?,
        trigger_type: trigger_type_from_text(row.get("trigger_type"))?,
        input: row.get("input"),
        output: row.get("output"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
    })
}

pub fn workflow_conversation_from_row(row: &Row) -> Result<WorkflowConversation, Error> {
    let variables_json: serde_json::Value = row.get("variables");
    let variables = serde_json::from_value(variables_json)?;
    Ok(WorkflowConversation {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        run_id: row.get("run_id"),
        phone: row.get("phone"),
        status: conversation_status_from_text(row.get("status"))?,
        resume_node_id: row.get("resume_node_id"),
        variable_key: row.get("variable_key"),
        variables,
    })
}
