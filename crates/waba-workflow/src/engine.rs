//! The Workflow Engine (spec §4.D): validates the graph, gates on the
//! trigger, walks reachable nodes, and implements pause/resume as an
//! explicit continuation rather than a suspended coroutine (spec §9
//! Design Notes: "a pausing node returns a sentinel value describing
//! exactly where to resume").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use waba_core::model::{ExecutionConfig, NodeKind, RunStatus, StepStatus, TriggerType, WorkflowRun, WorkflowRunLog};
use waba_core::{ids, Error, OpenConversationRequest, PersistenceGateway, Result, TraceEmitter};
use waba_provider::ProviderClient;

use crate::actions::{ActionContext, ActionRegistry};
use crate::graph::{reachable_order, successors, trigger_node, validate_workflow_schema};

/// `POST /workflow/run` request body (spec §6).
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub workflow_id: String,
    pub input: Value,
    pub start_node_ids: Option<Vec<String>>,
    pub initial_variables: Option<HashMap<String, Value>>,
}

/// `POST /workflow/{id}/resume` request body (spec §6).
#[derive(Debug, Clone)]
pub struct ResumeRequest {
    pub workflow_id: String,
    pub conversation_id: String,
    pub from: String,
    pub to: String,
    pub message: String,
}

/// Shared response shape for `run` and `resume` (spec §6).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub execution_id: String,
    pub status: RunStatus,
    pub output: Value,
}

pub struct WorkflowEngine {
    gateway: Arc<dyn PersistenceGateway>,
    provider: Arc<dyn ProviderClient>,
    actions: ActionRegistry,
    trace: Arc<dyn TraceEmitter>,
}

impl WorkflowEngine {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        provider: Arc<dyn ProviderClient>,
        trace: Arc<dyn TraceEmitter>,
    ) -> Self {
        Self {
            gateway,
            provider,
            actions: ActionRegistry::with_defaults(),
            trace,
        }
    }

    /// `POST /workflow/run` (spec §6, §4.D execution contract).
    pub async fn run(&self, req: RunRequest) -> Result<RunOutcome> {
        let workflow = self
            .gateway
            .get_workflow(&req.workflow_id)
            .await?
            .ok_or_else(|| Error::NotFound("workflow not found".to_string()))?;
        let version = self
            .gateway
            .get_workflow_version(&workflow.active_version_id)
            .await?
            .ok_or_else(|| Error::Validation("invalid_workflow".to_string()))?;
        validate_workflow_schema(&version).map_err(|_| Error::Validation("invalid_workflow".to_string()))?;

        let trigger = trigger_node(&version).map_err(|_| Error::Validation("invalid_workflow".to_string()))?;
        let trigger_type = trigger.trigger_type.unwrap_or(TriggerType::Manual);

        if trigger_type == TriggerType::Keywords {
            let message = req
                .input
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_lowercase();
            let keywords: Vec<String> = trigger
                .config
                .get("keywords")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_lowercase)
                        .collect()
                })
                .unwrap_or_default();
            let matched = keywords.iter().any(|k| message.contains(k.as_str()));
            if !matched {
                let output = serde_json::json!({ "reason": "keyword_not_matched" });
                let run = WorkflowRun {
                    id: ids::new_id(),
                    workflow_id: workflow.id.clone(),
                    version_id: version.id.clone(),
                    status: RunStatus::Skipped,
                    trigger_type,
                    input: req.input.clone(),
                    output: output.clone(),
                    started_at: Utc::now(),
                    finished_at: Some(Utc::now()),
                };
                let execution_id = run.id.clone();
                self.gateway.create_run(run).await?;
                return Ok(RunOutcome {
                    execution_id,
                    status: RunStatus::Skipped,
                    output,
                });
            }
        }

        let start_ids = req
            .start_node_ids
            .clone()
            .unwrap_or_else(|| successors(&version, &trigger.id).into_iter().map(String::from).collect());

        let mut variables = req.initial_variables.clone().unwrap_or_default();
        if let Some(obj) = req.input.as_object() {
            for (k, v) in obj {
                variables.insert(k.clone(), v.clone());
            }
        }
        let phone = variables
            .get("from")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let run = WorkflowRun {
            id: ids::new_id(),
            workflow_id: workflow.id.clone(),
            version_id: version.id.clone(),
            status: RunStatus::Running,
            trigger_type,
            input: req.input.clone(),
            output: Value::Null,
            started_at: Utc::now(),
            finished_at: None,
        };
        let execution_id = run.id.clone();
        self.gateway.create_run(run.clone()).await?;
        self.trace.emit(waba_core::model::TraceEvent {
            trace_id: ids::new_id(),
            ts: Utc::now(),
            campaign_id: None,
            step: "workflow".to_string(),
            phase: "workflow_run_start".to_string(),
            ok: true,
            ms: None,
            batch_index: None,
            contact_id: None,
            phone_masked: Some(waba_core::model::mask_phone(&phone)),
            extra: serde_json::json!({ "workflow_id": workflow.id, "run_id": execution_id }),
        });

        self.walk(run, &version, start_ids, &mut variables, &phone).await
    }

    /// `POST /workflow/{id}/resume` (spec §6, §4.D "Resume semantics").
    pub async fn resume(&self, req: ResumeRequest) -> Result<RunOutcome> {
        let message = req.message.trim();
        if message.is_empty() {
            return Err(Error::Validation("missing_inbound_message".to_string()));
        }

        let conversation = self
            .gateway
            .get_conversation(&req.conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound("conversation_not_found".to_string()))?;
        if conversation.status != waba_core::model::ConversationStatus::Waiting {
            return Err(Error::NotFound("conversation_not_found".to_string()));
        }
        if conversation.workflow_id != req.workflow_id {
            return Err(Error::Conflict("conversation_workflow_mismatch".to_string()));
        }

        let workflow = self
            .gateway
            .get_workflow(&conversation.workflow_id)
            .await?
            .ok_or_else(|| Error::Validation("invalid_workflow".to_string()))?;
        let version = self
            .gateway
            .get_workflow_version(&workflow.active_version_id)
            .await?
            .ok_or_else(|| Error::Validation("invalid_workflow".to_string()))?;
        validate_workflow_schema(&version).map_err(|_| Error::Validation("invalid_workflow".to_string()))?;

        if !version
            .nodes
            .iter()
            .any(|n| n.id == conversation.resume_node_id)
        {
            return Err(Error::Validation("conversation_missing_resume_node".to_string()));
        }

        let mut variables = conversation.variables.clone();
        variables.insert(
            conversation.variable_key.clone(),
            Value::String(message.to_string()),
        );
        variables.insert("from".to_string(), Value::String(req.from.clone()));
        variables.insert("to".to_string(), Value::String(req.to.clone()));

        // Complete the old conversation before walking so a second pause in
        // the same run doesn't self-conflict against its own predecessor.
        self.gateway
            .complete_paused_conversation(&conversation.id, variables.clone())
            .await?;

        let input = serde_json::json!({ "from": req.from, "to": req.to, "message": message });
        let run = WorkflowRun {
            id: ids::new_id(),
            workflow_id: workflow.id.clone(),
            version_id: version.id.clone(),
            status: RunStatus::Running,
            trigger_type: TriggerType::Resume,
            input,
            output: Value::Null,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.gateway.create_run(run.clone()).await?;

        self.walk(
            run,
            &version,
            vec![conversation.resume_node_id.clone()],
            &mut variables,
            &req.from,
        )
        .await
    }

    async fn walk(
        &self,
        mut run: WorkflowRun,
        version: &waba_core::model::WorkflowVersion,
        start_ids: Vec<String>,
        variables: &mut HashMap<String, Value>,
        phone: &str,
    ) -> Result<RunOutcome> {
        let config = version.execution_config.clamped();
        let execution_id = run.id.clone();
        let mut last_output = Value::Null;

        for node in reachable_order(version, &start_ids) {
            match node.kind {
                NodeKind::Trigger | NodeKind::Add => continue,
                NodeKind::Action => {
                    let action_type = node.action_type.as_deref().unwrap_or_default();
                    let handler = match self.actions.resolve(action_type) {
                        Ok(h) => h,
                        Err(e) => {
                            return self.fail_run(run, e).await;
                        }
                    };

                    let log_id = ids::new_id();
                    let started_at = Utc::now();

                    let mut media_retried = false;
                    let mut attempt = 0u32;
                    let result = loop {
                        let mut ctx = ActionContext {
                            node_config: &node.config,
                            variables,
                            phone,
                            provider: &self.provider,
                        };
                        let fut = handler.run(&mut ctx);
                        let res = tokio::time::timeout(Duration::from_millis(config.timeout_ms.max(1)), fut)
                            .await
                            .unwrap_or_else(|_| Err(Error::Transient("step timed out".to_string())));

                        match res {
                            Ok(outcome) => break Ok(outcome),
                            Err(e) if matches!(e, Error::MediaExpired(_)) && !media_retried => {
                                media_retried = true;
                                warn!(node = node.id, "media expired, retrying once");
                                continue;
                            }
                            Err(e) if e.is_retryable() && attempt < config.retry_count => {
                                attempt += 1;
                                tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
                                continue;
                            }
                            Err(e) => break Err(e),
                        }
                    };

                    match result {
                        Ok(outcome) => {
                            self.gateway
                                .append_run_log(WorkflowRunLog {
                                    id: log_id,
                                    run_id: execution_id.clone(),
                                    node_id: node.id.clone(),
                                    node_name: node.name.clone(),
                                    node_type: node.kind,
                                    status: StepStatus::Success,
                                    input: node.config.clone(),
                                    output: outcome.output.clone(),
                                    error: None,
                                    started_at,
                                    completed_at: Some(Utc::now()),
                                })
                                .await?;
                            variables.insert(node.id.clone(), outcome.output.clone());
                            last_output = outcome.output.clone();

                            if let Some(pause) = outcome.pause {
                                let resume_node_id = successors(version, &node.id)
                                    .first()
                                    .map(|s| s.to_string())
                                    .ok_or_else(|| {
                                        Error::Validation(
                                            "ask-question node has no successor to resume into".to_string(),
                                        )
                                    })?;
                                self.gateway
                                    .open_paused_conversation(OpenConversationRequest {
                                        workflow_id: run.workflow_id.clone(),
                                        run_id: execution_id.clone(),
                                        phone: phone.to_string(),
                                        resume_node_id,
                                        variable_key: pause.variable_key,
                                        variables: variables.clone(),
                                    })
                                    .await?;
                                run.status = RunStatus::Waiting;
                                run.output = last_output.clone();
                                self.gateway.update_run(run.clone()).await?;
                                return Ok(RunOutcome {
                                    execution_id,
                                    status: RunStatus::Waiting,
                                    output: last_output,
                                });
                            }
                        }
                        Err(e) => {
                            self.gateway
                                .append_run_log(WorkflowRunLog {
                                    id: log_id,
                                    run_id: execution_id.clone(),
                                    node_id: node.id.clone(),
                                    node_name: node.name.clone(),
                                    node_type: node.kind,
                                    status: StepStatus::Error,
                                    input: node.config.clone(),
                                    output: Value::Null,
                                    error: Some(e.to_string()),
                                    started_at,
                                    completed_at: Some(Utc::now()),
                                })
                                .await?;
                            return self.fail_run(run, e).await;
                        }
                    }
                }
            }
        }

        run.status = RunStatus::Success;
        run.output = last_output.clone();
        run.finished_at = Some(Utc::now());
        self.gateway.update_run(run).await?;
        info!(execution_id, "workflow run completed");
        Ok(RunOutcome {
            execution_id,
            status: RunStatus::Success,
            output: last_output,
        })
    }

    async fn fail_run(&self, mut run: WorkflowRun, e: Error) -> Result<RunOutcome> {
        run.status = RunStatus::Failed;
        run.output = serde_json::json!({ "error": e.to_string() });
        run.finished_at = Some(Utc::now());
        let execution_id = run.id.clone();
        let output = run.output.clone();
        self.gateway.update_run(run).await?;
        Ok(RunOutcome {
            execution_id,
            status: RunStatus::Failed,
            output,
        })
    }
}

/// Default per-step retry policy used when a version carries none (spec §6
/// `workflow_execution_config`).
#[must_use]
pub fn default_execution_config() -> ExecutionConfig {
    ExecutionConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use waba_core::model::{NodeKind as NK, TriggerType as TT, Visibility, Workflow, WorkflowEdge, WorkflowNode, WorkflowVersion};
    use waba_core::MemoryGateway;
    use waba_provider::{MediaHandle, PhoneProbe, ProviderClient, SendOutcome};

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

    fn node(id: &str, kind: NK) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            trigger_type: None,
            action_type: None,
            config: serde_json::json!({}),
        }
    }

    async fn setup(version: WorkflowVersion) -> (WorkflowEngine, Arc<MemoryGateway>) {
        let gateway = Arc::new(MemoryGateway::new());
        let workflow = Workflow {
            id: "w1".to_string(),
            name: "test".to_string(),
            description: String::new(),
            visibility: Visibility::Private,
            active_version_id: version.id.clone(),
        };
        gateway.put_workflow(workflow, version).await.unwrap();
        let engine = WorkflowEngine::new(gateway.clone(), Arc::new(FakeProvider), waba_core::sink::noop());
        (engine, gateway)
    }

    #[tokio::test]
    async fn keyword_gate_no_match_is_skipped() {
        let mut trigger = node("t1", NK::Trigger);
        trigger.trigger_type = Some(TT::Keywords);
        trigger.config = serde_json::json!({ "keywords": ["promo", "desconto"] });
        let version = WorkflowVersion {
            id: "v1".to_string(),
            workflow_id: "w1".to_string(),
            nodes: vec![trigger],
            edges: vec![],
            execution_config: ExecutionConfig::default(),
        };
        let (engine, _gw) = setup(version).await;

        let outcome = engine
            .run(RunRequest {
                workflow_id: "w1".to_string(),
                input: serde_json::json!({ "from": "+5511987654321", "message": "oi tudo bem" }),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Skipped);
        assert_eq!(outcome.output["reason"], "keyword_not_matched");
    }

    #[tokio::test]
    async fn ask_question_pauses_then_resumes_to_success() {
        let mut trigger = node("t1", NK::Trigger);
        trigger.trigger_type = Some(TT::Manual);
        let mut ask = node("ask", NK::Action);
        ask.action_type = Some("whatsapp/ask-question".to_string());
        ask.config = serde_json::json!({ "message": "Qual seu nome?", "variableKey": "nome" });
        let mut send = node("send", NK::Action);
        send.action_type = Some("whatsapp/send-message".to_string());
        send.config = serde_json::json!({ "message": "Olá, {{nome}}." });

        let version = WorkflowVersion {
            id: "v1".to_string(),
            workflow_id: "w1".to_string(),
            nodes: vec![trigger, ask, send],
            edges: vec![
                WorkflowEdge { from: "t1".into(), to: "ask".into() },
                WorkflowEdge { from: "ask".into(), to: "send".into() },
            ],
            execution_config: ExecutionConfig::default(),
        };
        let (engine, gateway) = setup(version).await;

        let run_outcome = engine
            .run(RunRequest {
                workflow_id: "w1".to_string(),
                input: serde_json::json!({ "from": "+5511987654321" }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(run_outcome.status, RunStatus::Waiting);

        let conversation = gateway
            .find_waiting_conversation("w1", "+5511987654321")
            .await
            .unwrap()
            .expect("conversation should be open");

        let resume_outcome = engine
            .resume(ResumeRequest {
                workflow_id: "w1".to_string(),
                conversation_id: conversation.id.clone(),
                from: "+5511987654321".to_string(),
                to: "15550000000".to_string(),
                message: " Ana ".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(resume_outcome.status, RunStatus::Success);
        assert_eq!(resume_outcome.output["text"], "Olá, Ana.");

        let completed = gateway.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(completed.status, waba_core::model::ConversationStatus::Completed);
    }

    #[tokio::test]
    async fn resume_with_empty_message_is_rejected() {
        let mut trigger = node("t1", NK::Trigger);
        trigger.trigger_type = Some(TT::Manual);
        let version = WorkflowVersion {
            id: "v1".to_string(),
            workflow_id: "w1".to_string(),
            nodes: vec![trigger],
            edges: vec![],
            execution_config: ExecutionConfig::default(),
        };
        let (engine, _gw) = setup(version).await;

        let err = engine
            .resume(ResumeRequest {
                workflow_id: "w1".to_string(),
                conversation_id: "missing".to_string(),
                from: "+5511987654321".to_string(),
                to: "15550000000".to_string(),
                message: "   ".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == "missing_inbound_message"));
    }

    #[tokio::test]
    async fn resume_unknown_conversation_returns_conversation_not_found() {
        let mut trigger = node("t1", NK::Trigger);
        trigger.trigger_type = Some(TT::Manual);
        let version = WorkflowVersion {
            id: "v1".to_string(),
            workflow_id: "w1".to_string(),
            nodes: vec![trigger],
            edges: vec![],
            execution_config: ExecutionConfig::default(),
        };
        let (engine, _gw) = setup(version).await;

        let err = engine
            .resume(ResumeRequest {
                workflow_id: "w1".to_string(),
                conversation_id: "missing".to_string(),
                from: "+5511987654321".to_string(),
                to: "15550000000".to_string(),
                message: "hi".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m == "conversation_not_found"));
    }
}
