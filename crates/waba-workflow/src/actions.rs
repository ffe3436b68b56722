//! The action registry (spec §4.D, §9 Design Notes: "actions as a
//! registry of handlers keyed by `actionType`... Unknown actions are
//! validation errors, not silent no-ops").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use waba_core::{Error, Result};
use waba_provider::ProviderClient;

use crate::template::substitute;

/// Mutable execution context handed to every action.
pub struct ActionContext<'a> {
    pub node_config: &'a Value,
    pub variables: &'a mut HashMap<String, Value>,
    pub phone: &'a str,
    pub provider: &'a Arc<dyn ProviderClient>,
}

/// What an action asks the engine to do once it completes (spec §4.D item 5).
#[derive(Debug, Clone)]
pub struct PauseIntent {
    pub variable_key: String,
}

/// Result of running one node's action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub output: Value,
    pub pause: Option<PauseIntent>,
}

impl ActionOutcome {
    #[must_use]
    pub fn completed(output: Value) -> Self {
        Self {
            output,
            pause: None,
        }
    }
}

/// A single action handler, keyed by `actionType` in the registry.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome>;
}

/// `whatsapp/send-message`: substitutes `config.message` and sends it.
pub struct SendMessage;

#[async_trait]
impl Action for SendMessage {
    async fn run(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
        let template = ctx
            .node_config
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Validation("send-message node missing 'message'".to_string()))?;
        let text = substitute(template, ctx.variables);
        let payload = serde_json::json!({
            "to": ctx.phone,
            "type": "text",
            "text": { "body": text },
        });
        let outcome = ctx.provider.send(payload).await?;
        if let Some(err) = outcome.error_class.into_error(outcome.raw.to_string()) {
            return Err(err);
        }
        Ok(ActionOutcome::completed(serde_json::json!({
            "sent": true,
            "messageId": outcome.provider_message_id,
            "text": text,
        })))
    }
}

/// `whatsapp/send-list`: an interactive list message; same send path as
/// `send-message` with a richer payload shape.
pub struct SendList;

#[async_trait]
impl Action for SendList {
    async fn run(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
        let body = ctx
            .node_config
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let sections = ctx.node_config.get("sections").cloned().unwrap_or(Value::Null);
        let text = substitute(body, ctx.variables);
        let payload = serde_json::json!({
            "to": ctx.phone,
            "type": "interactive",
            "interactive": { "type": "list", "body": { "text": text }, "action": { "sections": sections } },
        });
        let outcome = ctx.provider.send(payload).await?;
        if let Some(err) = outcome.error_class.into_error(outcome.raw.to_string()) {
            return Err(err);
        }
        Ok(ActionOutcome::completed(serde_json::json!({
            "sent": true,
            "messageId": outcome.provider_message_id,
        })))
    }
}

/// `whatsapp/ask-question`: sends a prompt and pauses the run (spec §4.D
/// "Pause semantics").
pub struct AskQuestion;

#[async_trait]
impl Action for AskQuestion {
    async fn run(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
        let template = ctx
            .node_config
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Validation("ask-question node missing 'message'".to_string()))?;
        let variable_key = ctx
            .node_config
            .get("variableKey")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Validation("ask-question node missing 'variableKey'".to_string()))?
            .to_string();
        let text = substitute(template, ctx.variables);
        let payload = serde_json::json!({
            "to": ctx.phone,
            "type": "text",
            "text": { "body": text },
        });
        let outcome = ctx.provider.send(payload).await?;
        if let Some(err) = outcome.error_class.into_error(outcome.raw.to_string()) {
            return Err(err);
        }
        Ok(ActionOutcome {
            output: serde_json::json!({ "sent": true, "messageId": outcome.provider_message_id }),
            pause: Some(PauseIntent { variable_key }),
        })
    }
}

/// A `set-variable`-shaped action: writes `config.value` (template-expanded
/// if a string) into `variables[config.key]`.
pub struct SetVariable;

#[async_trait]
impl Action for SetVariable {
    async fn run(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
        let key = ctx
            .node_config
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Validation("set-variable node missing 'key'".to_string()))?
            .to_string();
        let value = match ctx.node_config.get("value") {
            Some(Value::String(s)) => Value::String(substitute(s, ctx.variables)),
            Some(other) => other.clone(),
            None => Value::Null,
        };
        ctx.variables.insert(key.clone(), value.clone());
        Ok(ActionOutcome::completed(serde_json::json!({ key: value })))
    }
}

/// A generic outbound webhook/HTTP action: `config = {url, method?, body?}`.
pub struct HttpWebhook {
    client: reqwest::Client,
}

impl Default for HttpWebhook {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Action for HttpWebhook {
    async fn run(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
        let url = ctx
            .node_config
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Validation("http node missing 'url'".to_string()))?;
        let method = ctx
            .node_config
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("POST")
            .to_uppercase();
        let body = ctx.node_config.get("body").cloned().unwrap_or(Value::Null);

        let request = self
            .client
            .request(
                method.parse().map_err(|_| Error::Validation(format!("invalid HTTP method {method}")))?,
                url,
            )
            .json(&body);
        let resp = request
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(Error::Transient(format!("http action received {status}")));
        }
        if !status.is_success() {
            return Err(Error::Permanent(format!("http action received {status}")));
        }
        Ok(ActionOutcome::completed(
            serde_json::json!({ "status": status.as_u16() }),
        ))
    }
}

/// Registry of handlers keyed by `actionType`.
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// The default registry wired with every action recognized by the
    /// engine (spec §4.D "Recognized actions").
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register("whatsapp/send-message", Arc::new(SendMessage));
        registry.register("whatsapp/send-list", Arc::new(SendList));
        registry.register("whatsapp/ask-question", Arc::new(AskQuestion));
        registry.register("set-variable", Arc::new(SetVariable));
        registry.register("http", Arc::new(HttpWebhook::default()));
        registry
    }

    pub fn register(&mut self, action_type: impl Into<String>, handler: Arc<dyn Action>) {
        self.handlers.insert(action_type.into(), handler);
    }

    /// Resolve a handler; unknown `actionType`s are validation errors, not
    /// silent no-ops (spec §9 Design Notes).
    pub fn resolve(&self, action_type: &str) -> Result<Arc<dyn Action>> {
        self.handlers
            .get(action_type)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("unknown action type: {action_type}")))
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
