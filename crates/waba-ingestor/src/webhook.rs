//! Parses the provider's native webhook shape into typed events (spec §4.F,
//! §6: "The ingestor never branches on raw provider JSON outside" the
//! Provider Client module — this parser extracts fields only, and leaves
//! error-class interpretation to `waba_provider::classify_status`).

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use waba_core::model::WebhookStatus;

/// A status notification extracted from one `statuses[]` entry.
#[derive(Debug, Clone)]
pub struct InboundStatus {
    pub message_id: String,
    pub status: WebhookStatus,
    pub ts: DateTime<Utc>,
    /// The raw `errors[0]` object on a `failed` event, if present; passed
    /// to `waba_provider::classify_status` for interpretation.
    pub raw_error: Option<Value>,
}

/// An inbound message extracted from one `messages[]` entry.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: String,
    pub to: String,
    pub message_id: String,
    pub text: Option<String>,
    /// Present when the message is a flow form response (`nfm_reply`).
    pub flow_submission: Option<Value>,
}

/// One parsed webhook occurrence.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Status(InboundStatus),
    Message(InboundMessage),
}

/// Parse a raw `POST /webhook` body into every status/message event it
/// carries. Malformed or unrecognized entries are skipped, not rejected —
/// the provider must never be taught to back off (spec §6).
#[must_use]
pub fn parse_webhook_payload(body: &Value) -> Vec<WebhookEvent> {
    let mut events = Vec::new();
    let Some(entries) = body.get("entry").and_then(Value::as_array) else {
        return events;
    };

    for entry in entries {
        let Some(changes) = entry.get("changes").and_then(Value::as_array) else {
            continue;
        };
        for change in changes {
            let Some(value) = change.get("value") else { continue };
            let phone_number_id = value
                .get("metadata")
                .and_then(|m| m.get("phone_number_id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if let Some(statuses) = value.get("statuses").and_then(Value::as_array) {
                events.extend(statuses.iter().filter_map(parse_status));
            }
            if let Some(messages) = value.get("messages").and_then(Value::as_array) {
                events.extend(
                    messages
                        .iter()
                        .filter_map(|m| parse_message(m, &phone_number_id)),
                );
            }
        }
    }
    events
}

fn parse_status(raw: &Value) -> Option<WebhookEvent> {
    let message_id = raw.get("id").and_then(Value::as_str)?.to_string();
    let status = match raw.get("status").and_then(Value::as_str)? {
        "sent" => WebhookStatus::Sent,
        "delivered" => WebhookStatus::Delivered,
        "read" => WebhookStatus::Read,
        "failed" => WebhookStatus::Failed,
        _ => return None,
    };
    let ts = raw
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);
    let raw_error = raw.get("errors").and_then(Value::as_array).and_then(|errs| errs.first().cloned());

    Some(WebhookEvent::Status(InboundStatus { message_id, status, ts, raw_error }))
}

fn parse_message(raw: &Value, to: &str) -> Option<WebhookEvent> {
    let from = raw.get("from").and_then(Value::as_str)?.to_string();
    let message_id = raw.get("id").and_then(Value::as_str)?.to_string();

    let flow_submission = raw
        .get("interactive")
        .and_then(|i| i.get("nfm_reply"))
        .and_then(|r| r.get("response_json"))
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str::<Value>(s).ok());

    let text = raw
        .get("text")
        .and_then(|t| t.get("body"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            raw.get("interactive")
                .and_then(|i| i.get("button_reply").or_else(|| i.get("list_reply")))
                .and_then(|r| r.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

    Some(WebhookEvent::Message(InboundMessage {
        from,
        to: to.to_string(),
        message_id,
        text,
        flow_submission,
    }))
}
