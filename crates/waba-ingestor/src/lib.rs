//! Reply Ingestor (spec §4.F): webhook verification, status projection,
//! and inbound message routing.

pub mod ingestor;
mod reconcile;
pub mod verify;
pub mod webhook;

pub use ingestor::{ReplyIngestor, UnroutedMessage, WebhookAck};
pub use verify::{check_webhook_token, verify_challenge, VerifyOutcome};
pub use webhook::{parse_webhook_payload, InboundMessage, InboundStatus, WebhookEvent};
