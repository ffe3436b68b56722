//! `GET /webhook`, `POST /webhook` (spec §4.F, §6).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::collections::HashMap;
use tracing::instrument;

use crate::dto::WebhookVerifyQuery;
use crate::state::AppState;

/// Verification challenge echo (spec §6: "iff the verify token matches").
#[instrument(skip(state, query))]
pub async fn verify_handler(State(state): State<AppState>, Query(query): Query<WebhookVerifyQuery>) -> Response {
    match (&query.verify_token, &query.challenge) {
        (Some(token), Some(challenge)) if state.ingestor.verify_challenge(token) => {
            (StatusCode::OK, challenge.clone()).into_response()
        }
        _ => StatusCode::FORBIDDEN.into_response(),
    }
}

/// Always 200 (spec §6: "the provider must not be taught to back off").
#[instrument(skip(state, params, body))]
pub async fn receive_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> StatusCode {
    let token = params.get("token").map(String::as_str);
    match state.ingestor.ingest(token, &body).await {
        Ok((_ack, unrouted)) => {
            for message in unrouted {
                tracing::info!(
                    from = %waba_core::model::mask_phone(&message.from),
                    message_id = %message.message_id,
                    "inbound message unrouted; no external responder configured"
                );
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "webhook ingestion failed");
        }
    }
    StatusCode::OK
}
