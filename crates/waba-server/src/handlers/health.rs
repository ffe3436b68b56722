//! `GET /healthz` (ambient; spec §5 process shutdown implies a running
//! process worth probing, not a literal route).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn healthz_handler(State(state): State<AppState>) -> Response {
    match state.gateway.get_setting(waba_core::settings::WEBHOOK_VERIFY_TOKEN).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "error": e.to_string() })),
        )
            .into_response(),
    }
}
