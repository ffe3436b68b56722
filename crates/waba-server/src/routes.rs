//! Route table (spec §6), mirroring `dashflow-langserve::server::add_routes`'s
//! stateful-router-plus-layer shape.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, health, webhook, workflow};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflow/run", post(workflow::run_handler))
        .route("/workflow/:id/resume", post(workflow::resume_handler))
        .route("/campaigns/:id/cancel", post(campaigns::cancel_handler))
        .route("/campaigns/precheck", post(campaigns::precheck_handler))
        .route("/campaigns/:id/report.csv", get(campaigns::report_csv_handler))
        .route("/webhook", get(webhook::verify_handler).post(webhook::receive_handler))
        .route("/healthz", get(health::healthz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
