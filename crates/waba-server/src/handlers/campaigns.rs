//! `POST /campaigns/{id}/cancel`, `POST /campaigns/precheck`,
//! `GET /campaigns/{id}/report.csv` (spec §6).

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::instrument;
use waba_core::Error;
use waba_dispatcher::CancelOutcome;

use crate::dto::{
    CancelOutcomeDto, PrecheckRequestDto, PrecheckResponseDto, PrecheckTotalsDto,
};
use crate::error::{ApiError, Result};
use crate::state::AppState;

#[instrument(skip(state), fields(campaign_id = %id))]
pub async fn cancel_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelOutcomeDto>> {
    let outcome = state.dispatcher.cancel_campaign(&id).await.map_err(ApiError::from)?;
    let dto = match outcome {
        CancelOutcome::Cancelled { skipped } => CancelOutcomeDto { already_cancelled: false, skipped },
        CancelOutcome::AlreadyCancelled => CancelOutcomeDto { already_cancelled: true, skipped: 0 },
    };
    Ok(Json(dto))
}

#[instrument(skip(state, req), fields(template_name = %req.template_name, contacts = req.contacts.len()))]
pub async fn precheck_handler(
    State(state): State<AppState>,
    Json(req): Json<PrecheckRequestDto>,
) -> Result<Json<PrecheckResponseDto>> {
    let template = state
        .gateway
        .get_template(&req.template_name)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError(Error::NotFound(format!("templates/{}", req.template_name))))?;

    let mut valid = 0u64;
    let mut skipped = 0u64;
    let results: Vec<_> = req
        .contacts
        .into_iter()
        .map(|c| {
            let contact = c.into_campaign_contact();
            let result = waba_precheck::precheck_contact(&contact, &template, &req.template_variables);
            if result.ok {
                valid += 1;
            } else {
                skipped += 1;
            }
            result.into()
        })
        .collect();
    let total = valid + skipped;

    Ok(Json(PrecheckResponseDto {
        ok: skipped == 0,
        totals: PrecheckTotalsDto { total, valid, skipped },
        results,
    }))
}

const CSV_HEADER: &str =
    "contact_id,name,phone,email,status,message_id,sent_at,delivered_at,read_at,error";

#[instrument(skip(state), fields(campaign_id = %id))]
pub async fn report_csv_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    // existence check: a campaign with no rows still produces a report, but
    // an unknown campaign id should 404 rather than return an empty CSV.
    state
        .gateway
        .get_campaign(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError(Error::NotFound(format!("campaigns/{id}"))))?;
    let contacts = state.gateway.get_contacts(&id).await.map_err(ApiError::from)?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer
        .write_record(CSV_HEADER.split(','))
        .map_err(|e| ApiError(Error::Internal(e.to_string())))?;
    for c in &contacts {
        writer
            .write_record([
                c.contact_id.as_str(),
                c.name.as_str(),
                c.phone.as_str(),
                c.email.as_str(),
                status_text(c.status),
                c.message_id.as_deref().unwrap_or(""),
                &c.sent_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                &c.delivered_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                &c.read_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                c.error.as_deref().unwrap_or(""),
            ])
            .map_err(|e| ApiError(Error::Internal(e.to_string())))?;
    }
    let mut body = vec![0xEF, 0xBB, 0xBF]; // UTF-8 BOM
    body.extend(writer.into_inner().map_err(|e| ApiError(Error::Internal(e.to_string())))?);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        body,
    )
        .into_response())
}

fn status_text(status: waba_core::model::ContactStatus) -> &'static str {
    use waba_core::model::ContactStatus as S;
    match status {
        S::Pending => "pending",
        S::Sending => "sending",
        S::Sent => "sent",
        S::Delivered => "delivered",
        S::Read => "read",
        S::Failed => "failed",
        S::Skipped => "skipped",
    }
}
