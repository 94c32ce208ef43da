use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quotepdf_api_types::{QuotePdfStatus, SubmitPdfResponse};
use serde::Deserialize;

use crate::application::jobs::SubmitOutcome;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::middleware::MaybePrincipal;
use crate::infra::http::api::state::ApiState;

use super::parse_id;

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

/// `202 {jobId}` when detached, `200 {jobId, url}` or `502 {jobId, status}` inline.
pub async fn submit_pdf(
    State(state): State<ApiState>,
    MaybePrincipal(principal): MaybePrincipal,
    Path(quote_id): Path<String>,
) -> Result<Response, ApiError> {
    let quote_id = parse_id(&quote_id, "Invalid quote id")?;
    let outcome = state.jobs.submit(quote_id, principal.as_ref()).await?;

    let response = match outcome {
        SubmitOutcome::Accepted { job_id } => (
            StatusCode::ACCEPTED,
            Json(SubmitPdfResponse {
                job_id,
                url: None,
                status: None,
            }),
        ),
        SubmitOutcome::Completed { job_id, url } => (
            StatusCode::OK,
            Json(SubmitPdfResponse {
                job_id,
                url: Some(url),
                status: None,
            }),
        ),
        SubmitOutcome::Failed { job_id } => (
            StatusCode::BAD_GATEWAY,
            Json(SubmitPdfResponse {
                job_id,
                url: None,
                status: Some(QuotePdfStatus::Failed),
            }),
        ),
    };
    Ok(response.into_response())
}

pub async fn pdf_status(
    State(state): State<ApiState>,
    MaybePrincipal(principal): MaybePrincipal,
    Path(quote_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ApiError> {
    let quote_id = parse_id(&quote_id, "Invalid quote id")?;
    let job_id = match query.job_id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => parse_id(raw, "Invalid jobId")?,
        _ => {
            return Err(ApiError::bad_request(
                "jobId query parameter is required",
                None,
            ));
        }
    };

    let status = state
        .jobs
        .get_status(quote_id, Some(job_id), principal.as_ref())
        .await?;
    let code = if status.status == QuotePdfStatus::NotFound {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    Ok((code, Json(status)).into_response())
}
