use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use quotepdf_api_types::{CreatePdfJobRequest, PatchPdfJobRequest, PdfJob, PdfJobList};

use crate::application::jobs::JobPatch;
use crate::application::sessions::Principal;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

use super::parse_id;

pub async fn list_jobs(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let jobs = state.jobs.list_jobs(&principal).await?;
    Ok(Json(PdfJobList {
        data: jobs.into_iter().map(PdfJob::from).collect(),
    }))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Invalid job id")?;
    let job = state.jobs.get_job(id, &principal).await?;
    Ok(Json(PdfJob::from(job)))
}

pub async fn create_job(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreatePdfJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let quote_id = payload
        .quote_id
        .ok_or_else(|| ApiError::bad_request("quoteId is required", None))?;
    let job = state
        .jobs
        .create_job(&principal, quote_id, payload.s3_key)
        .await?;
    Ok((StatusCode::CREATED, Json(PdfJob::from(job))))
}

pub async fn patch_job(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(payload): Json<PatchPdfJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Invalid job id")?;
    let job = state
        .jobs
        .update_status(
            id,
            &principal,
            JobPatch {
                status: payload.status,
                artifact_ref: payload.s3_key,
            },
        )
        .await?;
    Ok(Json(PdfJob::from(job)))
}
