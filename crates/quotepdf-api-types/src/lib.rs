//! Request and response types shared by the quotepdf server and its clients.

use std::convert::TryFrom;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Persisted lifecycle state of a PDF job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfJobStatus {
    Pending,
    Completed,
    Failed,
}

impl PdfJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfJobStatus::Pending => "pending",
            PdfJobStatus::Completed => "completed",
            PdfJobStatus::Failed => "failed",
        }
    }

    /// Completed and failed jobs never change state again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PdfJobStatus::Pending)
    }
}

impl fmt::Display for PdfJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PdfJobStatus {
    type Error = UnknownStatus;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(PdfJobStatus::Pending),
            "completed" => Ok(PdfJobStatus::Completed),
            "failed" => Ok(PdfJobStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown pdf job status `{}`", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// Job record as exposed by `/pdf-jobs`; field names follow the table columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfJob {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub status: PdfJobStatus,
    pub s3_key: Option<String>,
    pub created_by: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfJobList {
    pub data: Vec<PdfJob>,
}

/// Body of `POST /pdf-jobs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePdfJobRequest {
    #[serde(default)]
    pub quote_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
}

/// Body of `PATCH /pdf-jobs/{id}`.
///
/// `s3Key` distinguishes an absent field (leave unchanged) from an explicit
/// `null` (clear the reference).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPdfJobRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PdfJobStatus>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub s3_key: Option<Option<String>>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Response of `POST /quotes/{quoteId}/pdf`.
///
/// Detached submissions carry only `jobId`; inline submissions also carry the
/// artifact `url`, or `status: "failed"` when processing did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPdfResponse {
    pub job_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<QuotePdfStatus>,
}

/// Status vocabulary of the polling endpoint.
///
/// `processing` is never produced by the server but is accepted so clients
/// keep polling when an upstream reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotePdfStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    NotFound,
}

impl QuotePdfStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, QuotePdfStatus::Pending | QuotePdfStatus::Processing)
    }
}

impl From<PdfJobStatus> for QuotePdfStatus {
    fn from(status: PdfJobStatus) -> Self {
        match status {
            PdfJobStatus::Pending => QuotePdfStatus::Pending,
            PdfJobStatus::Completed => QuotePdfStatus::Completed,
            PdfJobStatus::Failed => QuotePdfStatus::Failed,
        }
    }
}

/// Response of `GET /quotes/{quoteId}/pdf?jobId=`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfStatusResponse {
    pub status: QuotePdfStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PdfStatusResponse {
    pub fn not_found() -> Self {
        Self {
            status: QuotePdfStatus::NotFound,
            url: None,
        }
    }
}
