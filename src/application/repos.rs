//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{PdfJobRecord, QuoteDocument, SessionRecord};
use crate::domain::types::PdfJobStatus;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewPdfJob {
    pub quote_id: Uuid,
    pub created_by: Option<String>,
    pub status: PdfJobStatus,
    pub artifact_ref: Option<String>,
}

impl NewPdfJob {
    pub fn pending(quote_id: Uuid, created_by: Option<String>) -> Self {
        Self {
            quote_id,
            created_by,
            status: PdfJobStatus::Pending,
            artifact_ref: None,
        }
    }
}

/// Partial update guarded by the status the caller last observed.
///
/// `artifact_ref: None` leaves the column untouched, `Some(None)` clears it.
#[derive(Debug, Clone)]
pub struct UpdatePdfJobParams {
    pub id: Uuid,
    pub owner: Option<String>,
    pub expected_status: PdfJobStatus,
    pub status: Option<PdfJobStatus>,
    pub artifact_ref: Option<Option<String>>,
}

#[async_trait]
pub trait PdfJobsRepo: Send + Sync {
    async fn create_job(&self, job: NewPdfJob) -> Result<PdfJobRecord, RepoError>;

    /// Jobs owned by someone else are reported as absent.
    async fn find_job(
        &self,
        id: Uuid,
        owner: Option<&str>,
    ) -> Result<Option<PdfJobRecord>, RepoError>;

    /// Newest job for the quote, optionally narrowed to one job id and owner.
    async fn find_latest_for_quote(
        &self,
        quote_id: Uuid,
        job_id: Option<Uuid>,
        owner: Option<&str>,
    ) -> Result<Option<PdfJobRecord>, RepoError>;

    /// Returns `None` when no row matches id, owner and expected status.
    async fn update_job(
        &self,
        params: UpdatePdfJobParams,
    ) -> Result<Option<PdfJobRecord>, RepoError>;

    /// `pending -> completed`; `None` when the job is missing or already terminal.
    async fn complete_pending(
        &self,
        id: Uuid,
        artifact_ref: &str,
    ) -> Result<Option<PdfJobRecord>, RepoError>;

    /// `pending -> failed`; `None` when the job is missing or already terminal.
    async fn fail_pending(&self, id: Uuid) -> Result<Option<PdfJobRecord>, RepoError>;

    /// Fails every pending job created before `created_before`, returning the failed rows.
    async fn fail_stale_pending(
        &self,
        created_before: OffsetDateTime,
    ) -> Result<Vec<PdfJobRecord>, RepoError>;

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<PdfJobRecord>, RepoError>;
}

#[async_trait]
pub trait QuotesRepo: Send + Sync {
    async fn load_quote_document(
        &self,
        quote_id: Uuid,
    ) -> Result<Option<QuoteDocument>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub principal: String,
    pub hashed_secret: Vec<u8>,
    pub expires_at: OffsetDateTime,
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    async fn create_session(&self, params: CreateSessionParams)
    -> Result<SessionRecord, RepoError>;

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, RepoError>;

    async fn extend_session(&self, id: Uuid, expires_at: OffsetDateTime)
    -> Result<(), RepoError>;

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}
