use std::sync::Arc;

use metrics::counter;
use quotepdf_api_types::{PdfStatusResponse, QuotePdfStatus};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::{
    artifacts::ArtifactPublisher,
    repos::{NewPdfJob, PdfJobsRepo, RepoError, UpdatePdfJobParams},
    sessions::Principal,
};
use crate::domain::{
    entities::PdfJobRecord,
    error::DomainError,
    types::{PdfJobStatus, PdfJobVariant, validate_transition},
};

use super::{
    METRIC_JOBS_SUBMITTED,
    pipeline::{JobProcessor, ProcessOutcome},
    worker::{PdfJobQueue, PdfTask},
};

#[derive(Debug, Error)]
pub enum PdfJobError {
    #[error("pdf job not found")]
    NotFound,
    #[error("authentication required")]
    Unauthorized,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("conflicting update: {0}")]
    Conflict(String),
    #[error("job store unavailable: {0}")]
    Persistence(#[from] RepoError),
}

impl From<DomainError> for PdfJobError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { .. } => PdfJobError::NotFound,
            DomainError::Transition { .. } => PdfJobError::Conflict(err.to_string()),
            DomainError::Validation { message } | DomainError::Invariant { message } => {
                PdfJobError::Validation(message)
            }
        }
    }
}

/// Result of `submit`, shaped by the configured variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Detached: processing continues in the background.
    Accepted { job_id: Uuid },
    /// Inline: the pipeline finished and the artifact is reachable at `url`.
    Completed { job_id: Uuid, url: String },
    /// Inline: the pipeline failed; the job record reflects it.
    Failed { job_id: Uuid },
}

impl SubmitOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            SubmitOutcome::Accepted { job_id }
            | SubmitOutcome::Completed { job_id, .. }
            | SubmitOutcome::Failed { job_id } => *job_id,
        }
    }
}

/// Manual override of status and artifact reference.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<PdfJobStatus>,
    pub artifact_ref: Option<Option<String>>,
}

/// Job orchestrator: creates jobs, drives processing, answers status queries.
#[derive(Clone)]
pub struct PdfJobService {
    jobs: Arc<dyn PdfJobsRepo>,
    processor: Arc<JobProcessor>,
    queue: Option<PdfJobQueue>,
    variant: PdfJobVariant,
}

impl PdfJobService {
    pub fn new(
        jobs: Arc<dyn PdfJobsRepo>,
        processor: Arc<JobProcessor>,
        queue: Option<PdfJobQueue>,
        variant: PdfJobVariant,
    ) -> Self {
        Self {
            jobs,
            processor,
            queue,
            variant,
        }
    }

    pub fn variant(&self) -> PdfJobVariant {
        self.variant
    }

    fn publisher(&self) -> &ArtifactPublisher {
        self.processor.pipeline().publisher()
    }

    pub async fn submit(
        &self,
        quote_id: Uuid,
        principal: Option<&Principal>,
    ) -> Result<SubmitOutcome, PdfJobError> {
        let owner = principal.map(|p| p.user.clone());
        if self.variant.requires_owner() && owner.is_none() {
            return Err(PdfJobError::Unauthorized);
        }

        let job = self
            .jobs
            .create_job(NewPdfJob::pending(quote_id, owner))
            .await?;
        counter!(METRIC_JOBS_SUBMITTED, "variant" => self.variant.as_str()).increment(1);
        info!(
            target: "quotepdf::jobs",
            job_id = %job.id,
            quote_id = %quote_id,
            variant = self.variant.as_str(),
            "pdf job submitted"
        );

        match self.variant {
            PdfJobVariant::DetachedAnonymous => {
                self.dispatch(job.id, quote_id).await;
                Ok(SubmitOutcome::Accepted { job_id: job.id })
            }
            PdfJobVariant::InlineOwnerScoped => Ok(self.process_inline(job.id, quote_id).await),
        }
    }

    async fn dispatch(&self, job_id: Uuid, quote_id: Uuid) {
        let task = PdfTask { job_id, quote_id };
        let rejected = match self.queue.as_ref() {
            Some(queue) => queue.try_enqueue(task).err(),
            None => {
                let processor = Arc::clone(&self.processor);
                tokio::spawn(async move { processor.run(job_id, quote_id).await });
                None
            }
        };

        if let Some(reason) = rejected {
            warn!(
                target: "quotepdf::jobs",
                job_id = %job_id,
                quote_id = %quote_id,
                reason = %reason,
                "pdf job rejected by worker pool"
            );
            self.processor.reject(job_id, quote_id, "queue").await;
        }
    }

    async fn process_inline(&self, job_id: Uuid, quote_id: Uuid) -> SubmitOutcome {
        // Detach from the request future so a dropped connection cannot strand the job.
        let processor = Arc::clone(&self.processor);
        let outcome = tokio::spawn(async move { processor.run(job_id, quote_id).await }).await;

        match outcome {
            Ok(ProcessOutcome::Completed(record)) => match record.artifact_ref.as_deref() {
                Some(reference) => SubmitOutcome::Completed {
                    job_id,
                    url: self.publisher().public_url(reference),
                },
                None => SubmitOutcome::Failed { job_id },
            },
            Ok(_) => SubmitOutcome::Failed { job_id },
            Err(err) => {
                warn!(
                    target: "quotepdf::jobs",
                    job_id = %job_id,
                    error = %err,
                    "inline processing task aborted"
                );
                self.processor.reject(job_id, quote_id, "task").await;
                SubmitOutcome::Failed { job_id }
            }
        }
    }

    /// Status of a quote's job, with `not_found` for absent or foreign jobs.
    ///
    /// Only the owner-scoped variant filters by principal. Read-only, so
    /// repeated calls without an intervening update agree.
    pub async fn get_status(
        &self,
        quote_id: Uuid,
        job_id: Option<Uuid>,
        principal: Option<&Principal>,
    ) -> Result<PdfStatusResponse, PdfJobError> {
        let owner = match (self.variant.requires_owner(), principal) {
            (false, _) => None,
            (true, Some(principal)) => Some(principal.user.as_str()),
            (true, None) => return Err(PdfJobError::Unauthorized),
        };
        let Some(job) = self
            .jobs
            .find_latest_for_quote(quote_id, job_id, owner)
            .await?
        else {
            return Ok(PdfStatusResponse::not_found());
        };

        let url = match job.status {
            PdfJobStatus::Completed => job
                .artifact_ref
                .as_deref()
                .map(|reference| self.publisher().public_url(reference)),
            _ => None,
        };

        Ok(PdfStatusResponse {
            status: QuotePdfStatus::from(job.status),
            url,
        })
    }

    pub async fn get_job(&self, id: Uuid, principal: &Principal) -> Result<PdfJobRecord, PdfJobError> {
        self.jobs
            .find_job(id, Some(principal.user.as_str()))
            .await?
            .ok_or(PdfJobError::NotFound)
    }

    pub async fn list_jobs(&self, principal: &Principal) -> Result<Vec<PdfJobRecord>, PdfJobError> {
        Ok(self.jobs.list_for_owner(&principal.user).await?)
    }

    /// Register a job record directly; a supplied key records an existing artifact.
    pub async fn create_job(
        &self,
        principal: &Principal,
        quote_id: Uuid,
        artifact_ref: Option<String>,
    ) -> Result<PdfJobRecord, PdfJobError> {
        let new_job = match artifact_ref {
            Some(reference) => {
                let reference = reference.trim().to_string();
                if reference.is_empty() {
                    return Err(PdfJobError::Validation("s3Key must not be empty".into()));
                }
                NewPdfJob {
                    quote_id,
                    created_by: Some(principal.user.clone()),
                    status: PdfJobStatus::Completed,
                    artifact_ref: Some(reference),
                }
            }
            None => NewPdfJob::pending(quote_id, Some(principal.user.clone())),
        };

        Ok(self.jobs.create_job(new_job).await?)
    }

    /// Owner-scoped manual override; foreign jobs are reported as not found.
    pub async fn update_status(
        &self,
        id: Uuid,
        principal: &Principal,
        patch: JobPatch,
    ) -> Result<PdfJobRecord, PdfJobError> {
        let current = self.get_job(id, principal).await?;

        let next_status = patch.status.unwrap_or(current.status);
        validate_transition(current.status, next_status)?;

        let next_ref = match &patch.artifact_ref {
            Some(value) => value.clone(),
            None => current.artifact_ref.clone(),
        };
        if let Some(reference) = next_ref.as_deref()
            && reference.trim().is_empty()
        {
            return Err(PdfJobError::Validation("s3Key must not be empty".into()));
        }
        let candidate = PdfJobRecord {
            status: next_status,
            artifact_ref: next_ref,
            ..current.clone()
        };
        candidate.check_artifact_invariant()?;

        let updated = self
            .jobs
            .update_job(UpdatePdfJobParams {
                id,
                owner: Some(principal.user.clone()),
                expected_status: current.status,
                status: patch.status,
                artifact_ref: patch.artifact_ref,
            })
            .await?
            .ok_or_else(|| PdfJobError::Conflict("job changed concurrently".into()))?;

        info!(
            target: "quotepdf::jobs",
            job_id = %id,
            from = current.status.as_str(),
            to = updated.status.as_str(),
            "pdf job updated manually"
        );
        Ok(updated)
    }
}
