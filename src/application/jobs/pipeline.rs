use std::{sync::Arc, time::Duration, time::Instant};

use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::{
    artifacts::{ArtifactPublisher, StorageError},
    payload::{PayloadBuilder, PayloadError},
    render::{RenderClient, RenderServiceError, RenderedDocument},
    repos::{PdfJobsRepo, RepoError},
};
use crate::domain::entities::PdfJobRecord;

use super::{METRIC_JOBS_COMPLETED, METRIC_JOBS_FAILED, METRIC_PIPELINE_MS};

const TERMINAL_WRITE_ATTEMPTS: u32 = 3;
const TERMINAL_WRITE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("quote `{0}` not found")]
    QuoteNotFound(Uuid),
    #[error("failed to load quote data: {0}")]
    Persistence(#[source] RepoError),
    #[error(transparent)]
    InvalidQuote(PayloadError),
    #[error(transparent)]
    Render(#[from] RenderServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("processing task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Label of the step that failed, used in logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::QuoteNotFound(_)
            | PipelineError::Persistence(_)
            | PipelineError::InvalidQuote(_) => "payload",
            PipelineError::Render(_) => "render",
            PipelineError::Storage(_) => "publish",
            PipelineError::Aborted(_) => "task",
        }
    }
}

impl From<PayloadError> for PipelineError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::QuoteNotFound(id) => PipelineError::QuoteNotFound(id),
            PayloadError::Repo(err) => PipelineError::Persistence(err),
            err @ PayloadError::InvalidData(_) => PipelineError::InvalidQuote(err),
        }
    }
}

/// Build, render and publish one quote document.
#[derive(Clone)]
pub struct PdfPipeline {
    payloads: PayloadBuilder,
    renderer: Arc<dyn RenderClient>,
    publisher: ArtifactPublisher,
}

impl PdfPipeline {
    pub fn new(
        payloads: PayloadBuilder,
        renderer: Arc<dyn RenderClient>,
        publisher: ArtifactPublisher,
    ) -> Self {
        Self {
            payloads,
            renderer,
            publisher,
        }
    }

    pub fn publisher(&self) -> &ArtifactPublisher {
        &self.publisher
    }

    /// Returns the artifact reference to record on the job.
    pub async fn produce(&self, quote_id: Uuid) -> Result<String, PipelineError> {
        let payload = self.payloads.build(quote_id).await?;
        match self.renderer.render(&payload).await? {
            RenderedDocument::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(RenderServiceError::EmptyDocument.into());
                }
                Ok(self.publisher.publish(quote_id, bytes).await?)
            }
            RenderedDocument::Hosted(url) => Ok(url),
        }
    }
}

/// Terminal result of processing one job.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Completed(PdfJobRecord),
    Failed { stage: &'static str },
    /// Another writer moved the job to a terminal state first.
    Superseded,
    /// The terminal status could not be persisted.
    Unrecorded,
}

/// Runs the pipeline for a job and records the terminal status.
///
/// The pipeline executes in its own task so that a panic surfaces here as a
/// join error and still moves the job to `failed`. Stale pending jobs left by
/// an interrupted process are failed by [`JobProcessor::fail_stale`].
#[derive(Clone)]
pub struct JobProcessor {
    jobs: Arc<dyn PdfJobsRepo>,
    pipeline: Arc<PdfPipeline>,
}

impl JobProcessor {
    pub fn new(jobs: Arc<dyn PdfJobsRepo>, pipeline: Arc<PdfPipeline>) -> Self {
        Self { jobs, pipeline }
    }

    pub fn pipeline(&self) -> &PdfPipeline {
        &self.pipeline
    }

    pub async fn run(&self, job_id: Uuid, quote_id: Uuid) -> ProcessOutcome {
        let started_at = Instant::now();
        let pipeline = Arc::clone(&self.pipeline);
        // Held in a set so that cancelling `run` also aborts the pipeline.
        let mut task = JoinSet::new();
        task.spawn(async move { pipeline.produce(quote_id).await });
        let result = match task.join_next().await {
            Some(Ok(result)) => result,
            Some(Err(join_err)) => Err(PipelineError::Aborted(join_err.to_string())),
            None => Err(PipelineError::Aborted("pipeline task missing".into())),
        };
        let outcome = match result {
            Ok(artifact_ref) => self.record_completion(job_id, quote_id, &artifact_ref).await,
            Err(err) => {
                warn!(
                    target: "quotepdf::jobs",
                    job_id = %job_id,
                    quote_id = %quote_id,
                    stage = err.stage(),
                    error = %err,
                    "pdf pipeline failed"
                );
                self.record_failure(job_id, quote_id, err.stage()).await
            }
        };

        histogram!(METRIC_PIPELINE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        outcome
    }

    /// Mark a job failed without running the pipeline.
    pub async fn reject(&self, job_id: Uuid, quote_id: Uuid, stage: &'static str) -> ProcessOutcome {
        self.record_failure(job_id, quote_id, stage).await
    }

    /// Fail pending jobs created more than `older_than` ago.
    ///
    /// Run at startup, before the pool accepts work: such jobs belong to a
    /// process that stopped without recording their outcome.
    pub async fn fail_stale(&self, older_than: Duration) -> Result<usize, RepoError> {
        let cutoff = OffsetDateTime::now_utc() - older_than;
        let failed = self.jobs.fail_stale_pending(cutoff).await?;
        for job in &failed {
            counter!(METRIC_JOBS_FAILED, "stage" => "stale").increment(1);
            warn!(
                target: "quotepdf::jobs",
                job_id = %job.id,
                quote_id = %job.quote_id,
                created_at = %job.created_at,
                "stale pending pdf job failed"
            );
        }
        Ok(failed.len())
    }

    async fn record_completion(
        &self,
        job_id: Uuid,
        quote_id: Uuid,
        artifact_ref: &str,
    ) -> ProcessOutcome {
        match self.jobs.complete_pending(job_id, artifact_ref).await {
            Ok(Some(record)) => {
                counter!(METRIC_JOBS_COMPLETED).increment(1);
                info!(
                    target: "quotepdf::jobs",
                    job_id = %job_id,
                    quote_id = %quote_id,
                    artifact = %artifact_ref,
                    "pdf job completed"
                );
                ProcessOutcome::Completed(record)
            }
            Ok(None) => {
                info!(
                    target: "quotepdf::jobs",
                    job_id = %job_id,
                    "pdf job already terminal; completion ignored"
                );
                ProcessOutcome::Superseded
            }
            Err(err) => {
                error!(
                    target: "quotepdf::jobs",
                    job_id = %job_id,
                    quote_id = %quote_id,
                    error = %err,
                    "failed to record pdf job completion"
                );
                self.record_failure(job_id, quote_id, "persist").await
            }
        }
    }

    async fn record_failure(
        &self,
        job_id: Uuid,
        quote_id: Uuid,
        stage: &'static str,
    ) -> ProcessOutcome {
        for attempt in 1..=TERMINAL_WRITE_ATTEMPTS {
            match self.jobs.fail_pending(job_id).await {
                Ok(Some(_)) => {
                    counter!(METRIC_JOBS_FAILED, "stage" => stage).increment(1);
                    info!(
                        target: "quotepdf::jobs",
                        job_id = %job_id,
                        quote_id = %quote_id,
                        stage,
                        "pdf job failed"
                    );
                    return ProcessOutcome::Failed { stage };
                }
                Ok(None) => return ProcessOutcome::Superseded,
                Err(err) => {
                    error!(
                        target: "quotepdf::jobs",
                        job_id = %job_id,
                        quote_id = %quote_id,
                        attempt,
                        error = %err,
                        "failed to record pdf job failure"
                    );
                    if attempt < TERMINAL_WRITE_ATTEMPTS {
                        tokio::time::sleep(TERMINAL_WRITE_BACKOFF * attempt).await;
                    }
                }
            }
        }
        ProcessOutcome::Unrecorded
    }
}
