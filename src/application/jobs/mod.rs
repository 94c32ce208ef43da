//! PDF job orchestration: processing pipeline, worker pool and service.

mod pipeline;
mod service;
mod worker;

pub use pipeline::{JobProcessor, PdfPipeline, PipelineError, ProcessOutcome};
pub use service::{JobPatch, PdfJobError, PdfJobService, SubmitOutcome};
pub use worker::{EnqueueError, PdfJobQueue, PdfTask, PdfWorkerPool};

pub const METRIC_JOBS_SUBMITTED: &str = "quotepdf_jobs_submitted_total";
pub const METRIC_JOBS_COMPLETED: &str = "quotepdf_jobs_completed_total";
pub const METRIC_JOBS_FAILED: &str = "quotepdf_jobs_failed_total";
pub const METRIC_QUEUE_REJECTED: &str = "quotepdf_jobs_queue_rejected_total";
pub const METRIC_JOBS_INFLIGHT: &str = "quotepdf_jobs_inflight";
pub const METRIC_PIPELINE_MS: &str = "quotepdf_job_pipeline_ms";
