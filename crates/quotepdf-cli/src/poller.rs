use std::{future::Future, sync::Arc, time::Duration};

use quotepdf_api_types::QuotePdfStatus;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{CliError, JobsApi};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Upper bound on status requests; `None` polls until the deadline.
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            deadline: Some(DEFAULT_DEADLINE),
        }
    }
}

/// How a generation attempt ended.
#[derive(Debug)]
pub enum PollOutcome {
    Ready { job_id: Uuid, url: String },
    /// The job reached `failed`, or vanished while being polled.
    RenderFailed { job_id: Uuid },
    SubmitFailed(CliError),
    /// A status request failed; polling stops at the first error.
    Unreachable { job_id: Uuid, error: CliError },
    /// The deadline or attempt limit was hit; `job_id` is `None` when submission itself stalled.
    TimedOut { job_id: Option<Uuid>, attempts: u32 },
    Cancelled { job_id: Option<Uuid> },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            PollOutcome::Ready { job_id, .. }
            | PollOutcome::RenderFailed { job_id }
            | PollOutcome::Unreachable { job_id, .. } => Some(*job_id),
            PollOutcome::TimedOut { job_id, .. } | PollOutcome::Cancelled { job_id } => *job_id,
            PollOutcome::SubmitFailed(_) => None,
        }
    }

    /// Message suitable for showing to the person who asked for the PDF.
    pub fn message(&self) -> String {
        match self {
            PollOutcome::Ready { url, .. } => format!("PDF ready: {url}"),
            PollOutcome::RenderFailed { .. } => "Failed to generate PDF".to_string(),
            PollOutcome::SubmitFailed(err) => format!("Failed to start PDF generation: {err}"),
            PollOutcome::Unreachable { error, .. } => {
                format!("Failed to check PDF status: {error}")
            }
            PollOutcome::TimedOut { job_id: None, .. } => {
                "PDF generation did not start in time".to_string()
            }
            PollOutcome::TimedOut { attempts, .. } => {
                format!("PDF generation is taking too long (gave up after {attempts} checks)")
            }
            PollOutcome::Cancelled { .. } => "PDF generation cancelled".to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PollOutcome::Ready { .. } => 0,
            PollOutcome::RenderFailed { .. } => 2,
            PollOutcome::SubmitFailed(_) | PollOutcome::Unreachable { .. } => 3,
            PollOutcome::TimedOut { .. } => 4,
            PollOutcome::Cancelled { .. } => 130,
        }
    }
}

/// Submits a quote for rendering and polls until the job settles.
pub struct PdfPoller {
    api: Arc<dyn JobsApi>,
    config: PollerConfig,
}

impl PdfPoller {
    pub fn new(api: Arc<dyn JobsApi>, config: PollerConfig) -> Self {
        Self { api, config }
    }

    /// Resolves when the job settles, the limits are hit, or `cancel` completes.
    ///
    /// The deadline covers submission and every status request, so a server
    /// that never answers still ends in `TimedOut`. Only one status request is
    /// outstanding at a time, and nothing is requested after cancellation.
    pub async fn generate<C>(&self, quote_id: Uuid, cancel: C) -> PollOutcome
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let expires_at = self.config.deadline.map(|deadline| Instant::now() + deadline);

        let submitted = tokio::select! {
            biased;
            _ = &mut cancel => return PollOutcome::Cancelled { job_id: None },
            _ = expiry(expires_at) => {
                return PollOutcome::TimedOut { job_id: None, attempts: 0 };
            }
            result = self.api.submit(quote_id) => result,
        };
        let submitted = match submitted {
            Ok(response) => response,
            Err(err) => return PollOutcome::SubmitFailed(err),
        };
        let job_id = submitted.job_id;

        if let Some(url) = submitted.url {
            return PollOutcome::Ready { job_id, url };
        }
        if submitted.status == Some(QuotePdfStatus::Failed) {
            return PollOutcome::RenderFailed { job_id };
        }

        info!(target: "quotepdf_cli::poller", %job_id, %quote_id, "pdf job submitted");
        let mut attempts: u32 = 0;
        let timed_out = |attempts| PollOutcome::TimedOut {
            job_id: Some(job_id),
            attempts,
        };

        loop {
            if self.exhausted(expires_at, attempts) {
                return timed_out(attempts);
            }

            tokio::select! {
                biased;
                _ = &mut cancel => return PollOutcome::Cancelled { job_id: Some(job_id) },
                _ = expiry(expires_at) => return timed_out(attempts),
                _ = sleep(self.config.interval) => {}
            }

            let status = tokio::select! {
                biased;
                _ = &mut cancel => return PollOutcome::Cancelled { job_id: Some(job_id) },
                _ = expiry(expires_at) => return timed_out(attempts),
                result = self.api.status(quote_id, job_id) => result,
            };
            attempts += 1;

            let status = match status {
                Ok(status) => status,
                Err(error) => return PollOutcome::Unreachable { job_id, error },
            };
            debug!(
                target: "quotepdf_cli::poller",
                %job_id,
                attempt = attempts,
                status = ?status.status,
                "polled pdf job"
            );

            match status.status {
                QuotePdfStatus::Completed => {
                    return match status.url {
                        Some(url) => PollOutcome::Ready { job_id, url },
                        None => PollOutcome::RenderFailed { job_id },
                    };
                }
                QuotePdfStatus::Failed | QuotePdfStatus::NotFound => {
                    return PollOutcome::RenderFailed { job_id };
                }
                QuotePdfStatus::Pending | QuotePdfStatus::Processing => {}
            }
        }
    }

    fn exhausted(&self, expires_at: Option<Instant>, attempts: u32) -> bool {
        if let Some(max) = self.config.max_attempts
            && attempts >= max
        {
            return true;
        }
        expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Completes at `at`; never completes without a deadline.
async fn expiry(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
