//! Client for the quote PDF job API and the poller that drives a job to a result.

pub mod client;
pub mod poller;

pub use client::{CliError, DEFAULT_REQUEST_TIMEOUT, HttpJobsApi, JobsApi};
pub use poller::{PdfPoller, PollOutcome, PollerConfig};
