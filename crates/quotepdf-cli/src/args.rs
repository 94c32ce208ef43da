//! Command-line surface for `quotepdf-cli`.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use quotepdf_api_types::PdfJobStatus;
use quotepdf_cli::PollerConfig;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "quotepdf-cli", version, about = "Quote PDF job client", long_about = None)]
pub struct Cli {
    /// Server base URL, e.g. <http://127.0.0.1:3000>
    #[arg(long, env = "QUOTEPDF_SERVER_URL")]
    pub server: Option<String>,

    /// Session cookie pair (`name=token`) from env; no flag to keep it out of shell history
    #[arg(hide = true, env = "QUOTEPDF_SESSION")]
    pub session_env: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a quote for rendering and wait for the PDF link
    Generate(GenerateArgs),
    /// Show the status of one job of a quote
    Status {
        quote_id: Uuid,
        #[arg(long)]
        job_id: Uuid,
    },
    /// Inspect and correct job records owned by the session
    Jobs(JobsArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    pub quote_id: Uuid,
    /// Delay between status checks in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub interval_ms: u64,
    /// Stop after this many status checks
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Give up after this many seconds; 0 disables the deadline
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}

impl GenerateArgs {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.interval_ms.max(1)),
            max_attempts: self.max_attempts,
            deadline: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        }
    }
}

#[derive(Parser, Debug)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub action: JobsCmd,
}

#[derive(Subcommand, Debug)]
pub enum JobsCmd {
    /// List jobs created by the session user
    List,
    /// Show one job
    Get { id: Uuid },
    /// Register a job for a quote; with --s3-key it records an existing artifact
    Create {
        quote_id: Uuid,
        #[arg(long)]
        s3_key: Option<String>,
    },
    /// Override status and/or artifact key
    Patch {
        id: Uuid,
        #[arg(long)]
        status: Option<JobStatusArg>,
        #[arg(long, conflicts_with = "clear_s3_key")]
        s3_key: Option<String>,
        /// Remove the recorded artifact key
        #[arg(long)]
        clear_s3_key: bool,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum JobStatusArg {
    Pending,
    Completed,
    Failed,
}

impl From<JobStatusArg> for PdfJobStatus {
    fn from(value: JobStatusArg) -> Self {
        match value {
            JobStatusArg::Pending => PdfJobStatus::Pending,
            JobStatusArg::Completed => PdfJobStatus::Completed,
            JobStatusArg::Failed => PdfJobStatus::Failed,
        }
    }
}
