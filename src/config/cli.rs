use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the quotepdf binary.
#[derive(Debug, Parser)]
#[command(name = "quotepdf", version, about = "Quote PDF generation service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "QUOTEPDF_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service and the PDF worker pool.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
    /// Create a session for a user and print its cookie token.
    #[command(name = "issue-session")]
    IssueSession(IssueSessionArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Clone)]
pub struct IssueSessionArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Principal recorded on the session and on jobs it creates.
    #[arg(long = "user", value_name = "NAME")]
    pub user: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the render service endpoint.
    #[arg(long = "render-endpoint", value_name = "URL")]
    pub render_endpoint: Option<String>,

    /// Override the render request timeout.
    #[arg(long = "render-timeout-seconds", value_name = "SECONDS")]
    pub render_timeout_seconds: Option<u64>,

    /// Override the artifact directory of the filesystem backend.
    #[arg(long = "storage-directory", value_name = "PATH")]
    pub storage_directory: Option<PathBuf>,

    /// Override the request timeout of the http storage backend.
    #[arg(long = "storage-timeout-seconds", value_name = "SECONDS")]
    pub storage_timeout_seconds: Option<u64>,

    /// Override the base URL used to build public artifact links.
    #[arg(long = "storage-public-base-url", value_name = "URL")]
    pub storage_public_base_url: Option<String>,

    /// Override the processing variant (detached_anonymous|inline_owner_scoped).
    #[arg(long = "jobs-variant", value_name = "VARIANT")]
    pub jobs_variant: Option<String>,

    /// Override the number of PDF jobs processed concurrently.
    #[arg(long = "jobs-worker-concurrency", value_name = "COUNT")]
    pub jobs_worker_concurrency: Option<u32>,

    /// Override the number of PDF jobs allowed to wait for a worker.
    #[arg(long = "jobs-queue-capacity", value_name = "COUNT")]
    pub jobs_queue_capacity: Option<u32>,

    /// Override the age after which a pending job left by a previous run is failed.
    #[arg(long = "jobs-stale-after-seconds", value_name = "SECONDS")]
    pub jobs_stale_after_seconds: Option<u64>,
}
