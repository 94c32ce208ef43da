//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CliArgs, Command, DatabaseOverride, IssueSessionArgs, MigrateArgs, ServeArgs, ServeOverrides,
};

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::types::PdfJobVariant;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quotepdf";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_RENDER_ENDPOINT: &str = "http://127.0.0.1:8088/render";
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STORAGE_DIR: &str = "artifacts";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:3000/artifacts";
const DEFAULT_WORKER_CONCURRENCY: u32 = 4;
const DEFAULT_QUEUE_CAPACITY: u32 = 64;
const DEFAULT_STALE_AFTER_SECS: u64 = 15 * 60;
const DEFAULT_SESSION_COOKIE: &str = "quotepdf_session";
const DEFAULT_SESSION_TTL_SECS: u64 = 12 * 60 * 60;
const DEFAULT_SESSION_REFRESH_SECS: u64 = 60 * 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub render: RenderSettings,
    pub storage: StorageSettings,
    pub jobs: JobsSettings,
    pub sessions: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub endpoint: Url,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Filesystem { directory: PathBuf },
    Http { base_url: Url, token: Option<String> },
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub public_base_url: String,
    /// Per-request deadline of the http backend.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub variant: PdfJobVariant,
    pub worker_concurrency: NonZeroU32,
    pub queue_capacity: NonZeroU32,
    /// Pending jobs older than this at startup are failed.
    pub stale_after: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub ttl: time::Duration,
    pub refresh_threshold: time::Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("QUOTEPDF").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        Some(Command::IssueSession(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    render: RawRenderSettings,
    storage: RawStorageSettings,
    jobs: RawJobsSettings,
    sessions: RawSessionSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(endpoint) = overrides.render_endpoint.as_ref() {
            self.render.endpoint = Some(endpoint.clone());
        }
        if let Some(seconds) = overrides.render_timeout_seconds {
            self.render.timeout_seconds = Some(seconds);
        }
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
        if let Some(seconds) = overrides.storage_timeout_seconds {
            self.storage.timeout_seconds = Some(seconds);
        }
        if let Some(base) = overrides.storage_public_base_url.as_ref() {
            self.storage.public_base_url = Some(base.clone());
        }
        if let Some(variant) = overrides.jobs_variant.as_ref() {
            self.jobs.variant = Some(variant.clone());
        }
        if let Some(value) = overrides.jobs_worker_concurrency {
            self.jobs.worker_concurrency = Some(value);
        }
        if let Some(value) = overrides.jobs_queue_capacity {
            self.jobs.queue_capacity = Some(value);
        }
        if let Some(seconds) = overrides.jobs_stale_after_seconds {
            self.jobs.stale_after_seconds = Some(seconds);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            render,
            storage,
            jobs,
            sessions,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            render: build_render_settings(render)?,
            storage: build_storage_settings(storage)?,
            jobs: build_jobs_settings(jobs)?,
            sessions: build_session_settings(sessions)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let endpoint = parse_http_url(
        render.endpoint.as_deref().unwrap_or(DEFAULT_RENDER_ENDPOINT),
        "render.endpoint",
    )?;

    let timeout = positive_seconds(
        render.timeout_seconds.unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS),
        "render.timeout_seconds",
    )?;

    Ok(RenderSettings {
        endpoint,
        api_key: non_blank(render.api_key),
        timeout,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let backend = match storage.backend.as_deref().map(str::trim) {
        None | Some("filesystem") => {
            let directory = storage
                .directory
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
            if directory.as_os_str().is_empty() {
                return Err(LoadError::invalid(
                    "storage.directory",
                    "path must not be empty",
                ));
            }
            StorageBackend::Filesystem { directory }
        }
        Some("http") => {
            let raw = non_blank(storage.base_url).ok_or_else(|| {
                LoadError::invalid("storage.base_url", "required for the http backend")
            })?;
            StorageBackend::Http {
                base_url: parse_http_url(&raw, "storage.base_url")?,
                token: non_blank(storage.token),
            }
        }
        Some(other) => {
            return Err(LoadError::invalid(
                "storage.backend",
                format!("unknown backend `{other}` (expected filesystem or http)"),
            ));
        }
    };

    let public_base_url = non_blank(storage.public_base_url)
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
    parse_http_url(&public_base_url, "storage.public_base_url")?;

    let timeout = positive_seconds(
        storage.timeout_seconds.unwrap_or(DEFAULT_STORAGE_TIMEOUT_SECS),
        "storage.timeout_seconds",
    )?;

    Ok(StorageSettings {
        backend,
        public_base_url,
        timeout,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let variant = match jobs.variant.as_deref() {
        Some(raw) => PdfJobVariant::from_str(raw)
            .map_err(|err| LoadError::invalid("jobs.variant", err.to_string()))?,
        None => PdfJobVariant::DetachedAnonymous,
    };

    Ok(JobsSettings {
        variant,
        worker_concurrency: non_zero_u32(
            jobs.worker_concurrency
                .unwrap_or(DEFAULT_WORKER_CONCURRENCY)
                .into(),
            "jobs.worker_concurrency",
        )?,
        queue_capacity: non_zero_u32(
            jobs.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY).into(),
            "jobs.queue_capacity",
        )?,
        stale_after: positive_seconds(
            jobs.stale_after_seconds.unwrap_or(DEFAULT_STALE_AFTER_SECS),
            "jobs.stale_after_seconds",
        )?,
    })
}

fn build_session_settings(sessions: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let cookie_name = non_blank(sessions.cookie_name)
        .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());
    if cookie_name
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ';' | '=' | ','))
    {
        return Err(LoadError::invalid(
            "sessions.cookie_name",
            "must be a valid cookie token",
        ));
    }

    let ttl_secs = sessions.ttl_seconds.unwrap_or(DEFAULT_SESSION_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "sessions.ttl_seconds",
            "must be greater than zero",
        ));
    }
    let refresh_secs = sessions
        .refresh_threshold_seconds
        .unwrap_or(DEFAULT_SESSION_REFRESH_SECS);
    if refresh_secs > ttl_secs {
        return Err(LoadError::invalid(
            "sessions.refresh_threshold_seconds",
            "must not exceed sessions.ttl_seconds",
        ));
    }

    Ok(SessionSettings {
        cookie_name,
        cookie_secure: sessions.cookie_secure.unwrap_or(false),
        ttl: seconds(ttl_secs, "sessions.ttl_seconds")?,
        refresh_threshold: seconds(refresh_secs, "sessions.refresh_threshold_seconds")?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<String>,
    directory: Option<PathBuf>,
    base_url: Option<String>,
    token: Option<String>,
    public_base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    variant: Option<String>,
    worker_concurrency: Option<u32>,
    queue_capacity: Option<u32>,
    stale_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    cookie_name: Option<String>,
    cookie_secure: Option<bool>,
    ttl_seconds: Option<u64>,
    refresh_threshold_seconds: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_http_url(raw: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{raw}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "URL scheme must be http or https"));
    }
    Ok(url)
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn seconds(value: u64, key: &'static str) -> Result<time::Duration, LoadError> {
    i64::try_from(value)
        .map(time::Duration::seconds)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range"))
}
