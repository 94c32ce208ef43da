use std::{process, sync::Arc, time::Duration};

use quotepdf::{
    application::{
        artifacts::{ArtifactPublisher, ArtifactRefStyle, ObjectStore},
        error::AppError,
        jobs::{JobProcessor, PdfJobService, PdfPipeline, PdfWorkerPool},
        payload::PayloadBuilder,
        render::RenderClient,
        repos::{PdfJobsRepo, QuotesRepo, SessionsRepo},
        sessions::{SessionPolicy, SessionService},
    },
    config::{self, StorageBackend},
    domain::types::PdfJobVariant,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, HttpState, RouterState, SessionCookie},
        render::HttpRenderClient,
        storage::{FilesystemObjectStore, HttpObjectStore},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::IssueSession(args) => run_issue_session(settings, args).await,
    }
}

async fn connect(settings: &config::Settings) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = connect(&settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    info!(target: "quotepdf::migrate", "migrations applied");
    repositories.close().await;
    Ok(())
}

async fn run_issue_session(
    settings: config::Settings,
    args: config::IssueSessionArgs,
) -> Result<(), AppError> {
    let user = args.user.trim();
    if user.is_empty() {
        return Err(AppError::invalid_argument("--user must not be empty"));
    }

    let repositories = connect(&settings).await?;
    let sessions = session_service(&settings, repositories.clone());
    let issued = sessions.issue(user).await?;
    repositories.close().await;

    println!("{}={}", settings.sessions.cookie_name, issued.token);
    Ok(())
}

fn session_service(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
) -> SessionService {
    let sessions_repo: Arc<dyn SessionsRepo> = repositories;
    SessionService::new(
        sessions_repo,
        SessionPolicy {
            ttl: settings.sessions.ttl,
            refresh_threshold: settings.sessions.refresh_threshold,
        },
    )
}

fn object_store(settings: &config::Settings) -> Result<Arc<dyn ObjectStore>, AppError> {
    Ok(match &settings.storage.backend {
        StorageBackend::Filesystem { directory } => {
            Arc::new(FilesystemObjectStore::new(directory.clone()).map_err(InfraError::from)?)
        }
        StorageBackend::Http { base_url, token } => {
            Arc::new(HttpObjectStore::new(
                base_url.clone(),
                token.clone(),
                settings.storage.timeout,
            )?)
        }
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = connect(&settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    let jobs_repo: Arc<dyn PdfJobsRepo> = repositories.clone();
    let quotes_repo: Arc<dyn QuotesRepo> = repositories.clone();

    let store = object_store(&settings)?;
    let renderer: Arc<dyn RenderClient> = Arc::new(HttpRenderClient::new(
        settings.render.endpoint.clone(),
        settings.render.api_key.clone(),
        settings.render.timeout,
    )?);

    let variant = settings.jobs.variant;
    let ref_style = match variant {
        PdfJobVariant::DetachedAnonymous => ArtifactRefStyle::StorageKey,
        PdfJobVariant::InlineOwnerScoped => ArtifactRefStyle::PublicUrl,
    };
    let publisher = ArtifactPublisher::new(
        store.clone(),
        settings.storage.public_base_url.clone(),
        ref_style,
    );
    let pipeline = Arc::new(PdfPipeline::new(
        PayloadBuilder::new(quotes_repo),
        renderer,
        publisher,
    ));
    let processor = Arc::new(JobProcessor::new(jobs_repo.clone(), pipeline));

    match processor.fail_stale(settings.jobs.stale_after).await {
        Ok(0) => {}
        Ok(failed) => warn!(target: "quotepdf::jobs", failed, "stale pending jobs failed"),
        Err(err) => warn!(target: "quotepdf::jobs", error = %err, "stale job sweep failed"),
    }

    let pool = match variant {
        PdfJobVariant::DetachedAnonymous => Some(PdfWorkerPool::start(
            processor.clone(),
            settings.jobs.worker_concurrency.get() as usize,
            settings.jobs.queue_capacity.get() as usize,
        )),
        PdfJobVariant::InlineOwnerScoped => None,
    };
    let jobs = Arc::new(PdfJobService::new(
        jobs_repo,
        processor,
        pool.as_ref().map(PdfWorkerPool::queue),
        variant,
    ));

    let sessions = Arc::new(session_service(&settings, repositories.clone()));
    match sessions.purge_expired().await {
        Ok(purged) => info!(target: "quotepdf::sessions", purged, "expired sessions removed"),
        Err(err) => warn!(target: "quotepdf::sessions", error = %err, "session purge failed"),
    }

    let router_state = RouterState {
        http: HttpState {
            db: repositories.clone(),
            artifacts: store,
        },
        api: ApiState {
            jobs,
            sessions,
            cookie: SessionCookie {
                name: settings.sessions.cookie_name.clone(),
                secure: settings.sessions.cookie_secure,
                max_age: settings.sessions.ttl,
            },
        },
    };
    let result = serve_http(&settings, router_state).await;

    if let Some(pool) = pool {
        pool.shutdown(settings.server.graceful_shutdown).await;
    }
    repositories.close().await;

    result
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        target: "quotepdf::serve",
        addr = %settings.server.addr,
        variant = settings.jobs.variant.as_str(),
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(AppError::Serve)
}

async fn shutdown_signal(grace: Duration) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target: "quotepdf::serve", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(
        target: "quotepdf::serve",
        grace_secs = grace.as_secs(),
        "shutdown requested; draining connections"
    );
}
