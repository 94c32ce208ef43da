use std::{env, sync::Once};

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter,
    filter::{Directive, LevelFilter},
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::jobs::{
    METRIC_JOBS_COMPLETED, METRIC_JOBS_FAILED, METRIC_JOBS_INFLIGHT, METRIC_JOBS_SUBMITTED,
    METRIC_PIPELINE_MS, METRIC_QUEUE_REJECTED,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Per-query and connection-pool chatter stays out of the logs unless `RUST_LOG` asks for it.
const QUIET_TARGETS: &[&str] = &["sqlx::query=warn", "hyper_util=warn", "reqwest=warn"];

/// Install the process-wide subscriber; `RUST_LOG` overrides the configured level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let output = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(build_filter(logging.level, env::var_os(EnvFilter::DEFAULT_ENV).is_some()))
        .with(ErrorLayer::default())
        .with(output)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

fn build_filter(level: LevelFilter, from_env: bool) -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    if from_env {
        return filter;
    }
    QUIET_TARGETS
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(filter, EnvFilter::add_directive)
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_JOBS_SUBMITTED,
            Unit::Count,
            "PDF jobs created through the submit endpoint, by variant."
        );
        describe_counter!(
            METRIC_JOBS_COMPLETED,
            Unit::Count,
            "PDF jobs that reached the completed state."
        );
        describe_counter!(
            METRIC_JOBS_FAILED,
            Unit::Count,
            "PDF jobs that reached the failed state, by failing stage."
        );
        describe_counter!(
            METRIC_QUEUE_REJECTED,
            Unit::Count,
            "Detached submissions the worker pool refused, by reason."
        );
        describe_gauge!(
            METRIC_JOBS_INFLIGHT,
            Unit::Count,
            "PDF jobs currently executing on the worker pool."
        );
        describe_histogram!(
            METRIC_PIPELINE_MS,
            Unit::Milliseconds,
            "End-to-end pipeline latency per job in milliseconds."
        );
    });
}
