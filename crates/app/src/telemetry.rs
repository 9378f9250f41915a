use std::{
    sync::{Mutex, OnceLock},
    time::Instant,
};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{
    fmt::time::UtcTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use projdesk_util::{AppConfig, Environment};

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_FILTER: &str = "info,tower_http=info,sqlx=warn";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

/// Recorder handle shared by every caller; the recorder itself is process-global.
static RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);
static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Installs the global subscriber: pretty output outside production, JSON lines in production.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let base = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_timer(UtcTime::rfc_3339());
    let output = match config.environment {
        Environment::Production => base.json().boxed(),
        Environment::Development | Environment::Test => base.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()?;

    tracing::info!(
        stage = "telemetry",
        env = config.environment.as_str(),
        version = BUILD_VERSION,
        "tracing initialized"
    );
    Ok(())
}

/// Installs the Prometheus recorder on first use and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let mut recorder = RECORDER
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = recorder.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *recorder = Some(handle.clone());
    drop(recorder);

    describe_counter!(
        "project_requests_total",
        "Project API requests by operation and result"
    );
    describe_gauge!("app_build_info", "Version of the running binary");
    describe_gauge!("app_uptime_seconds", "Seconds since metrics were installed");

    gauge!("app_build_info", "version" => BUILD_VERSION).set(1.0);
    STARTED_AT.get_or_init(Instant::now);

    Ok(handle)
}

/// Counts one project API request. `result` is `ok` or an error kind.
pub fn record_request(op: &'static str, result: &'static str) {
    counter!("project_requests_total", "op" => op, "result" => result).increment(1);
}

/// Refreshes the uptime gauge and renders the exposition text.
pub fn render_metrics(handle: &PrometheusHandle) -> String {
    if let Some(started) = STARTED_AT.get() {
        gauge!("app_uptime_seconds").set(started.elapsed().as_secs_f64());
    }
    handle.render()
}
