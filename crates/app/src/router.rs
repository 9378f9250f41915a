use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use projdesk_core::ProjectService;
use projdesk_util::AppConfig;

use crate::{projects, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    projects: ProjectService,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, projects: ProjectService) -> Self {
        Self { metrics, projects }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn projects(&self) -> &ProjectService {
        &self.projects
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .merge(projects::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the dashboard: the configured origin when set, anything in
/// development, nothing otherwise.
pub fn cors_layer(config: &AppConfig) -> Result<Option<CorsLayer>, header::InvalidHeaderValue> {
    let methods = [Method::GET, Method::POST, Method::PATCH, Method::DELETE];

    if let Some(origin) = &config.cors_origin {
        let origin = HeaderValue::from_str(origin)?;
        return Ok(Some(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(methods)
                .allow_headers([header::CONTENT_TYPE]),
        ));
    }

    if config.environment.is_development() {
        return Ok(Some(CorsLayer::permissive()));
    }

    Ok(None)
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    match state.projects().ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            warn!(stage = "health", error = %err, "store ping failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
