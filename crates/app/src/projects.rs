use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, error};

use projdesk_core::{
    ErrorKind, ListParams, Project, ProjectDraft, ProjectId, ProjectQuerySpec, ProjectStatus,
    ServiceError,
};

use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::telemetry;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/:id", get(get_project).delete(delete_project))
        .route("/projects/:id/status", patch(update_project_status))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    #[serde(default)]
    status: Option<String>,
}

async fn create_project(
    State(state): State<AppState>,
    body: Result<Json<ProjectDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Project>), ProblemResponse> {
    let Json(draft) = body.map_err(|err| invalid_body("create", err))?;
    let project = state
        .projects()
        .create(draft)
        .await
        .map_err(|err| reject("create", err))?;

    telemetry::record_request("create", "ok");
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(
    State(state): State<AppState>,
    query: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Project>>, ProblemResponse> {
    let Query(params) = query.map_err(|err| {
        telemetry::record_request("list", ErrorKind::Validation.as_str());
        ProblemResponse::bad_request("invalid_query", err.body_text())
    })?;
    let query_spec = ProjectQuerySpec::from_params(params)
        .map_err(|err| reject("list", ServiceError::from(err)))?;
    let projects = state
        .projects()
        .list(&query_spec)
        .await
        .map_err(|err| reject("list", err))?;

    telemetry::record_request("list", "ok");
    Ok(Json(projects))
}

async fn get_project(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Project>, ProblemResponse> {
    let id = parse_id("get", &raw_id)?;
    let project = state
        .projects()
        .get_by_id(id)
        .await
        .map_err(|err| reject("get", err))?;

    telemetry::record_request("get", "ok");
    Ok(Json(project))
}

async fn update_project_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Project>, ProblemResponse> {
    let id = parse_id("update_status", &raw_id)?;
    let Json(request) = body.map_err(|err| invalid_body("update_status", err))?;

    let raw_status = request
        .status
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            telemetry::record_request("update_status", ErrorKind::Validation.as_str());
            ProblemResponse::bad_request("validation_error", "Status is required")
        })?;
    let requested = raw_status
        .parse::<ProjectStatus>()
        .map_err(|err| reject("update_status", ServiceError::from(err)))?;

    let project = state
        .projects()
        .update_status(id, requested)
        .await
        .map_err(|err| reject("update_status", err))?;

    telemetry::record_request("update_status", "ok");
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ProblemResponse> {
    let id = parse_id("delete", &raw_id)?;
    state
        .projects()
        .soft_delete(id)
        .await
        .map_err(|err| reject("delete", err))?;

    telemetry::record_request("delete", "ok");
    Ok(StatusCode::NO_CONTENT)
}

fn parse_id(op: &'static str, raw: &str) -> Result<ProjectId, ProblemResponse> {
    raw.parse::<ProjectId>().map_err(|_| {
        telemetry::record_request(op, ErrorKind::Validation.as_str());
        ProblemResponse::bad_request("invalid_id", "Valid project ID is required")
    })
}

fn invalid_body(op: &'static str, err: JsonRejection) -> ProblemResponse {
    telemetry::record_request(op, ErrorKind::Validation.as_str());
    ProblemResponse::bad_request("invalid_body", err.body_text())
}

fn reject(op: &'static str, err: ServiceError) -> ProblemResponse {
    let kind = err.kind();
    telemetry::record_request(op, kind.as_str());
    match kind {
        ErrorKind::Store => error!(stage = "api", op, error = %err, "project store failure"),
        _ => debug!(stage = "api", op, kind = kind.as_str(), error = %err, "request rejected"),
    }
    ProblemResponse::from(err)
}
