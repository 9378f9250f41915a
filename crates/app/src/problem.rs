use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use projdesk_core::ServiceError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn bad_request<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, problem_type, detail)
    }
}

/// Maps service failures onto status codes. Store faults never leak their detail.
impl From<ServiceError> for ProblemResponse {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(inner) => {
                Self::bad_request("validation_error", inner.message())
            }
            ServiceError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", "Project not found")
            }
            ServiceError::Conflict(_) => Self::new(
                StatusCode::CONFLICT,
                "conflict",
                "Project was modified concurrently, retry the request",
            ),
            ServiceError::Store(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error",
            ),
        }
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projdesk_core::{StoreError, ValidationError};

    #[test]
    fn maps_error_kinds_to_status_codes() {
        let cases = [
            (
                ServiceError::Validation(ValidationError::new("bad")),
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::NotFound(1), StatusCode::NOT_FOUND),
            (ServiceError::Conflict(1), StatusCode::CONFLICT),
            (
                ServiceError::Store(StoreError::Corrupt("row".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ProblemResponse::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn store_detail_is_not_exposed() {
        let problem =
            ProblemResponse::from(ServiceError::Store(StoreError::Corrupt("secret".into())));
        assert_eq!(problem.body.detail, "internal server error");
    }
}
