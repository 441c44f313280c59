use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::{ErrorReport, ServiceError};
use crate::application::repos::RepoError;

const SOURCE: &str = "infra::http::api";

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
}

/// Error response: `{ "message": ... }` plus an [`ErrorReport`] for the logging middleware.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    /// Logged only; never sent to clients.
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, None)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn rate_limited(retry_after: u64) -> Response {
        let body = ApiErrorBody {
            message: "Too many requests".to_string(),
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        ErrorReport::from_message(
            "infra::http::api::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            format!("rate_limited: retry_after={retry_after}"),
        )
        .attach(&mut response);
        response
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let detail = Some(err.to_string());
        match err {
            ServiceError::NotFound(what) => {
                Self::new(StatusCode::NOT_FOUND, format!("{what} not found"), detail)
            }
            ServiceError::Forbidden(reason) => Self::new(StatusCode::FORBIDDEN, reason, detail),
            ServiceError::Unauthorized(reason) => {
                Self::new(StatusCode::UNAUTHORIZED, reason, detail)
            }
            ServiceError::Conflict(reason) => Self::new(StatusCode::CONFLICT, reason, detail),
            ServiceError::BadRequest(message) => Self::new(StatusCode::BAD_REQUEST, message, None),
            ServiceError::Repo(RepoError::Timeout) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                detail,
            ),
            ServiceError::Repo(_) | ServiceError::Internal(_) | ServiceError::Cache(_) => {
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    detail,
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = ErrorReport::from_message(
            SOURCE,
            self.status,
            self.detail.as_deref().unwrap_or(&self.message).to_string(),
        );
        let body = ApiErrorBody {
            message: self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::NotFound("story"), StatusCode::NOT_FOUND),
            (ServiceError::Forbidden("not the author"), StatusCode::FORBIDDEN),
            (ServiceError::Unauthorized("login required"), StatusCode::UNAUTHORIZED),
            (ServiceError::Conflict("story already rated"), StatusCode::CONFLICT),
            (ServiceError::bad_request("rate out of range"), StatusCode::BAD_REQUEST),
            (
                ServiceError::Repo(RepoError::Timeout),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::Repo(RepoError::Persistence("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn persistence_details_are_not_exposed() {
        let err = ApiError::from(ServiceError::Repo(RepoError::Persistence(
            "relation \"stories\" does not exist".into(),
        )));
        assert_eq!(err.message(), "Internal server error");

        let response = err.into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert!(report.messages[0].contains("does not exist"));
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ApiError::rate_limited(42);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("42"))
        );
    }
}
