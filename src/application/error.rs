use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    application::repos::RepoError, cache::CacheError, domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failure taxonomy shared by every domain service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("internal error: {0}")]
    Internal(String),
    /// Only produced when a strict invalidation could leave private data cached.
    #[error("cache invalidation failed: {0}")]
    Cache(#[from] CacheError),
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Translate a unique-constraint violation into `Conflict`, leaving other failures intact.
    pub fn conflict_on_duplicate(what: &'static str) -> impl FnOnce(RepoError) -> ServiceError {
        move |err| match err {
            RepoError::Duplicate { .. } => ServiceError::Conflict(what),
            other => ServiceError::Repo(other),
        }
    }

    /// Translate a repository `NotFound` into the entity-specific variant.
    pub fn not_found_on_missing(what: &'static str) -> impl FnOnce(RepoError) -> ServiceError {
        move |err| match err {
            RepoError::NotFound => ServiceError::NotFound(what),
            other => ServiceError::Repo(other),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        ServiceError::BadRequest(err.to_string())
    }
}

/// Errors surfaced by the binary during startup and shutdown.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_maps_to_conflict() {
        let err = ServiceError::conflict_on_duplicate("rating")(RepoError::Duplicate {
            constraint: "ratings_story_author_key".into(),
        });
        assert!(matches!(err, ServiceError::Conflict("rating")));

        let err = ServiceError::conflict_on_duplicate("rating")(RepoError::Timeout);
        assert!(matches!(err, ServiceError::Repo(RepoError::Timeout)));
    }

    #[test]
    fn domain_errors_become_bad_requests() {
        let err: ServiceError = DomainError::OutOfRange {
            field: "rate",
            min: 0,
            max: 10,
            value: 11,
        }
        .into();
        assert!(matches!(err, ServiceError::BadRequest(ref m) if m.contains("between 0 and 10")));
    }

    #[test]
    fn report_collects_source_chain() {
        let err = ServiceError::Repo(RepoError::Persistence("connection reset".into()));
        let report =
            ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &err);
        assert_eq!(report.messages[0], "persistence error: connection reset");
    }
}
