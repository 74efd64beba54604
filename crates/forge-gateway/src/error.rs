//! API error types and responses.
//!
//! Every error response is JSON `{error, message, display_message?}`,
//! where `error` is a stable machine-readable code and `display_message`
//! is optional consumer-facing copy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use forge_cluster::ClusterError;
use forge_core::IdError;
use forge_processor::ProcessorError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A dependency is unavailable or not ready.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_message: Option<&'static str>,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal_server_error",
        }
    }

    /// Consumer-facing copy, where the code alone is not enough.
    #[must_use]
    pub const fn display_message(&self) -> Option<&'static str> {
        match self {
            Self::NotFound(_) => Some("The requested agent does not exist."),
            Self::ServiceUnavailable(_) => {
                Some("The agent is not available right now. Please try again shortly.")
            }
            Self::Internal(_) => Some("Something went wrong on our side."),
            Self::BadRequest(_) | Self::Unauthorized => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            display_message: self.display_message(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::PodNotFound(name) => Self::NotFound(format!("agent pod {name}")),
            ClusterError::NotReady(name) => {
                Self::ServiceUnavailable(format!("agent pod {name} has no address yet"))
            }
            ClusterError::Api(e) => Self::ServiceUnavailable(format!("cluster API: {e}")),
            ClusterError::AlreadyExists(name) => {
                Self::Internal(format!("pod name collision for {name}"))
            }
            ClusterError::PodDeleted(name) => {
                Self::ServiceUnavailable(format!("agent pod {name} was deleted"))
            }
            ClusterError::Watch(msg) | ClusterError::Config(msg) => Self::Internal(msg),
        }
    }
}

impl From<ProcessorError> for ApiError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Cluster(e) => Self::from(e),
            ProcessorError::Rpc(e) => Self::ServiceUnavailable(e.to_string()),
            ProcessorError::ReadyTimeout(name) => {
                Self::ServiceUnavailable(format!("agent pod {name} never became ready"))
            }
            ProcessorError::Stream(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::ServiceUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_codes() {
        assert_eq!(ApiError::BadRequest("x".into()).code(), "bad_request");
        assert_eq!(ApiError::Unauthorized.code(), "unauthorized");
        assert_eq!(ApiError::NotFound("x".into()).code(), "not_found");
        assert_eq!(
            ApiError::ServiceUnavailable("x".into()).code(),
            "service_unavailable"
        );
        assert_eq!(ApiError::Internal("x".into()).code(), "internal_server_error");
    }

    #[test]
    fn cluster_errors_map_to_api_errors() {
        assert!(matches!(
            ApiError::from(ClusterError::PodNotFound("p".into())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(ClusterError::NotReady("p".into())),
            ApiError::ServiceUnavailable(_)
        ));
    }
}
