use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use member_qa_retrieval::RetrievalError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors from the upstream messages API.
#[derive(Error, Debug)]
pub enum MessagesError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("messages API returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("invalid JSON from messages API: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from re-fetching and rebuilding the corpus.
#[derive(Error, Debug)]
pub enum ReloadError {
    #[error(transparent)]
    Messages(#[from] MessagesError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// API-layer error type
#[derive(Debug)]
pub enum ApiError {
    /// 400 - Bad request (invalid input)
    BadRequest(String),

    /// 500 - Internal error
    Internal(String),

    /// 502 - The messages API failed
    BadGateway(String),

    /// 504 - Answering took too long
    Timeout(String),
}

/// JSON error response body
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg),
            ApiError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "timeout", msg),
        };

        let body = ErrorBody {
            error: error_type.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

// Engine failures are reported as service errors, never as "not available".
impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        error!("Retrieval failed: {err}");
        match err {
            RetrievalError::Timeout(limit) => {
                ApiError::Timeout(format!("answer exceeded {}ms", limit.as_millis()))
            }
            RetrievalError::QueryEmbeddingFailure(_) => {
                ApiError::Internal("failed to embed the question".into())
            }
            _ => ApiError::Internal("failed to answer the question".into()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ReloadError> for ApiError {
    fn from(err: ReloadError) -> Self {
        match err {
            ReloadError::Messages(e) => {
                error!("Reload aborted, keeping current index: {e}");
                ApiError::BadGateway(e.to_string())
            }
            ReloadError::Retrieval(e) => {
                error!("Reload failed, keeping current index: {e}");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::BadGateway("x".into()), StatusCode::BAD_GATEWAY),
            (ApiError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let err = ApiError::from(RetrievalError::Timeout(Duration::from_millis(250)));
        assert!(matches!(&err, ApiError::Timeout(msg) if msg == "answer exceeded 250ms"));
    }

    #[test]
    fn test_other_retrieval_errors_are_internal() {
        for err in [
            RetrievalError::EmptyCorpus,
            RetrievalError::SizeMismatch {
                records: 2,
                vectors: 1,
            },
            RetrievalError::ModelUnavailable("gone".into()),
        ] {
            assert!(matches!(ApiError::from(err), ApiError::Internal(_)));
        }
    }
}
