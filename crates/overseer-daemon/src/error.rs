//! Error types for overseer-daemon

use crate::broker::BrokerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use overseer_registry::RegistryError;
use overseer_types::EnvelopeError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] RegistryError),

    /// Broker error
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while handling one inbound message.
///
/// None of these are fatal to the daemon; the message that caused them is
/// logged and dropped.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("bad json incoming message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("incoming message is in wrong format: {0}")]
    SchemaViolation(String),

    #[error("worker '{name}' has an empty uuid")]
    MissingUuid { name: String },

    #[error("monitor data error: worker {0} not found")]
    NotFound(String),

    #[error("command not recognized: {0}")]
    UnrecognizedCommand(String),

    #[error("no valid option specified for add: '{0}'")]
    UnknownOption(String),

    #[error("register to proxy not possible: port number is '0' for {name}")]
    ProxyPortInvalid { name: String },

    #[error("register to proxy not possible: {0}")]
    ProxyRegistration(String),

    #[error("store error: {0}")]
    Store(#[from] RegistryError),

    #[error("could not encode worker response: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("error while publishing message: {0}")]
    Publish(#[from] BrokerError),
}

impl From<EnvelopeError> for HandlerError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Decode(e) => HandlerError::Decode(e),
            other => HandlerError::SchemaViolation(other.to_string()),
        }
    }
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] RegistryError),

    /// Broker error
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Storage(e) if e.is_not_found() => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Broker(_) => (StatusCode::BAD_GATEWAY, "BROKER_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Result type alias for message handling
pub type HandlerResult<T> = Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::NotFound("test".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );

        assert_eq!(
            ApiError::BadRequest("test".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );

        assert_eq!(
            ApiError::Storage(RegistryError::WorkerNotFound("A".to_string()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );

        assert_eq!(
            ApiError::Storage(RegistryError::Query("boom".to_string()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_envelope_errors_map_to_taxonomy() {
        let decode = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        assert!(matches!(
            HandlerError::from(EnvelopeError::Decode(decode)),
            HandlerError::Decode(_)
        ));
        assert!(matches!(
            HandlerError::from(EnvelopeError::Empty),
            HandlerError::SchemaViolation(_)
        ));
        assert!(matches!(
            HandlerError::from(EnvelopeError::Ambiguous),
            HandlerError::SchemaViolation(_)
        ));
    }
}
