use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the routing and context-assembly pipeline.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Requested search service is not in the discovered descriptor set.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("No search services available")]
    EmptyBackendSet,

    #[error("Platform rejected request ({status}): {body}")]
    PlatformRejected { status: u16, body: String },

    #[error("Invalid response from platform: {0}")]
    InvalidResponse(String),

    #[error("Question cannot be empty")]
    EmptyQuestion,

    #[error("A turn is already in progress for this session")]
    TurnInFlight,

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChatError {
    pub fn backend_not_found(name: &str) -> Self {
        Self::Configuration(format!("backend not found: {}", name))
    }

    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        // a timeout while reading the body also reports as a decode error
        if err.is_timeout() || err.is_connect() {
            return ChatError::BackendUnavailable(err.to_string());
        }
        if err.is_decode() {
            return ChatError::InvalidResponse(err.to_string());
        }
        ChatError::BackendUnavailable(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::Configuration(_) => ApiError::InternalError(message),
            ChatError::BackendUnavailable(_) | ChatError::EmptyBackendSet => {
                ApiError::Unavailable(message)
            }
            ChatError::PlatformRejected { .. } | ChatError::InvalidResponse(_) => {
                ApiError::BadGateway(message)
            }
            ChatError::EmptyQuestion | ChatError::InvalidConfig(_) => ApiError::BadRequest(message),
            ChatError::TurnInFlight => ApiError::Conflict(message),
            ChatError::SessionNotFound(_) => ApiError::NotFound(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::Conflict(msg) => {
                tracing::warn!("Conflict: {}", msg);
                (StatusCode::CONFLICT, "Conflict", msg)
            }
            ApiError::Unavailable(msg) => {
                tracing::error!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Unavailable", msg)
            }
            ApiError::BadGateway(msg) => {
                tracing::error!("Bad gateway: {}", msg);
                (StatusCode::BAD_GATEWAY, "BadGateway", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
