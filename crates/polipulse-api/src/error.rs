use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use polipulse_types::models::SubmissionStatus;

/// The three ways an operation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotAuthenticated,
    StoreRejected,
    ValidationFailed,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::StoreRejected => "store_rejected",
            Self::ValidationFailed => "validation_failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("cannot move a submission from {from} to {to}")]
    InvalidTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthenticated => ErrorKind::NotAuthenticated,
            Self::Validation(_) | Self::InvalidTransition { .. } => ErrorKind::ValidationFailed,
            Self::Forbidden(_) | Self::NotFound(_) | Self::Store(_) => ErrorKind::StoreRejected,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Store(e) => {
                error!("Store error: {:#}", e);
                "internal error".to_string()
            }
            other => {
                warn!("Rejected request: {}", other);
                other.to_string()
            }
        };

        let body = serde_json::json!({
            "error": self.kind().as_str(),
            "message": message,
        });
        (self.status(), Json(body)).into_response()
    }
}
