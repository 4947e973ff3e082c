use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::persistence::PersistenceError;
use crate::pipeline::PipelineError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data or configuration
    #[error("{message}")]
    BadRequest { message: String },

    /// Store code is not on the roster
    #[error("Invalid Code: {store_code}")]
    InvalidStoreCode { store_code: String },

    /// Upload exceeded the configured limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// The capture was processed but its audit record was not saved
    #[error("Audit record not saved: {0}")]
    NotSaved(#[from] PersistenceError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidStoreCode { .. } => StatusCode::NOT_FOUND,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::NotSaved(_) => StatusCode::BAD_GATEWAY,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => message.clone(),
            Error::InvalidStoreCode { .. } => "Invalid Code".to_string(),
            Error::NotSaved(_) => "Audit was not saved. Please resubmit the photo.".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl From<PipelineError> for Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidImage(e) => Error::BadRequest { message: e.to_string() },
            PipelineError::Archive(e) => Error::Other(anyhow::Error::new(e).context("archive encoding failed")),
            PipelineError::NotSaved(e) => Error::NotSaved(e),
            PipelineError::Task(e) => Error::Other(e.into()),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::NotSaved(_) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::BadRequest { .. } | Error::InvalidStoreCode { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            // Reported apart from every verdict so clients never render it as a FAIL
            Error::NotSaved(_) => {
                let body = json!({
                    "outcome": "not_saved",
                    "message": self.user_message(),
                });
                (status, Json(body)).into_response()
            }
            _ => (status, self.user_message()).into_response(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
