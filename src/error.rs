//! Error Types
//!
//! One error enum for the whole library surface. Handlers return it directly
//! and it renders itself as a JSON body with the matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardianError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    UnsupportedDocument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Твърде много заявки, опитайте отново след малко")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Document could not be read: {0}")]
    Extraction(String),

    #[error("{0}")]
    TooLarge(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GuardianError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GuardianError::Validation(_) | GuardianError::UnsupportedDocument(_) => {
                StatusCode::BAD_REQUEST
            }
            GuardianError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GuardianError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GuardianError::NotFound(_) => StatusCode::NOT_FOUND,
            GuardianError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GuardianError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GuardianError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for GuardianError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl From<tokio::task::JoinError> for GuardianError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for GuardianError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "detail": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type GuardianResult<T> = Result<T, GuardianError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GuardianError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GuardianError::UnsupportedDocument("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GuardianError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(GuardianError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            GuardianError::Extraction("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(GuardianError::TooLarge("x".into()).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            GuardianError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GuardianError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = GuardianError::validation("Сумата трябва да е положителна");
        assert_eq!(err.to_string(), "Сумата трябва да е положителна");
    }
}
