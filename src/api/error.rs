use crate::auth::AuthError;
use crate::speech::SpeechError;
use crate::translation::TranslationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

pub const MISSING_PARAMETERS: &str = "Missing required parameters";

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    NotFound(String),

    /// Provider failure; the message is what the caller sees
    #[error("{0}")]
    Upstream(String),

    #[error("User directory is not configured")]
    DirectoryUnavailable,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DirectoryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<TranslationError> for ApiError {
    fn from(e: TranslationError) -> Self {
        match e {
            TranslationError::InvalidInput(message) => ApiError::BadRequest(message),
            TranslationError::Unsupported(_) => ApiError::BadRequest("Invalid language".to_string()),
            TranslationError::UpstreamFailure(detail) => {
                error!("Translation error: {}", detail);
                ApiError::Upstream("Failed to translate text".to_string())
            }
        }
    }
}

impl From<SpeechError> for ApiError {
    fn from(e: SpeechError) -> Self {
        match e {
            SpeechError::InvalidInput(message) => ApiError::BadRequest(message),
            SpeechError::Unsupported(_) => {
                ApiError::BadRequest("Language not supported for speech".to_string())
            }
            SpeechError::NotConfigured => {
                ApiError::Upstream(SpeechError::NotConfigured.to_string())
            }
            SpeechError::UpstreamFailure(detail) => {
                error!("Speech synthesis error: {}", detail);
                ApiError::Upstream("Failed to synthesize speech".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
