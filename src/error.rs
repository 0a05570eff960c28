//! Service error types and their HTTP mappings.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors that can occur while handling an analysis request.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// Malformed client input: empty field, missing part, bad path.
    #[error("{0}")]
    Validation(String),

    /// The uploaded bytes could not be decoded as an image.
    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// A pipeline precondition failed (missing image reference).
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// No credential configured for the calling session.
    #[error("API key not configured")]
    MissingCredential,

    /// The provider factory could not construct a provider.
    #[error("Analysis provider could not be initialized")]
    ProviderUnavailable,

    /// The remote analysis call failed or returned unusable data.
    #[error("Analysis failed: {0}")]
    AnalysisFailure(String),

    /// Filesystem error while handling a transient image.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::Precondition(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::MissingCredential => StatusCode::FORBIDDEN,
            // Decode happens during processing, after the request-shape
            // checks have passed.
            ServiceError::Decode(_)
            | ServiceError::ProviderUnavailable
            | ServiceError::AnalysisFailure(_)
            | ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A client-safe message. Full detail goes to the server log only.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Validation(message) => message.clone(),
            ServiceError::Decode(_) => "Uploaded file is not a supported image.".to_string(),
            ServiceError::Precondition(message) => message.clone(),
            ServiceError::MissingCredential => "API key not configured.".to_string(),
            ServiceError::ProviderUnavailable => {
                "Analysis provider could not be initialized. Check API key.".to_string()
            }
            ServiceError::AnalysisFailure(_) => {
                "An error occurred during analysis. Please check server logs.".to_string()
            }
            ServiceError::Io(_) => "Error processing image. Please check server logs.".to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "success": false, "error": self.user_message() }));
        (status, body).into_response()
    }
}
