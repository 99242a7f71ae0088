use salvo::http::StatusCode;
use salvo::prelude::*;
use salvo::{async_trait, Writer};
use thiserror::Error;

use crate::extract::ExtractError;
use crate::types::ApiError;

/// Errors raised while provisioning the model or serving a request
#[derive(Debug, Error)]
pub enum VisionError {
    /// Missing download URL or unsupported model name; fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Error downloading model: {0}")]
    ModelDownload(String),
    #[error("Failed to initialize vision service: {0}")]
    ModelLoad(String),
    #[error(transparent)]
    BadRequest(#[from] ExtractError),
    /// Any failure of the underlying model call
    #[error("Error analyzing image: {0}")]
    ImageAnalysis(String),
    #[error("Vision service not initialized: {0}")]
    ModelNotReady(String),
}

impl VisionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ModelNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "invalid_request_error",
            Self::ModelNotReady(_) => "service_unavailable",
            _ => "server_error",
        }
    }
}

#[async_trait]
impl Writer for VisionError {
    async fn write(self, _req: &mut Request, _depot: &mut Depot, res: &mut Response) {
        match self.status_code() {
            StatusCode::BAD_REQUEST => tracing::warn!("Rejected request: {}", self),
            _ => tracing::error!("Request failed: {}", self),
        }
        render_error(res, self.status_code(), &self.to_string(), self.error_type());
    }
}

/// Render a standardized error response with proper HTTP status code
pub fn render_error(res: &mut Response, status: StatusCode, message: &str, error_type: &str) {
    res.status_code(status);
    res.render(Json(ApiError::new(message, error_type)));
}
