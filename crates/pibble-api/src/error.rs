use axum::{
    Json,
    extract::multipart::MultipartError,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use pibble_types::api::StatusResponse;
use pibble_types::error::ChatError;

/// Everything an HTTP handler can fail with. Rendered as
/// `{"success": false, "message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("{}", multipart_message(.0))]
    Multipart(#[from] MultipartError),

    #[error("Malformed request body: {0}")]
    Json(#[from] JsonRejection),

    #[error("Server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Chat(ChatError::Authentication(_)) => StatusCode::UNAUTHORIZED,
            Self::Chat(ChatError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Chat(ChatError::Forbidden(_)) => StatusCode::FORBIDDEN,
            Self::Chat(ChatError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Chat(ChatError::PayloadTooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Chat(ChatError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Multipart(e) => e.status(),
            Self::Json(e) => e.status(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn multipart_message(e: &MultipartError) -> String {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        "Upload exceeds the size limit".to_string()
    } else {
        format!("Malformed upload: {}", e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(e) => error!("Request failed: {:#}", e),
            other if status.is_server_error() => error!("Request failed: {}", other),
            other => warn!("Request rejected ({}): {}", status.as_u16(), other),
        }

        let body = StatusResponse {
            success: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
