use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use unmark_shared::protocol::ApiResponse;
use unmark_shared::UnmarkError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Unmark(#[from] UnmarkError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::Unmark(e) => match e {
                UnmarkError::Validation(_) | UnmarkError::Unsupported => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                UnmarkError::QuotaExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, e.to_string()),
                UnmarkError::IdentityNotFound | UnmarkError::NotFound => {
                    (StatusCode::NOT_FOUND, e.to_string())
                }
                UnmarkError::Upstream(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process image".to_string(),
                ),
                UnmarkError::Persistence(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Image was processed but could not be saved".to_string(),
                ),
                UnmarkError::Store(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
                }
            },
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        (status, axum::Json(ApiResponse::<()>::err(message))).into_response()
    }
}
