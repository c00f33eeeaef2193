use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use types::messages::ServerMessage;

use crate::registry::RegistryError;

/// Central error type for the relay's HTTP surface.
///
/// Every error is request-scoped: it reaches only the requesting session,
/// as a wire-shaped `{type: "error"}` body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<RegistryError> for AppError {
    fn from(error: RegistryError) -> Self {
        // All registry rejections are caller mistakes, never relay faults.
        AppError::BadRequest(error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        let body = Json(ServerMessage::Error { message });
        (status, body).into_response()
    }
}
