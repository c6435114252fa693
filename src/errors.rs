use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unable to validate token - {0}")]
    Unauthorized(TokenError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for AppError {
    /// Rejections become 403s; key and store faults are server errors.
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Store(inner) => AppError::Internal(inner),
            TokenError::Key(msg) => AppError::Internal(anyhow::anyhow!("cipher key: {}", msg)),
            rejection => AppError::Unauthorized(rejection),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Unauthorized(_) => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "invalid_token",
                self.to_string(),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                "Not found".to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
