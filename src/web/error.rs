use crate::services::posts::PostError;
use crate::services::ValidationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            Self::Internal(err) => {
                tracing::error!("Application error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        let body = serde_json::json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ValidationError>() {
            Some(invalid) => Self::BadRequest(invalid.0.clone()),
            None => Self::Internal(err),
        }
    }
}

impl From<PostError> for ApiError {
    fn from(err: PostError) -> Self {
        match err {
            PostError::Invalid(msg) => Self::BadRequest(msg),
            PostError::NotFound => Self::NotFound("Post not found".to_string()),
            err @ (PostError::SlugConflict { .. } | PostError::WriteFailed(_)) => {
                Self::Conflict(err.to_string())
            }
            PostError::Storage(err) => Self::from(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
