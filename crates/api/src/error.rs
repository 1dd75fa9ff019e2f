//! Maps domain/infra errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<db::DbError> for ApiError {
    fn from(err: db::DbError) -> Self {
        match err {
            db::DbError::NotFound => ApiError::NotFound,
            db::DbError::AlreadyExists(existing) => {
                ApiError::Conflict(format!("execution {} already exists for this idempotency key", existing.id))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<engine::EngineError> for ApiError {
    fn from(err: engine::EngineError) -> Self {
        use engine::EngineError::*;
        match err {
            Database(db_err) => db_err.into(),
            Queue(queue_err) => ApiError::Internal(queue_err.to_string()),
            Conflict(msg) => ApiError::Conflict(msg),
            QuotaExceeded { .. } => ApiError::QuotaExceeded,
            BadWorkflow(msg) | NodeBadConfig { message: msg, .. } => ApiError::BadRequest(msg),
            DuplicateNodeId(_) | UnknownNodeReference { .. } | CycleDetected | UnknownBlockType(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::QuotaExceeded => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
