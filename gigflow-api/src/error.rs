use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gigflow_core::EngineError;
use serde_json::json;

/// HTTP boundary for the engine's error taxonomy. Every failure carries its
/// kind and a human-readable reason; internals are logged, not leaked.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self.0 {
            EngineError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg.clone()),
            EngineError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            EngineError::InvalidTransition { .. } => (
                StatusCode::CONFLICT,
                "invalid_transition",
                self.0.to_string(),
            ),
            EngineError::ConcurrentModification(msg) => (
                StatusCode::CONFLICT,
                "concurrent_modification",
                msg.clone(),
            ),
            EngineError::Persistence(msg) => {
                tracing::error!("Persistence failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "persistence",
                    "Internal Server Error".to_string(),
                )
            }
            EngineError::Dependency(msg) => {
                tracing::error!("Dependency failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "dependency",
                    "Upstream dependency failed".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": { "kind": kind, "message": message },
        }));

        (status, body).into_response()
    }
}
