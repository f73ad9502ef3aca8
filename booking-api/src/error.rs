use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use booking_service::ServiceError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    /// The broker did not take the event; the caller may retry.
    Unavailable(String),
    Timeout(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "EXTERNAL_ERROR"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "INTERNAL_ERROR"),
            AppError::Anyhow(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.parts();
        let message = match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Unavailable(msg)
            | AppError::Timeout(msg) => msg,
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                "Internal Server Error".to_string()
            }
        };

        let body = Json(json!({
            "success": false,
            "error": { "type": kind, "message": message },
        }));

        (status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => AppError::Validation(msg),
            ServiceError::NotFound(entity) => AppError::NotFound(format!("{entity} not found")),
            ServiceError::Conflict(msg) => AppError::Conflict(msg),
            ServiceError::Publish(source) => {
                tracing::warn!(error = %source, "Event publish failed");
                AppError::Unavailable("event could not be published, try again".into())
            }
            other @ ServiceError::Storage(_) => AppError::Anyhow(other.into()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
