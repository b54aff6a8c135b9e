/// JSON response helpers shared by every route
use crate::errors::DashError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

pub fn success_response<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn status_for(error: &DashError) -> StatusCode {
    match error {
        DashError::UnknownTopic { .. } => StatusCode::BAD_REQUEST,
        DashError::ShuttingDown(_) => StatusCode::SERVICE_UNAVAILABLE,
        DashError::ProbeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DashError::CollectTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(error: &DashError) -> Response {
    let body = ErrorResponse {
        error: ErrorDetails {
            code: error.code().to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        },
    };
    (status_for(error), Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let unknown = DashError::UnknownTopic {
            topic: "x".to_string(),
            supported: "\"host\"".to_string(),
        };
        assert_eq!(status_for(&unknown), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&DashError::ShuttingDown("host".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&DashError::NotInitialized { module: "host".to_string() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
