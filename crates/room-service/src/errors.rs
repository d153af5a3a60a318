//! Room service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! returned to clients for store and internal failures are generic; the
//! actual error is logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Room service error type.
///
/// Maps to HTTP status codes:
/// - Store, Internal: 500 Internal Server Error
/// - RoomNotFound: 404 Not Found
/// - RoomFull: 409 Conflict
/// - NotParticipant: 403 Forbidden
/// - BadRequest: 400 Bad Request
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Store error: {0}")]
    Store(String),

    /// Room metadata is absent: never created, expired, or destroyed.
    #[error("Room not found")]
    RoomNotFound,

    /// Both participant slots are held by other tokens.
    #[error("Room full")]
    RoomFull,

    #[error("Not a participant of this room")]
    NotParticipant,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RoomError::Store(_) | RoomError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RoomError::RoomNotFound => StatusCode::NOT_FOUND,
            RoomError::RoomFull => StatusCode::CONFLICT,
            RoomError::NotParticipant => StatusCode::FORBIDDEN,
            RoomError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RoomError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable error code for JSON bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            RoomError::Store(_) => "STORE_ERROR",
            RoomError::RoomNotFound => "ROOM_NOT_FOUND",
            RoomError::RoomFull => "ROOM_FULL",
            RoomError::NotParticipant => "NOT_A_PARTICIPANT",
            RoomError::BadRequest(_) => "BAD_REQUEST",
            RoomError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            RoomError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// User-facing reason code carried on the landing redirect.
    ///
    /// Only admission failures have one.
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            RoomError::RoomNotFound => Some("room-not-found"),
            RoomError::RoomFull => Some("room-full"),
            _ => None,
        }
    }

    /// Message safe to return to clients.
    pub fn client_message(&self) -> String {
        match self {
            RoomError::Store(_) | RoomError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            RoomError::ServiceUnavailable(_) => "Service temporarily unavailable".to_string(),
            RoomError::BadRequest(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        match &self {
            RoomError::Store(err) => {
                tracing::error!(target: "room.store", error = %err, "Store operation failed");
            }
            RoomError::Internal(err) => {
                tracing::error!(target: "room.internal", error = %err, "Internal error");
            }
            RoomError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "room.availability", reason = %reason, "Service unavailable");
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.client_message(),
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RoomError::Store("connection reset".to_string()).to_string(),
            "Store error: connection reset"
        );
        assert_eq!(RoomError::RoomNotFound.to_string(), "Room not found");
        assert_eq!(RoomError::RoomFull.to_string(), "Room full");
        assert_eq!(
            RoomError::BadRequest("text is empty".to_string()).to_string(),
            "Bad request: text is empty"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RoomError::Store("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(RoomError::RoomNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(RoomError::RoomFull.status_code(), StatusCode::CONFLICT);
        assert_eq!(RoomError::NotParticipant.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            RoomError::BadRequest("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RoomError::ServiceUnavailable("x".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RoomError::Internal("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_reason_codes_only_for_admission_failures() {
        assert_eq!(RoomError::RoomNotFound.reason_code(), Some("room-not-found"));
        assert_eq!(RoomError::RoomFull.reason_code(), Some("room-full"));
        assert_eq!(RoomError::NotParticipant.reason_code(), None);
        assert_eq!(RoomError::Store("x".to_string()).reason_code(), None);
    }

    #[tokio::test]
    async fn test_into_response_room_not_found() {
        let response = RoomError::RoomNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "ROOM_NOT_FOUND");
        assert_eq!(body["error"]["message"], "Room not found");
    }

    #[tokio::test]
    async fn test_into_response_room_full() {
        let response = RoomError::RoomFull.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "ROOM_FULL");
    }

    #[tokio::test]
    async fn test_into_response_store_error_is_generic() {
        let response =
            RoomError::Store("READONLY You can't write against a replica".to_string())
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "STORE_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
        assert!(!body.to_string().contains("READONLY"));
    }

    #[tokio::test]
    async fn test_into_response_bad_request_keeps_reason() {
        let response = RoomError::BadRequest("text must not be blank".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["message"], "text must not be blank");
    }

    #[tokio::test]
    async fn test_into_response_service_unavailable() {
        let response = RoomError::ServiceUnavailable("redis down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["message"], "Service temporarily unavailable");
    }
}
