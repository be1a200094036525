//! Signal Service error types.
//!
//! Errors map to signaling error codes carried in `error` events and to HTTP
//! status codes for the REST surface. Internal details are logged server-side
//! but not exposed to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Signal Service error type.
///
/// Maps to signaling error codes:
/// - `MalformedEvent`, `BadRequest`: `BAD_REQUEST` (1)
/// - `Unauthorized`, `NotRegistered`, `IdentityMismatch`: `UNAUTHORIZED` (2)
/// - `NotFound`, `NoActiveCall`: `NOT_FOUND` (4)
/// - `CallConflict`, `Busy`: `CONFLICT` (5)
/// - `Storage`, `Internal`, `ConnectionClosed`: `INTERNAL_ERROR` (6)
/// - `Backpressure`, `Draining`: `UNAVAILABLE` (7)
#[derive(Debug, Error)]
pub enum SignalError {
    /// Inbound frame could not be decoded or failed field validation.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Credentials missing or rejected by the identity resolver.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Connection sent a signaling event before binding an identity.
    #[error("Connection has not registered an identity")]
    NotRegistered,

    /// `register` named an identity other than the authenticated one.
    #[error("Register does not match authenticated identity")]
    IdentityMismatch,

    /// Offer refused because the pair already has an in-flight call.
    #[error("Call conflict: {0}")]
    CallConflict(String),

    /// Offer refused because one party is already in another call.
    #[error("Party is busy")]
    Busy,

    /// Answer or reject without a matching ringing session.
    #[error("No active call")]
    NoActiveCall,

    /// Connection mailbox is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection mailbox is full; the event was dropped.
    #[error("Connection mailbox full")]
    Backpressure,

    /// Message store collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid HTTP request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Service is shutting down.
    #[error("Service is draining")]
    Draining,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Returns the signaling error code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            SignalError::MalformedEvent(_) | SignalError::BadRequest(_) => 1, // BAD_REQUEST
            SignalError::Unauthorized(_)
            | SignalError::NotRegistered
            | SignalError::IdentityMismatch => 2, // UNAUTHORIZED
            SignalError::NotFound(_) | SignalError::NoActiveCall => 4, // NOT_FOUND
            SignalError::CallConflict(_) | SignalError::Busy => 5,     // CONFLICT
            SignalError::Storage(_) | SignalError::Internal(_) | SignalError::ConnectionClosed => {
                6 // INTERNAL_ERROR
            }
            SignalError::Backpressure | SignalError::Draining => 7, // UNAVAILABLE
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            SignalError::MalformedEvent(reason) | SignalError::BadRequest(reason) => reason.clone(),
            SignalError::Unauthorized(_) => "Invalid or expired token".to_string(),
            SignalError::NotRegistered => "Register an identity first".to_string(),
            SignalError::IdentityMismatch => {
                "Register must match the authenticated identity".to_string()
            }
            SignalError::CallConflict(_) => "A call with this user is already in progress".to_string(),
            SignalError::Busy => "User is busy".to_string(),
            SignalError::NoActiveCall => "No active call".to_string(),
            SignalError::NotFound(resource) => format!("{resource} not found"),
            SignalError::Backpressure => "Server is overloaded, please retry".to_string(),
            SignalError::Draining => "Server is shutting down, please reconnect".to_string(),
            SignalError::Storage(_) | SignalError::Internal(_) | SignalError::ConnectionClosed => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// HTTP status for the REST surface.
    pub fn status_code(&self) -> StatusCode {
        match self.error_code() {
            1 => StatusCode::BAD_REQUEST,
            2 => StatusCode::UNAUTHORIZED,
            4 => StatusCode::NOT_FOUND,
            5 => StatusCode::CONFLICT,
            7 => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code_name(&self) -> &'static str {
        match self.error_code() {
            1 => "BAD_REQUEST",
            2 => "UNAUTHORIZED",
            4 => "NOT_FOUND",
            5 => "CONFLICT",
            7 => "UNAVAILABLE",
            _ => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            SignalError::Storage(err) => {
                tracing::error!(target: "ss.http", error = %err, "Message store operation failed");
            }
            SignalError::Internal(err) => {
                tracing::error!(target: "ss.http", error = %err, "Internal error");
            }
            SignalError::Unauthorized(reason) => {
                tracing::debug!(target: "ss.http", reason = %reason, "Request rejected");
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code_name().to_string(),
                message: self.client_message(),
            },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"parley\", error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

impl From<common::jwt::JwtValidationError> for SignalError {
    fn from(err: common::jwt::JwtValidationError) -> Self {
        SignalError::Unauthorized(format!("{err:?}"))
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
    fn test_error_code_mapping() {
        assert_eq!(SignalError::MalformedEvent("x".to_string()).error_code(), 1);
        assert_eq!(SignalError::BadRequest("x".to_string()).error_code(), 1);

        assert_eq!(SignalError::Unauthorized("x".to_string()).error_code(), 2);
        assert_eq!(SignalError::NotRegistered.error_code(), 2);
        assert_eq!(SignalError::IdentityMismatch.error_code(), 2);

        assert_eq!(SignalError::NotFound("user".to_string()).error_code(), 4);
        assert_eq!(SignalError::NoActiveCall.error_code(), 4);

        assert_eq!(SignalError::CallConflict("pair".to_string()).error_code(), 5);
        assert_eq!(SignalError::Busy.error_code(), 5);

        assert_eq!(SignalError::Storage("disk".to_string()).error_code(), 6);
        assert_eq!(SignalError::Internal("boom".to_string()).error_code(), 6);
        assert_eq!(SignalError::ConnectionClosed.error_code(), 6);

        assert_eq!(SignalError::Backpressure.error_code(), 7);
        assert_eq!(SignalError::Draining.error_code(), 7);
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = SignalError::Storage("postgres://user:pass@db".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = SignalError::Internal("stack trace".to_string());
        assert!(!err.client_message().contains("stack"));

        let err = SignalError::Unauthorized("signature mismatch for key".to_string());
        assert_eq!(err.client_message(), "Invalid or expired token");
    }

    #[test]
    fn test_malformed_event_message_is_passed_through() {
        let err = SignalError::MalformedEvent("missing field `to`".to_string());
        assert_eq!(err.client_message(), "missing field `to`");
    }

    #[test]
    fn test_jwt_error_converts_to_unauthorized() {
        let err: SignalError = common::jwt::JwtValidationError::Expired.into();
        assert!(matches!(err, SignalError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_into_response_bad_request() {
        let response = SignalError::BadRequest("Message must have text or image".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "Message must have text or image");
    }

    #[tokio::test]
    async fn test_into_response_unauthorized_has_www_authenticate() {
        let response = SignalError::Unauthorized("expired".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let header = response.headers().get("WWW-Authenticate").unwrap();
        assert!(header.to_str().unwrap().contains("invalid_token"));

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_into_response_storage_is_generic_500() {
        let response = SignalError::Storage("disk full".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }
}
