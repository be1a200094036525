//! Chat message handlers.
//!
//! Sending persists through the `MessageStore` first and only then asks the
//! hub to push `newMessage` to the recipient's live connections. A failed
//! push never fails the request: the message is already in history.

use super::path_identity;
use crate::collaborators::{NewMessage, StoredMessage};
use crate::errors::SignalError;
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::Identity;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Request body for `POST /api/messages/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
    /// Image URL or data URI.
    #[serde(default)]
    pub image: Option<String>,
}

impl SendMessageRequest {
    /// Normalise blank fields to `None` and reject an empty message.
    fn into_new_message(
        self,
        sender_id: Identity,
        recipient_id: Identity,
    ) -> Result<NewMessage, SignalError> {
        let text = self.text.filter(|t| !t.trim().is_empty());
        let image = self.image.filter(|i| !i.trim().is_empty());

        if text.is_none() && image.is_none() {
            return Err(SignalError::BadRequest(
                "Message must contain text or an image".to_string(),
            ));
        }

        Ok(NewMessage {
            sender_id,
            recipient_id,
            text,
            image,
        })
    }
}

/// Handler for POST /api/messages/:id
///
/// Persists a message from the caller to `:id` and fans it out.
///
/// ## Response
///
/// Returns 201 Created with the stored message:
///
/// ```json
/// {
///   "id": "…",
///   "senderId": "u1",
///   "recipientId": "u2",
///   "text": "hello",
///   "createdAt": "2024-01-01T00:00:00Z"
/// }
/// ```
#[instrument(skip_all, name = "ss.handlers.send_message")]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(sender): Extension<Identity>,
    Path(recipient): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<StoredMessage>), SignalError> {
    let recipient = path_identity(recipient)?;
    let new_message = request.into_new_message(sender, recipient)?;

    let stored = state.messages.save(new_message).await?;

    match state.hub.deliver_message(stored.clone()).await {
        Ok(outcome) => {
            tracing::debug!(
                target: "ss.http",
                message_id = %stored.id,
                recipient = %stored.recipient_id,
                delivered = outcome.delivered,
                "Message fanned out"
            );
        }
        Err(e) => {
            tracing::warn!(
                target: "ss.http",
                message_id = %stored.id,
                error = %e,
                "Message stored but fan-out failed"
            );
        }
    }

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Handler for GET /api/messages/:id
///
/// Returns the conversation between the caller and `:id`, oldest first.
#[instrument(skip_all, name = "ss.handlers.get_messages")]
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Identity>,
    Path(peer): Path<String>,
) -> Result<Json<Vec<StoredMessage>>, SignalError> {
    let peer = path_identity(peer)?;
    let messages = state.messages.conversation(&caller, &peer).await?;

    tracing::debug!(
        target: "ss.http",
        peer = %peer,
        count = messages.len(),
        "Returning conversation"
    );

    Ok(Json(messages))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request(text: Option<&str>, image: Option<&str>) -> SendMessageRequest {
        SendMessageRequest {
            text: text.map(str::to_string),
            image: image.map(str::to_string),
        }
    }

    #[test]
    fn test_text_message_accepted() {
        let message = request(Some("hi"), None)
            .into_new_message(Identity::from("u1"), Identity::from("u2"))
            .unwrap();
        assert_eq!(message.text.as_deref(), Some("hi"));
        assert!(message.image.is_none());
    }

    #[test]
    fn test_image_only_message_accepted() {
        let message = request(Some("  "), Some("https://img.example/1.png"))
            .into_new_message(Identity::from("u1"), Identity::from("u2"))
            .unwrap();
        assert!(message.text.is_none());
        assert!(message.image.is_some());
    }

    #[test]
    fn test_empty_message_rejected() {
        let err = request(None, Some(""))
            .into_new_message(Identity::from("u1"), Identity::from("u2"))
            .unwrap_err();
        assert!(matches!(err, SignalError::BadRequest(_)));
    }

    #[test]
    fn test_request_fields_optional() {
        let parsed: SendMessageRequest = serde_json::from_str(r#"{"text":"x"}"#).unwrap();
        assert_eq!(parsed.text.as_deref(), Some("x"));
        assert!(parsed.image.is_none());
    }
}
