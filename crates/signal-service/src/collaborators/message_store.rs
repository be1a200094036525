//! Chat message persistence.

use crate::errors::SignalError;
use chrono::{DateTime, Utc};
use common::types::{Identity, MessageId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A message about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: Identity,
    pub recipient_id: Identity,
    pub text: Option<String>,
    /// Image URL or data URI.
    pub image: Option<String>,
}

/// A persisted chat message, as pushed in `newMessage` and returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender_id: Identity,
    pub recipient_id: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Whether the message was exchanged between `a` and `b`, in either direction.
    pub fn is_between(&self, a: &Identity, b: &Identity) -> bool {
        (&self.sender_id == a && &self.recipient_id == b)
            || (&self.sender_id == b && &self.recipient_id == a)
    }
}

/// Durable message storage.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return the stored form.
    async fn save(&self, message: NewMessage) -> Result<StoredMessage, SignalError>;

    /// All messages between `a` and `b`, oldest first.
    async fn conversation(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Vec<StoredMessage>, SignalError>;
}

/// Process-local message store.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<StoredMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save(&self, message: NewMessage) -> Result<StoredMessage, SignalError> {
        let stored = StoredMessage {
            id: MessageId::new(),
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            text: message.text,
            image: message.image,
            created_at: Utc::now(),
        };

        self.messages.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn conversation(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Vec<StoredMessage>, SignalError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect())
    }
}

/// Mock message stores for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store whose every operation fails.
    #[derive(Default)]
    pub struct FailingMessageStore {
        call_count: AtomicUsize,
    }

    impl FailingMessageStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl MessageStore for FailingMessageStore {
        async fn save(&self, _message: NewMessage) -> Result<StoredMessage, SignalError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Err(SignalError::Storage("mock store unavailable".to_string()))
        }

        async fn conversation(
            &self,
            _a: &Identity,
            _b: &Identity,
        ) -> Result<Vec<StoredMessage>, SignalError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Err(SignalError::Storage("mock store unavailable".to_string()))
        }
    }
}
