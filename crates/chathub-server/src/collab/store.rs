//! Message persistence boundary.

use async_trait::async_trait;
use chathub_core::{MessageRequest, PersistedMessage, StoreError};
use parking_lot::RwLock;

/// Persists chat messages before they are fanned out.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Store a message and return it with its assigned ID and timestamp.
    async fn persist(&self, request: &MessageRequest) -> Result<PersistedMessage, StoreError>;

    /// Stored history in timestamp order.
    async fn messages(&self) -> Result<Vec<PersistedMessage>, StoreError>;
}

/// Process-local store. History is lost on restart.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<PersistedMessage>>,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn persist(&self, request: &MessageRequest) -> Result<PersistedMessage, StoreError> {
        if request.content.trim().is_empty() {
            return Err(StoreError::InvalidMessage("content is empty".into()));
        }
        let message = PersistedMessage::from_request(request);
        self.messages.write().push(message.clone());
        Ok(message)
    }

    async fn messages(&self) -> Result<Vec<PersistedMessage>, StoreError> {
        let mut messages = self.messages.read().clone();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_assigns_id_and_keeps_fields() {
        let store = InMemoryMessageStore::new();
        let request = MessageRequest::new("alice", "hi", Some("bob".into()), None);
        let msg = store.persist(&request).await.unwrap();
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.recipient, "bob");
        assert_eq!(msg.content, "hi");
        assert!(msg.room_id.is_none());
        assert!(!msg.id.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn empty_content_rejected() {
        let store = InMemoryMessageStore::new();
        let err = store
            .persist(&MessageRequest::new("alice", "   ", None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidMessage(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn history_in_timestamp_order() {
        let store = InMemoryMessageStore::new();
        for i in 0..5 {
            let _ = store
                .persist(&MessageRequest::new("alice", i.to_string(), None, None))
                .await
                .unwrap();
        }
        let history = store.messages().await.unwrap();
        assert_eq!(history.len(), 5);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(history[0].content, "0");
    }

    #[tokio::test]
    async fn distinct_ids() {
        let store = InMemoryMessageStore::new();
        let a = store.persist(&MessageRequest::new("a", "x", None, None)).await.unwrap();
        let b = store.persist(&MessageRequest::new("a", "x", None, None)).await.unwrap();
        assert_ne!(a.id, b.id);
    }
}
