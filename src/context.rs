//! Session conversation history.
//!
//! Each session's history lives in the store under `context:{session_id}` as
//! a JSON array of messages with their token costs. On every append the
//! oldest entries are dropped until both the message-count limit and the
//! token budget hold.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::SessionStore;
use crate::types::{Message, Role};

/// How long a stored session history survives without activity.
const CONTEXT_TTL: Duration = Duration::from_secs(3600);

/// A stored conversation turn with its token cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub text: String,
    /// Token cost of `text`, as reported by the tokenizer or the
    /// completion usage counters.
    pub tokens: u32,
}

impl ContextMessage {
    /// Create a stored turn.
    pub fn new(role: Role, text: impl Into<String>, tokens: u32) -> Self {
        Self {
            role,
            text: text.into(),
            tokens,
        }
    }

    /// Strip the token cost for submission to the completion API.
    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.text.clone())
    }
}

/// Sliding window over a session's stored history.
pub struct ContextWindow {
    store: Arc<dyn SessionStore>,
    max_messages: usize,
    max_tokens: u32,
    ttl: Duration,
}

impl ContextWindow {
    /// Create a window over the given store.
    pub fn new(store: Arc<dyn SessionStore>, max_messages: usize, max_tokens: u32) -> Self {
        Self {
            store,
            max_messages,
            max_tokens,
            ttl: CONTEXT_TTL,
        }
    }

    fn key(session_id: &str) -> String {
        format!("context:{session_id}")
    }

    /// Load a session's stored history.
    ///
    /// A corrupted (undecodable) entry is treated as an empty history and
    /// will be overwritten on the next append; this is the only tolerated
    /// store-side degradation.
    pub async fn load(&self, session_id: &str) -> Result<Vec<ContextMessage>> {
        match self.store.get(&Self::key(session_id)).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(messages) => Ok(messages),
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "stored context is corrupted, starting a fresh history"
                    );
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    /// Append a turn to a session's history and return the trimmed window.
    ///
    /// The returned list includes `message` and is what should be sent to
    /// the completion API (minus the system message, which is not stored).
    pub async fn append(
        &self,
        session_id: &str,
        message: ContextMessage,
    ) -> Result<Vec<ContextMessage>> {
        let mut context: VecDeque<ContextMessage> = self.load(session_id).await?.into();

        while context.len() >= self.max_messages {
            context.pop_front();
        }

        let mut total: u64 =
            context.iter().map(|m| u64::from(m.tokens)).sum::<u64>() + u64::from(message.tokens);
        while total >= u64::from(self.max_tokens) {
            match context.pop_front() {
                Some(removed) => total -= u64::from(removed.tokens),
                None => break,
            }
        }

        let mut window: Vec<ContextMessage> = context.into();
        window.push(message);

        let encoded = serde_json::to_string(&window)
            .map_err(|e| Error::Store(format!("failed to encode session context: {e}")))?;
        self.store
            .set(&Self::key(session_id), &encoded, self.ttl)
            .await?;

        tracing::debug!(
            session_id = %session_id,
            messages = window.len(),
            total_tokens = total,
            "session context updated"
        );
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn window(max_messages: usize, max_tokens: u32) -> (ContextWindow, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            ContextWindow::new(store.clone(), max_messages, max_tokens),
            store,
        )
    }

    #[tokio::test]
    async fn empty_session_loads_empty() {
        let (window, _) = window(5, 1000);
        assert!(window.load("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_accumulates_in_order() {
        let (window, _) = window(5, 1000);
        window
            .append("s1", ContextMessage::new(Role::User, "one", 10))
            .await
            .unwrap();
        let ctx = window
            .append("s1", ContextMessage::new(Role::Assistant, "two", 10))
            .await
            .unwrap();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].text, "one");
        assert_eq!(ctx[1].text, "two");
    }

    #[tokio::test]
    async fn message_count_limit_drops_oldest() {
        let (window, _) = window(2, 100_000);
        for text in ["a", "b", "c", "d"] {
            window
                .append("s1", ContextMessage::new(Role::User, text, 1))
                .await
                .unwrap();
        }
        let ctx = window.load("s1").await.unwrap();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].text, "c");
        assert_eq!(ctx[1].text, "d");
    }

    #[tokio::test]
    async fn token_budget_drops_oldest() {
        let (window, _) = window(10, 100);
        window
            .append("s1", ContextMessage::new(Role::User, "old", 60))
            .await
            .unwrap();
        let ctx = window
            .append("s1", ContextMessage::new(Role::User, "new", 60))
            .await
            .unwrap();
        // 60 + 60 exceeds the budget of 100, the older turn is evicted.
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx[0].text, "new");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let (window, _) = window(5, 1000);
        window
            .append("session-a", ContextMessage::new(Role::User, "for a", 1))
            .await
            .unwrap();
        window
            .append("session-b", ContextMessage::new(Role::User, "for b", 1))
            .await
            .unwrap();

        let a = window.load("session-a").await.unwrap();
        let b = window.load("session-b").await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].text, "for a");
        assert_eq!(b[0].text, "for b");
    }

    #[tokio::test]
    async fn corrupted_entry_recovers_as_empty() {
        let (window, store) = window(5, 1000);
        store
            .set("context:s1", "{not json", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(window.load("s1").await.unwrap().is_empty());

        // The next append overwrites the corrupted entry.
        let ctx = window
            .append("s1", ContextMessage::new(Role::User, "fresh", 1))
            .await
            .unwrap();
        assert_eq!(ctx.len(), 1);
        assert_eq!(window.load("s1").await.unwrap().len(), 1);
    }
}
