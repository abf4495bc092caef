//! Inbound message log: replies received from contacts, queried by poll mode

use crate::providers::contact::strip_channel_prefix;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Messages kept by the in-memory inbox before the oldest are dropped.
const MEMORY_INBOX_CAPACITY: usize = 1024;

/// A message received from a contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum InboxError {
    #[error("inbox transport error: {0}")]
    Transport(String),

    #[error("unexpected inbox response: {0}")]
    UnexpectedShape(String),
}

/// Queryable log of inbound messages.
#[async_trait]
pub trait InboundMessageLog: Send + Sync {
    /// Messages from `address` sent strictly after `since`, oldest first.
    async fn messages_from(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, InboxError>;
}

/// Inbox fed by the provider's inbound webhook.
#[derive(Clone, Default)]
pub struct MemoryInbox {
    messages: Arc<RwLock<VecDeque<InboundMessage>>>,
}

impl MemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message delivered by the webhook.
    pub async fn record(&self, message: InboundMessage) {
        let mut guard = self.messages.write().await;
        if guard.len() == MEMORY_INBOX_CAPACITY {
            guard.pop_front();
        }
        guard.push_back(message);
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl InboundMessageLog for MemoryInbox {
    async fn messages_from(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, InboxError> {
        let wanted = strip_channel_prefix(address);
        let guard = self.messages.read().await;
        let mut matching: Vec<InboundMessage> = guard
            .iter()
            .filter(|m| strip_channel_prefix(&m.from) == wanted && m.sent_at > since)
            .cloned()
            .collect();
        matching.sort_by_key(|m| m.sent_at);
        Ok(matching)
    }
}
