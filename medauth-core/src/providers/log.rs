//! Development sender that writes notifications to the log instead of a provider.

use crate::providers::{DeliveryError, NotificationSender, SendReceipt};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

/// Logs each message at info level and reports it as delivered.
pub struct LoggingSender {
    name: String,
}

impl LoggingSender {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl NotificationSender for LoggingSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, destination: &str, body: &str) -> Result<SendReceipt, DeliveryError> {
        tracing::info!(
            provider = %self.name,
            destination = destination,
            body = body,
            "Notification (log only)"
        );
        Ok(SendReceipt {
            destination: destination.to_string(),
            provider_id: format!("log-{}", Uuid::new_v4().simple()),
            sent_at: Utc::now(),
        })
    }
}
