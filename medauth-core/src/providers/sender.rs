//! Notification sender: one-way delivery of a text message to a contact

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;

/// Proof that a provider accepted a message for delivery
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub destination: String,
    /// Provider-side message identifier (e.g. Twilio SID)
    pub provider_id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error sending to {destination}: {reason}")]
    Transport { destination: String, reason: String },

    #[error("provider rejected message to {destination} ({status}): {body}")]
    Rejected {
        destination: String,
        status: u16,
        body: String,
    },

    #[error("invalid destination address: {0}")]
    InvalidAddress(String),
}

/// Sender for a messaging provider (SMS, WhatsApp, ...).
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Provider name for logging (e.g. "twilio-sms").
    fn name(&self) -> &str;

    /// Send `body` to a single destination.
    async fn send(&self, destination: &str, body: &str) -> Result<SendReceipt, DeliveryError>;
}

/// Deliver one message per destination concurrently. A failure for one
/// destination never prevents delivery to the others; results keep the
/// order of `deliveries`.
pub async fn notify_all(
    sender: &dyn NotificationSender,
    deliveries: &[(String, String)],
) -> Vec<Result<SendReceipt, DeliveryError>> {
    join_all(
        deliveries
            .iter()
            .map(|(destination, body)| sender.send(destination, body)),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PickySender;

    #[async_trait]
    impl NotificationSender for PickySender {
        fn name(&self) -> &str {
            "picky"
        }

        async fn send(&self, destination: &str, _body: &str) -> Result<SendReceipt, DeliveryError> {
            if destination.ends_with('2') {
                return Err(DeliveryError::Transport {
                    destination: destination.to_string(),
                    reason: "unreachable".to_string(),
                });
            }
            Ok(SendReceipt {
                destination: destination.to_string(),
                provider_id: "SM1".to_string(),
                sent_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn test_notify_all_isolates_failures() {
        let deliveries = vec![
            ("+15550000001".to_string(), "hello".to_string()),
            ("+15550000002".to_string(), "hello".to_string()),
        ];
        let results = notify_all(&PickySender, &deliveries).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(DeliveryError::Transport { .. })
        ));
    }
}
