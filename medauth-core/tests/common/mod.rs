//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use medauth_core::broker::{
    AuthorizationBroker, BrokerSettings, ChannelRoute, ConfirmationSource, InboxConfirmationSource,
    KeywordClassifier, PendingRequestStore,
};
use medauth_core::models::{Channel, NewAuthorization, TieBreakPolicy};
use medauth_core::providers::{DeliveryError, MemoryInbox, NotificationSender, SendReceipt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PRIMARY: &str = "+15550000001";
pub const SECONDARY: &str = "+15550000002";

/// Sender that records every message and fails for chosen destinations.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    failing: HashSet<String>,
    delay: Duration,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(destinations: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: destinations.iter().map(|d| d.to_string()).collect(),
            delay: Duration::ZERO,
        }
    }

    /// Sender whose every delivery takes `delay` before it is accepted.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Request id embedded in the most recent authorization link.
    pub fn last_request_id(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let (_, body) = sent.last()?;
        let start = body.find("/api/v1/authorizations/")? + "/api/v1/authorizations/".len();
        Some(
            body[start..]
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
        )
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, destination: &str, body: &str) -> Result<SendReceipt, DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(destination) {
            return Err(DeliveryError::Transport {
                destination: destination.to_string(),
                reason: "unreachable".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), body.to_string()));
        Ok(SendReceipt {
            destination: destination.to_string(),
            provider_id: format!("rec-{}", self.sent.lock().unwrap().len()),
            sent_at: Utc::now(),
        })
    }
}

pub struct Fixture {
    pub broker: Arc<AuthorizationBroker>,
    pub sender: Arc<RecordingSender>,
    pub inbox: MemoryInbox,
}

/// Broker with an SMS push route and a WhatsApp poll route over a memory inbox.
pub fn fixture(sender: RecordingSender, policy: TieBreakPolicy) -> Fixture {
    let sender = Arc::new(sender);
    let inbox = MemoryInbox::new();
    let source: Arc<dyn ConfirmationSource> = Arc::new(InboxConfirmationSource::new(
        Arc::new(inbox.clone()),
        Arc::new(KeywordClassifier::default()),
        policy,
    ));
    let settings = BrokerSettings {
        public_base_url: "http://auth.test".to_string(),
        poll_interval: Duration::from_millis(20),
        poll_grace: Duration::from_millis(20),
        max_timeout: Duration::from_secs(60),
    };
    let broker = AuthorizationBroker::new(PendingRequestStore::new(), settings)
        .with_route(
            Channel::Sms,
            ChannelRoute {
                sender: sender.clone(),
                confirmation: None,
                default_timeout: Duration::from_secs(2),
            },
        )
        .with_route(
            Channel::WhatsApp,
            ChannelRoute {
                sender: sender.clone(),
                confirmation: Some(source),
                default_timeout: Duration::from_secs(2),
            },
        );
    Fixture {
        broker: Arc::new(broker),
        sender,
        inbox,
    }
}

pub fn request(channel: Channel, emergency: bool, timeout: Duration) -> NewAuthorization {
    NewAuthorization {
        subject_username: "alice".to_string(),
        requester_name: "dr-smith".to_string(),
        is_emergency: emergency,
        primary_contact: PRIMARY.to_string(),
        secondary_contact: Some(SECONDARY.to_string()),
        channel,
        timeout: Some(timeout),
    }
}
