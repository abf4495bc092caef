//! Confirmation sources: find a resolution signal for a request since a point in time

use crate::broker::classifier::ReplyClassifier;
use crate::models::{Decision, TieBreakPolicy};
use crate::providers::{InboundMessageLog, InboxError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// An unambiguous answer from one contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationSignal {
    pub contact: String,
    pub decision: Decision,
    pub received_at: DateTime<Utc>,
}

/// Capability used by poll mode. Push mode needs no source: the resolve
/// endpoint calls the broker directly.
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// Look for an answer from `contacts` (primary first) sent after `since`.
    async fn find_signal(
        &self,
        contacts: &[String],
        since: DateTime<Utc>,
    ) -> Result<Option<ConfirmationSignal>, InboxError>;
}

/// Poll-mode source reading an inbound message log and classifying bodies.
pub struct InboxConfirmationSource {
    log: Arc<dyn InboundMessageLog>,
    classifier: Arc<dyn ReplyClassifier>,
    policy: TieBreakPolicy,
}

impl InboxConfirmationSource {
    pub fn new(
        log: Arc<dyn InboundMessageLog>,
        classifier: Arc<dyn ReplyClassifier>,
        policy: TieBreakPolicy,
    ) -> Self {
        Self {
            log,
            classifier,
            policy,
        }
    }

    /// Earliest unambiguous reply from one contact.
    async fn answer_from(
        &self,
        contact: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<ConfirmationSignal>, InboxError> {
        let messages = self.log.messages_from(contact, since).await?;
        Ok(messages.into_iter().find_map(|message| {
            self.classifier
                .classify(&message.body)
                .decision()
                .map(|decision| ConfirmationSignal {
                    contact: contact.to_string(),
                    decision,
                    received_at: message.sent_at,
                })
        }))
    }
}

/// Apply the tie-break policy to per-contact answers (same order as contacts).
pub(crate) fn settle(
    policy: TieBreakPolicy,
    answers: Vec<Option<ConfirmationSignal>>,
) -> Option<ConfirmationSignal> {
    match policy {
        TieBreakPolicy::PrimaryPriority => answers.into_iter().flatten().next(),
        TieBreakPolicy::FirstToRespond => answers
            .into_iter()
            .flatten()
            .min_by_key(|signal| signal.received_at),
        TieBreakPolicy::RequireAgreement => {
            if let Some(cancel) = answers
                .iter()
                .flatten()
                .find(|signal| signal.decision == Decision::Cancel)
            {
                return Some(cancel.clone());
            }
            if answers.iter().all(Option::is_some) {
                // All confirmed; report the reply that completed the agreement.
                answers
                    .into_iter()
                    .flatten()
                    .max_by_key(|signal| signal.received_at)
            } else {
                None
            }
        }
    }
}

#[async_trait]
impl ConfirmationSource for InboxConfirmationSource {
    fn name(&self) -> &str {
        "inbox"
    }

    async fn find_signal(
        &self,
        contacts: &[String],
        since: DateTime<Utc>,
    ) -> Result<Option<ConfirmationSignal>, InboxError> {
        let mut answers = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let answer = self.answer_from(contact, since).await?;
            if self.policy == TieBreakPolicy::PrimaryPriority && answer.is_some() {
                return Ok(answer);
            }
            answers.push(answer);
        }
        Ok(settle(self.policy, answers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::classifier::KeywordClassifier;
    use crate::providers::{InboundMessage, MemoryInbox};
    use chrono::Duration;

    const PRIMARY: &str = "+15550000001";
    const SECONDARY: &str = "+15550000002";

    fn signal(contact: &str, decision: Decision, offset: i64) -> ConfirmationSignal {
        ConfirmationSignal {
            contact: contact.to_string(),
            decision,
            received_at: Utc::now() + Duration::seconds(offset),
        }
    }

    #[test]
    fn test_primary_priority() {
        let settled = settle(
            TieBreakPolicy::PrimaryPriority,
            vec![
                Some(signal(PRIMARY, Decision::Cancel, 9)),
                Some(signal(SECONDARY, Decision::Confirm, 1)),
            ],
        )
        .unwrap();
        assert_eq!(settled.contact, PRIMARY);
        assert_eq!(settled.decision, Decision::Cancel);
    }

    #[test]
    fn test_first_to_respond() {
        let settled = settle(
            TieBreakPolicy::FirstToRespond,
            vec![
                Some(signal(PRIMARY, Decision::Cancel, 9)),
                Some(signal(SECONDARY, Decision::Confirm, 1)),
            ],
        )
        .unwrap();
        assert_eq!(settled.contact, SECONDARY);
        assert_eq!(settled.decision, Decision::Confirm);
    }

    #[test]
    fn test_require_agreement() {
        assert!(settle(
            TieBreakPolicy::RequireAgreement,
            vec![Some(signal(PRIMARY, Decision::Confirm, 1)), None],
        )
        .is_none());

        let both = settle(
            TieBreakPolicy::RequireAgreement,
            vec![
                Some(signal(PRIMARY, Decision::Confirm, 1)),
                Some(signal(SECONDARY, Decision::Confirm, 3)),
            ],
        )
        .unwrap();
        assert_eq!(both.decision, Decision::Confirm);
        assert_eq!(both.contact, SECONDARY);

        let vetoed = settle(
            TieBreakPolicy::RequireAgreement,
            vec![None, Some(signal(SECONDARY, Decision::Cancel, 2))],
        )
        .unwrap();
        assert_eq!(vetoed.decision, Decision::Cancel);
    }

    #[tokio::test]
    async fn test_inbox_source_skips_ambiguous_and_stale() {
        let inbox = MemoryInbox::new();
        let since = Utc::now();
        for (body, offset) in [
            ("confirm", -30),
            ("hello?", 1),
            ("confirm or cancel?", 2),
            ("Cancel", 3),
        ] {
            inbox
                .record(InboundMessage {
                    from: format!("whatsapp:{}", PRIMARY),
                    body: body.to_string(),
                    sent_at: since + Duration::seconds(offset),
                })
                .await;
        }
        let source = InboxConfirmationSource::new(
            Arc::new(inbox),
            Arc::new(KeywordClassifier::default()),
            TieBreakPolicy::PrimaryPriority,
        );
        let found = source
            .find_signal(&[PRIMARY.to_string()], since)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.decision, Decision::Cancel);
    }

    #[tokio::test]
    async fn test_inbox_source_without_replies() {
        let source = InboxConfirmationSource::new(
            Arc::new(MemoryInbox::new()),
            Arc::new(KeywordClassifier::default()),
            TieBreakPolicy::FirstToRespond,
        );
        let found = source
            .find_signal(&[PRIMARY.to_string(), SECONDARY.to_string()], Utc::now())
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
