//! Twilio provider: send SMS/WhatsApp messages and list inbound replies via the REST API.

use crate::models::Channel;
use crate::providers::contact::whatsapp_address;
use crate::providers::{
    DeliveryError, InboundMessage, InboundMessageLog, InboxError, NotificationSender, SendReceipt,
};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use reqwest::Client;
use std::sync::Arc;

const API_VERSION: &str = "2010-04-01";
const INBOX_PAGE_SIZE: &str = "20";

/// Account credentials shared by the sender and the inbox. Never log the token.
#[derive(Clone)]
pub struct TwilioAccount {
    api_base: String,
    account_sid: String,
    auth_token: String,
    client: Arc<Client>,
}

impl TwilioAccount {
    pub fn new(api_base: String, account_sid: String, auth_token: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            client: Arc::new(Client::new()),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/Accounts/{}/Messages.json",
            self.api_base, API_VERSION, self.account_sid
        )
    }
}

fn channel_address(channel: Channel, number: &str) -> String {
    match channel {
        Channel::Sms => number.to_string(),
        Channel::WhatsApp => whatsapp_address(number),
    }
}

#[derive(serde::Deserialize)]
struct CreatedMessage {
    sid: String,
}

/// Twilio notification sender bound to one channel and one sender number.
pub struct TwilioSender {
    account: TwilioAccount,
    channel: Channel,
    from: String,
}

impl TwilioSender {
    pub fn new(account: TwilioAccount, channel: Channel, from: String) -> Self {
        Self {
            account,
            channel,
            from,
        }
    }
}

#[async_trait]
impl NotificationSender for TwilioSender {
    fn name(&self) -> &str {
        match self.channel {
            Channel::Sms => "twilio-sms",
            Channel::WhatsApp => "twilio-whatsapp",
        }
    }

    async fn send(&self, destination: &str, body: &str) -> Result<SendReceipt, DeliveryError> {
        let to = channel_address(self.channel, destination);
        let from = channel_address(self.channel, &self.from);
        let res = self
            .account
            .client
            .post(self.account.messages_url())
            .basic_auth(&self.account.account_sid, Some(&self.account.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let err_body = res.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                destination: destination.to_string(),
                status,
                body: err_body,
            });
        }
        let created: CreatedMessage = res.json().await.map_err(|e| DeliveryError::Transport {
            destination: destination.to_string(),
            reason: format!("unreadable response: {}", e),
        })?;
        Ok(SendReceipt {
            destination: destination.to_string(),
            provider_id: created.sid,
            sent_at: Utc::now(),
        })
    }
}

// --- Messages list and InboundMessageLog ---

#[derive(serde::Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<ListedMessage>,
}

#[derive(serde::Deserialize)]
struct ListedMessage {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    date_sent: Option<String>,
}

/// Parse Twilio's RFC 2822 `date_sent`, e.g. "Wed, 18 Oct 2026 10:00:00 +0000".
pub(crate) fn parse_date_sent(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Inbox backed by the Twilio Messages list, filtered by sender and send date.
pub struct TwilioInbox {
    account: TwilioAccount,
    channel: Channel,
}

impl TwilioInbox {
    pub fn new(account: TwilioAccount, channel: Channel) -> Self {
        Self { account, channel }
    }
}

/// `date_sent` carries whole seconds only, so a reply in the same second as
/// `since` still counts.
fn sent_after(sent_at: DateTime<Utc>, since: DateTime<Utc>) -> bool {
    sent_at >= since.trunc_subsecs(0)
}

#[async_trait]
impl InboundMessageLog for TwilioInbox {
    async fn messages_from(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, InboxError> {
        let from = channel_address(self.channel, address);
        // The API filters by day only; the exact instant is checked below.
        let day = since.format("%Y-%m-%d").to_string();
        let res = self
            .account
            .client
            .get(self.account.messages_url())
            .basic_auth(&self.account.account_sid, Some(&self.account.auth_token))
            .query(&[
                ("From", from.as_str()),
                ("DateSent>", day.as_str()),
                ("PageSize", INBOX_PAGE_SIZE),
            ])
            .send()
            .await
            .map_err(|e| InboxError::Transport(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(InboxError::Transport(format!("{}: {}", status, body)));
        }
        let list: MessageList = res
            .json()
            .await
            .map_err(|e| InboxError::UnexpectedShape(e.to_string()))?;

        let mut messages: Vec<InboundMessage> = list
            .messages
            .into_iter()
            .filter(|m| m.direction.as_deref().map_or(true, |d| d == "inbound"))
            .filter_map(|m| {
                let sent_at = parse_date_sent(m.date_sent.as_deref()?)?;
                Some(InboundMessage {
                    from: m.from.unwrap_or_else(|| from.clone()),
                    body: m.body.unwrap_or_default(),
                    sent_at,
                })
            })
            .filter(|m| sent_after(m.sent_at, since))
            .collect();
        messages.sort_by_key(|m| m.sent_at);
        Ok(messages)
    }
}
