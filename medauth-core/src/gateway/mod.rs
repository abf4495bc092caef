//! Access gateway: translates external calls into broker and ledger calls
//!
//! Authorization lifecycles live in the broker's store, accounts and grants
//! live on the ledger, file contents live in the blob store. The only state the
//! gateway holds itself is the in-app notice board.

use crate::blob::BlobStore;
use crate::broker::AuthorizationBroker;
use crate::extract::TextExtractor;
use crate::ledger::Ledger;
use crate::models::{
    AuthorizationOutcome, AuthorizationRequest, Channel, Decision, Document, DocumentView,
    NewAuthorization, OutcomeStatus, RequestId, ResolveReport,
};
use crate::notices::{Notice, NoticeBoard};
use crate::providers::{normalize_address, InboundMessage, MemoryInbox};
use crate::services::log_security_event;
use crate::{BrokerError, BrokerResult};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Body of an authorization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCall {
    pub subject_username: String,
    pub requester_name: String,
    #[serde(default)]
    pub is_emergency: bool,
    pub primary_contact: String,
    #[serde(default)]
    pub secondary_contact: Option<String>,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessChange {
    pub subject: String,
    pub grantee: String,
    pub allowed: bool,
}

/// Metadata accompanying an uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub issuer: String,
    /// Also store the text extracted from the file as a second document
    #[serde(default)]
    pub extract: bool,
}

/// Body of POST /api/v1/users/:username/notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeCall {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub pending_authorizations: usize,
}

fn require(field: &str, value: &str) -> BrokerResult<()> {
    if value.trim().is_empty() {
        return Err(BrokerError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn contact(raw: &str) -> BrokerResult<String> {
    normalize_address(raw).map_err(|e| BrokerError::Validation(e.to_string()))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub struct AccessGateway {
    broker: Arc<AuthorizationBroker>,
    ledger: Arc<dyn Ledger>,
    blobs: Arc<dyn BlobStore>,
    extractor: Option<Arc<dyn TextExtractor>>,
    inbox: Option<MemoryInbox>,
    notices: NoticeBoard,
    gateway_url: String,
}

impl AccessGateway {
    pub fn new(
        broker: Arc<AuthorizationBroker>,
        ledger: Arc<dyn Ledger>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            broker,
            ledger,
            blobs,
            extractor: None,
            inbox: None,
            notices: NoticeBoard::new(),
            gateway_url: "https://ipfs.io/ipfs".to_string(),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Inbox fed by `record_inbound`, shared with the poll-mode source.
    pub fn with_inbox(mut self, inbox: MemoryInbox) -> Self {
        self.inbox = Some(inbox);
        self
    }

    /// Prefix used to turn content ids into document links.
    pub fn with_gateway_url(mut self, gateway_url: impl Into<String>) -> Self {
        self.gateway_url = gateway_url.into();
        self
    }

    pub fn broker(&self) -> &AuthorizationBroker {
        &self.broker
    }

    async fn ensure_user(&self, username: &str) -> BrokerResult<()> {
        if self.ledger.user_exists(username).await? {
            Ok(())
        } else {
            Err(BrokerError::UnknownUser(username.to_string()))
        }
    }

    /// Validate the call and turn it into broker input. No side effects.
    fn prepare(call: AuthorizationCall) -> BrokerResult<NewAuthorization> {
        require("subject_username", &call.subject_username)?;
        require("requester_name", &call.requester_name)?;
        require("primary_contact", &call.primary_contact)?;

        let primary_contact = contact(&call.primary_contact)?;
        let secondary_contact = match call.secondary_contact.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(contact(raw)?),
            _ => None,
        };
        if call.timeout_seconds == Some(0) {
            return Err(BrokerError::Validation(
                "timeout_seconds must be positive".to_string(),
            ));
        }

        Ok(NewAuthorization {
            subject_username: call.subject_username.trim().to_string(),
            requester_name: call.requester_name.trim().to_string(),
            is_emergency: call.is_emergency,
            primary_contact,
            secondary_contact,
            channel: call.channel,
            timeout: call.timeout_seconds.map(Duration::from_secs),
        })
    }

    /// Run one authorization lifecycle and record the decision on the ledger.
    ///
    /// A timeout leaves the ledger untouched.
    pub async fn request_authorization(
        &self,
        call: AuthorizationCall,
    ) -> BrokerResult<AuthorizationOutcome> {
        let new = Self::prepare(call)?;
        self.ensure_user(&new.subject_username).await?;

        let outcome = self.broker.request_authorization(new).await?;
        let verdict = match outcome.status {
            OutcomeStatus::Confirmed => "granted",
            OutcomeStatus::Denied => "denied",
            OutcomeStatus::Timeout => "not answered in time",
        };
        self.notices
            .post(
                &outcome.subject_username,
                &format!(
                    "{} requested access to your medical records: {}",
                    outcome.requester_name, verdict
                ),
            )
            .await;
        if outcome.is_timeout() {
            return Ok(outcome);
        }

        self.ledger
            .toggle_access(
                &outcome.subject_username,
                &outcome.requester_name,
                outcome.access_granted,
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    request_id = %outcome.request_id,
                    error = %e,
                    "Decision reached but ledger update failed"
                );
                e
            })?;
        log_security_event(
            if outcome.access_granted {
                "access_granted"
            } else {
                "access_denied"
            },
            &outcome.subject_username,
            Some(&outcome.requester_name),
            outcome.request_id.as_str(),
        );
        Ok(outcome)
    }

    /// Human-facing confirmation page for a pending request.
    pub async fn authorization_page(&self, id: &RequestId) -> BrokerResult<String> {
        let request = self.broker.get(id).await?;
        let action = format!("/api/v1/authorizations/{}/resolve", escape_html(id.as_str()));
        let banner = if request.is_emergency {
            "<p><strong>EMERGENCY REQUEST</strong></p>\n"
        } else {
            ""
        };
        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Authorization request</title></head>
<body>
<h1>Authorization request</h1>
{banner}<p>{requester} is asking for access to the medical records of {subject}.</p>
<form method="post" action="{action}">
<button type="submit" name="action" value="confirm">Confirm</button>
<button type="submit" name="action" value="cancel">Cancel</button>
</form>
</body>
</html>
"#,
            banner = banner,
            requester = escape_html(&request.requester_name),
            subject = escape_html(&request.subject_username),
            action = action,
        ))
    }

    /// Non-blocking view of a pending request.
    pub async fn status(&self, id: &RequestId) -> BrokerResult<AuthorizationRequest> {
        self.broker.get(id).await
    }

    pub async fn resolve(&self, id: &RequestId, decision: Decision) -> BrokerResult<ResolveReport> {
        let report = self.broker.resolve(id, decision).await?;
        if report.already_resolved {
            tracing::info!(
                request_id = %id,
                state = ?report.state,
                "Replayed resolution answered with the final decision"
            );
        }
        Ok(report)
    }

    pub async fn register(&self, credentials: Credentials) -> BrokerResult<()> {
        require("username", &credentials.username)?;
        require("password", &credentials.password)?;
        if self.ledger.user_exists(&credentials.username).await? {
            return Err(BrokerError::Validation(format!(
                "user {} already registered",
                credentials.username
            )));
        }
        self.ledger
            .register_user(&credentials.username, &credentials.password)
            .await?;
        tracing::info!(username = %credentials.username, "User registered");
        Ok(())
    }

    pub async fn login(&self, credentials: Credentials) -> BrokerResult<()> {
        self.ensure_user(&credentials.username).await?;
        if self
            .ledger
            .login(&credentials.username, &credentials.password)
            .await?
        {
            Ok(())
        } else {
            log_security_event("login_failed", &credentials.username, None, "wrong password");
            Err(BrokerError::InvalidCredentials(credentials.username))
        }
    }

    pub async fn users(&self) -> BrokerResult<Vec<String>> {
        Ok(self.ledger.registered_users().await?)
    }

    pub async fn documents(&self, username: &str) -> BrokerResult<Vec<DocumentView>> {
        self.ensure_user(username).await?;
        let documents = self.ledger.get_documents(username).await?;
        Ok(documents
            .into_iter()
            .map(|document| DocumentView::new(document, &self.gateway_url))
            .collect())
    }

    /// Store an uploaded file for `owner` and register it on the ledger.
    ///
    /// Returns the documents added: the file itself and, when requested, its
    /// extracted text.
    pub async fn upload(
        &self,
        owner: &str,
        metadata: UploadMetadata,
        contents: Bytes,
    ) -> BrokerResult<Vec<DocumentView>> {
        require("name", &metadata.name)?;
        require("issuer", &metadata.issuer)?;
        if contents.is_empty() {
            return Err(BrokerError::Validation("file is empty".to_string()));
        }
        let extractor = match (metadata.extract, &self.extractor) {
            (false, _) => None,
            (true, Some(extractor)) => Some(Arc::clone(extractor)),
            (true, None) => {
                return Err(BrokerError::Validation(
                    "text extraction is not configured".to_string(),
                ))
            }
        };
        self.ensure_user(owner).await?;
        self.ensure_user(&metadata.issuer).await?;

        let extracted = match extractor {
            Some(extractor) => Some(extractor.extract_text(&contents).await?),
            None => None,
        };

        let content_id = self.blobs.put(&metadata.name, contents).await?;
        let mut added = vec![Document {
            name: metadata.name.clone(),
            content_ref: content_id.to_string(),
            description: metadata.description.clone(),
            issuer: metadata.issuer.clone(),
        }];
        if let Some(text) = extracted {
            let text_name = format!("{}.txt", metadata.name);
            let text_id = self.blobs.put(&text_name, Bytes::from(text)).await?;
            added.push(Document {
                name: text_name,
                content_ref: text_id.to_string(),
                description: format!("Text extracted from {}", metadata.name),
                issuer: metadata.issuer.clone(),
            });
        }

        for document in &added {
            self.ledger.add_document(owner, document.clone()).await?;
        }
        tracing::info!(
            owner = %owner,
            issuer = %metadata.issuer,
            documents = added.len(),
            "Documents uploaded"
        );
        Ok(added
            .into_iter()
            .map(|document| DocumentView::new(document, &self.gateway_url))
            .collect())
    }

    pub async fn toggle_access(&self, change: AccessChange) -> BrokerResult<()> {
        self.ensure_user(&change.subject).await?;
        self.ensure_user(&change.grantee).await?;
        self.ledger
            .toggle_access(&change.subject, &change.grantee, change.allowed)
            .await?;
        log_security_event(
            if change.allowed {
                "access_granted"
            } else {
                "access_revoked"
            },
            &change.subject,
            Some(&change.grantee),
            "manual toggle",
        );
        Ok(())
    }

    /// Documents of `subject`, readable only by a grantee holding access.
    pub async fn documents_for_grantee(
        &self,
        subject: &str,
        grantee: &str,
    ) -> BrokerResult<Vec<DocumentView>> {
        self.ensure_user(subject).await?;
        if !self.ledger.check_access(subject, grantee).await? {
            log_security_event("access_denied", subject, Some(grantee), "document read");
            return Err(BrokerError::AccessDenied {
                subject: subject.to_string(),
                grantee: grantee.to_string(),
            });
        }
        self.documents(subject).await
    }

    /// Record a reply delivered by the provider webhook.
    ///
    /// Returns `false` when no webhook inbox is configured.
    pub async fn record_inbound(&self, from: &str, body: &str) -> BrokerResult<bool> {
        require("From", from)?;
        let Some(inbox) = &self.inbox else {
            tracing::debug!(from = %from, "Inbound message ignored, webhook inbox disabled");
            return Ok(false);
        };
        inbox
            .record(InboundMessage {
                from: from.to_string(),
                body: body.to_string(),
                sent_at: Utc::now(),
            })
            .await;
        tracing::debug!(from = %from, "Inbound message recorded");
        Ok(true)
    }

    /// Leave a notice for a registered user.
    pub async fn post_notice(&self, username: &str, call: NoticeCall) -> BrokerResult<Notice> {
        require("message", &call.message)?;
        self.ensure_user(username).await?;
        Ok(self.notices.post(username, call.message.trim()).await)
    }

    /// Notices for a user; `NoNotices` when there are none.
    pub async fn notices(&self, username: &str) -> BrokerResult<Vec<Notice>> {
        let notices = self.notices.for_user(username).await;
        if notices.is_empty() {
            return Err(BrokerError::NoNotices(username.to_string()));
        }
        Ok(notices)
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            pending_authorizations: self.broker.store().pending_count().await,
        }
    }
}
