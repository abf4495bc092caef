//! Authorization request data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque authorization request identifier.
///
/// Generated as a UTC timestamp followed by a random suffix, so two requests
/// created in the same millisecond still get distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", stamp, &suffix[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of an authorization request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationState {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "denied")]
    Denied,
    #[serde(rename = "timed_out")]
    TimedOut,
}

impl AuthorizationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuthorizationState::Pending)
    }

    /// Whether this state grants the requester access.
    pub fn grants_access(&self) -> bool {
        matches!(self, AuthorizationState::Confirmed)
    }
}

/// Terminal outcome applied through `PendingRequestStore::try_resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Confirmed,
    Denied,
    TimedOut,
}

impl From<Resolution> for AuthorizationState {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Confirmed => AuthorizationState::Confirmed,
            Resolution::Denied => AuthorizationState::Denied,
            Resolution::TimedOut => AuthorizationState::TimedOut,
        }
    }
}

/// Human decision on a pending request (link click or message reply)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "confirm")]
    Confirm,
    #[serde(rename = "cancel")]
    Cancel,
}

impl From<Decision> for Resolution {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Confirm => Resolution::Confirmed,
            Decision::Cancel => Resolution::Denied,
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "confirm" => Ok(Decision::Confirm),
            "cancel" => Ok(Decision::Cancel),
            other => Err(format!("unknown action '{}', expected confirm or cancel", other)),
        }
    }
}

/// Delivery channel used to reach the contacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Channel {
    /// SMS carrying a confirmation link (push mode)
    #[serde(rename = "sms")]
    #[default]
    Sms,
    /// WhatsApp message answered by a "confirm"/"cancel" reply (poll mode)
    #[serde(rename = "whatsapp")]
    WhatsApp,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Sms => f.write_str("sms"),
            Channel::WhatsApp => f.write_str("whatsapp"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sms" => Ok(Channel::Sms),
            "whatsapp" => Ok(Channel::WhatsApp),
            other => Err(format!("unknown channel '{}', expected sms or whatsapp", other)),
        }
    }
}

/// Fields supplied by the caller when asking for authorization
#[derive(Debug, Clone)]
pub struct NewAuthorization {
    pub subject_username: String,
    pub requester_name: String,
    pub is_emergency: bool,
    pub primary_contact: String,
    pub secondary_contact: Option<String>,
    pub channel: Channel,
    /// Wait window; the channel default applies when `None`.
    pub timeout: Option<std::time::Duration>,
}

/// A pending or just-finalized authorization request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub id: RequestId,
    pub subject_username: String,
    pub requester_name: String,
    pub is_emergency: bool,
    pub primary_contact: String,
    pub secondary_contact: Option<String>,
    pub channel: Channel,
    /// Only inbound confirmations sent after this instant are eligible.
    pub created_at: DateTime<Utc>,
    pub state: AuthorizationState,
    /// Meaningful only once the state is `Confirmed` or `Denied`.
    pub access_granted: bool,
}

impl AuthorizationRequest {
    /// Create a new pending request
    pub fn new(id: RequestId, fields: &NewAuthorization) -> Self {
        Self {
            id,
            subject_username: fields.subject_username.clone(),
            requester_name: fields.requester_name.clone(),
            is_emergency: fields.is_emergency,
            primary_contact: fields.primary_contact.clone(),
            secondary_contact: fields.secondary_contact.clone(),
            channel: fields.channel,
            created_at: Utc::now(),
            state: AuthorizationState::Pending,
            access_granted: false,
        }
    }

    /// Contacts to notify: the primary always, the secondary only in an emergency.
    pub fn destinations(&self) -> Vec<String> {
        let mut destinations = vec![self.primary_contact.clone()];
        if self.is_emergency {
            if let Some(secondary) = &self.secondary_contact {
                destinations.push(secondary.clone());
            }
        }
        destinations
    }
}

/// Final status reported to the blocked caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "denied")]
    Denied,
    #[serde(rename = "timeout")]
    Timeout,
}

impl From<AuthorizationState> for OutcomeStatus {
    fn from(state: AuthorizationState) -> Self {
        match state {
            AuthorizationState::Confirmed => OutcomeStatus::Confirmed,
            AuthorizationState::Denied => OutcomeStatus::Denied,
            // Pending never reaches a caller; treat it like an expired wait.
            AuthorizationState::TimedOut | AuthorizationState::Pending => OutcomeStatus::Timeout,
        }
    }
}

/// Result of one authorization lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationOutcome {
    pub request_id: RequestId,
    pub status: OutcomeStatus,
    pub access_granted: bool,
    pub subject_username: String,
    pub requester_name: String,
    pub is_emergency: bool,
    /// Contacts the notification actually reached.
    pub notified: Vec<String>,
}

impl AuthorizationOutcome {
    pub fn is_timeout(&self) -> bool {
        matches!(self.status, OutcomeStatus::Timeout)
    }
}

/// Answer to an explicit resolve call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveReport {
    pub request_id: RequestId,
    /// The decision that is final for this request, whoever made it.
    pub state: AuthorizationState,
    pub access_granted: bool,
    /// True when another resolution (or the timeout) got there first.
    pub already_resolved: bool,
}
