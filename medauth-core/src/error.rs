//! Error taxonomy shared by the broker, the gateway and the collaborators.
//!
//! Races (duplicate resolution, timeout losing to a decision) are reported as
//! values by the store and the broker, never through this type.

use crate::blob::BlobError;
use crate::extract::ExtractError;
use crate::ledger::LedgerError;
use crate::models::RequestId;
use crate::providers::{DeliveryError, InboxError};
use thiserror::Error;

/// Result alias for broker and gateway operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Missing or malformed caller input, rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// The primary contact could not be notified.
    #[error("notification failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("inbound message log error: {0}")]
    Inbox(#[from] InboxError),

    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobError),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    /// Unknown or already evicted authorization request.
    #[error("authorization request {0} not found")]
    NotFound(RequestId),

    #[error("authorization request {0} already exists")]
    DuplicateId(RequestId),

    #[error("user not found: {0}")]
    UnknownUser(String),

    #[error("no notifications for {0}")]
    NoNotices(String),

    #[error("invalid credentials for {0}")]
    InvalidCredentials(String),

    #[error("access denied: {grantee} may not read documents of {subject}")]
    AccessDenied { subject: String, grantee: String },
}

impl BrokerError {
    /// HTTP status the gateway answers with for this error.
    pub fn status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            BrokerError::Validation(_) => StatusCode::BAD_REQUEST,
            BrokerError::NotFound(_)
            | BrokerError::UnknownUser(_)
            | BrokerError::NoNotices(_) => StatusCode::NOT_FOUND,
            BrokerError::DuplicateId(_) => StatusCode::CONFLICT,
            BrokerError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            BrokerError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            BrokerError::Delivery(_)
            | BrokerError::Ledger(_)
            | BrokerError::Inbox(_)
            | BrokerError::BlobStore(_)
            | BrokerError::Extraction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
