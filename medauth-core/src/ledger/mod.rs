//! Ledger collaborator: user credentials, document pointers and access grants
//!
//! The ledger's own consensus and persistence are out of scope; the broker
//! only relies on this call contract. Transport and contract failures are
//! errors, distinct from a `false` business answer.

mod memory;

pub use memory::InMemoryLedger;

use crate::models::Document;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Transport(String),

    /// The contract refused the call (e.g. duplicate registration).
    #[error("ledger rejected call: {0}")]
    Rejected(String),

    #[error("unexpected ledger response: {0}")]
    UnexpectedShape(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn user_exists(&self, username: &str) -> Result<bool, LedgerError>;

    async fn register_user(&self, username: &str, password: &str) -> Result<(), LedgerError>;

    /// `Ok(false)` for a wrong password or unknown user.
    async fn login(&self, username: &str, password: &str) -> Result<bool, LedgerError>;

    async fn registered_users(&self) -> Result<Vec<String>, LedgerError>;

    async fn add_document(&self, owner: &str, document: Document) -> Result<(), LedgerError>;

    async fn get_documents(&self, owner: &str) -> Result<Vec<Document>, LedgerError>;

    /// Grant or revoke `grantee`'s access to `subject`'s documents.
    async fn toggle_access(
        &self,
        subject: &str,
        grantee: &str,
        allowed: bool,
    ) -> Result<(), LedgerError>;

    async fn check_access(&self, subject: &str, grantee: &str) -> Result<bool, LedgerError>;
}
