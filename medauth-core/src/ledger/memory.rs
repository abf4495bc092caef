//! In-process ledger for development and tests

use crate::ledger::{Ledger, LedgerError};
use crate::models::Document;
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

#[derive(Debug, Default)]
struct Account {
    password_digest: String,
    documents: Vec<Document>,
    grantees: HashSet<String>,
}

fn digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// Ledger kept in a concurrent map. Passwords are stored as SHA-256 digests.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: DashMap<String, Account>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unknown_user(username: &str) -> LedgerError {
    LedgerError::Rejected(format!("user {} is not registered", username))
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn user_exists(&self, username: &str) -> Result<bool, LedgerError> {
        Ok(self.accounts.contains_key(username))
    }

    async fn register_user(&self, username: &str, password: &str) -> Result<(), LedgerError> {
        match self.accounts.entry(username.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(LedgerError::Rejected(format!(
                "user {} already registered",
                username
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Account {
                    password_digest: digest(password),
                    ..Account::default()
                });
                Ok(())
            }
        }
    }

    async fn login(&self, username: &str, password: &str) -> Result<bool, LedgerError> {
        Ok(self
            .accounts
            .get(username)
            .map(|account| account.password_digest == digest(password))
            .unwrap_or(false))
    }

    async fn registered_users(&self) -> Result<Vec<String>, LedgerError> {
        let mut users: Vec<String> = self.accounts.iter().map(|e| e.key().clone()).collect();
        users.sort();
        Ok(users)
    }

    async fn add_document(&self, owner: &str, document: Document) -> Result<(), LedgerError> {
        let mut account = self
            .accounts
            .get_mut(owner)
            .ok_or_else(|| unknown_user(owner))?;
        account.documents.push(document);
        Ok(())
    }

    async fn get_documents(&self, owner: &str) -> Result<Vec<Document>, LedgerError> {
        Ok(self
            .accounts
            .get(owner)
            .map(|account| account.documents.clone())
            .unwrap_or_default())
    }

    async fn toggle_access(
        &self,
        subject: &str,
        grantee: &str,
        allowed: bool,
    ) -> Result<(), LedgerError> {
        let mut account = self
            .accounts
            .get_mut(subject)
            .ok_or_else(|| unknown_user(subject))?;
        if allowed {
            account.grantees.insert(grantee.to_string());
        } else {
            account.grantees.remove(grantee);
        }
        Ok(())
    }

    async fn check_access(&self, subject: &str, grantee: &str) -> Result<bool, LedgerError> {
        Ok(self
            .accounts
            .get(subject)
            .map(|account| account.grantees.contains(grantee))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(name: &str) -> Document {
        Document {
            name: name.to_string(),
            content_ref: "cid".to_string(),
            description: "scan".to_string(),
            issuer: "dr-smith".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let ledger = InMemoryLedger::new();
        ledger.register_user("alice", "s3cret").await.unwrap();
        assert!(ledger.user_exists("alice").await.unwrap());
        assert!(ledger.login("alice", "s3cret").await.unwrap());
        assert!(!ledger.login("alice", "wrong").await.unwrap());
        assert!(!ledger.login("bob", "s3cret").await.unwrap());

        let err = ledger.register_user("alice", "other").await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_documents_and_access() {
        let ledger = InMemoryLedger::new();
        ledger.register_user("alice", "pw").await.unwrap();
        ledger.add_document("alice", document("xray")).await.unwrap();
        assert_eq!(ledger.get_documents("alice").await.unwrap().len(), 1);
        assert!(ledger.get_documents("nobody").await.unwrap().is_empty());

        assert!(!ledger.check_access("alice", "dr-smith").await.unwrap());
        ledger.toggle_access("alice", "dr-smith", true).await.unwrap();
        assert!(ledger.check_access("alice", "dr-smith").await.unwrap());
        ledger.toggle_access("alice", "dr-smith", false).await.unwrap();
        assert!(!ledger.check_access("alice", "dr-smith").await.unwrap());

        assert!(ledger.toggle_access("ghost", "dr-smith", true).await.is_err());
        assert!(ledger.add_document("ghost", document("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_registered_users_sorted() {
        let ledger = InMemoryLedger::new();
        ledger.register_user("zoe", "pw").await.unwrap();
        ledger.register_user("adam", "pw").await.unwrap();
        assert_eq!(
            ledger.registered_users().await.unwrap(),
            vec!["adam".to_string(), "zoe".to_string()]
        );
    }
}
