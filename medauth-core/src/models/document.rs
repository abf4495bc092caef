//! Medical document records kept by the ledger

use serde::{Deserialize, Serialize};

/// A document pointer stored on the ledger for a patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    /// Blob store content id of the uploaded file
    pub content_ref: String,
    pub description: String,
    /// Doctor (or other account) that issued the document
    pub issuer: String,
}

/// Document as rendered for API clients, with a resolvable link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentView {
    pub name: String,
    pub description: String,
    pub issuer: String,
    pub content_ref: String,
    pub file_url: String,
}

impl DocumentView {
    pub fn new(document: Document, gateway_url: &str) -> Self {
        let file_url = format!(
            "{}/{}",
            gateway_url.trim_end_matches('/'),
            document.content_ref
        );
        Self {
            name: document.name,
            description: document.description,
            issuer: document.issuer,
            content_ref: document.content_ref,
            file_url,
        }
    }
}
