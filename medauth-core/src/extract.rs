//! Text extraction collaborator (OCR/LLM pipeline behind an opaque call)

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extraction backend unavailable: {0}")]
    Unavailable(String),

    #[error("could not extract text: {0}")]
    Failed(String),
}

/// `extract_text(image) -> string`
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, image: &[u8]) -> Result<String, ExtractError>;
}

#[derive(serde::Deserialize)]
struct ExtractResponse {
    text: String,
}

/// Extraction service reached over HTTP: posts the raw image, expects `{"text": "..."}`.
pub struct HttpTextExtractor {
    url: String,
    client: std::sync::Arc<reqwest::Client>,
}

impl HttpTextExtractor {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: std::sync::Arc::new(reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl TextExtractor for HttpTextExtractor {
    async fn extract_text(&self, image: &[u8]) -> Result<String, ExtractError> {
        let res = self
            .client
            .post(&self.url)
            .header("content-type", "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| ExtractError::Unavailable(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ExtractError::Failed(format!("{}: {}", status, body)));
        }
        let extracted: ExtractResponse = res
            .json()
            .await
            .map_err(|e| ExtractError::Failed(e.to_string()))?;
        Ok(extracted.text)
    }
}
