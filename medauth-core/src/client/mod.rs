//! HTTP client for a running medauth server

use crate::gateway::{AuthorizationCall, HealthReport};
use crate::models::{AuthorizationOutcome, AuthorizationRequest, Decision, ResolveReport};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};

pub struct MedauthClient {
    base_url: String,
    client: Client,
}

impl MedauthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        let base = base.trim_end_matches('/').to_string();
        Self {
            base_url: base,
            client: Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("Server error {}: {}", status, body.trim()))
        }
    }

    /// Ask for authorization and block until the server answers.
    ///
    /// A timeout is an outcome (`408`), not an error.
    pub async fn request_authorization(
        &self,
        call: &AuthorizationCall,
    ) -> Result<AuthorizationOutcome> {
        let response = self
            .client
            .post(self.endpoint("api/v1/authorizations"))
            .json(call)
            .send()
            .await
            .context("Failed to reach server")?;

        let response = if response.status() == StatusCode::REQUEST_TIMEOUT {
            response
        } else {
            Self::ensure_success(response).await?
        };
        response
            .json::<AuthorizationOutcome>()
            .await
            .context("Failed to parse authorization outcome")
    }

    pub async fn resolve(&self, id: &str, decision: Decision) -> Result<ResolveReport> {
        let response = self
            .client
            .post(self.endpoint(&format!("api/v1/authorizations/{}/resolve", id)))
            .json(&serde_json::json!({ "action": decision }))
            .send()
            .await
            .context("Failed to reach server")?;

        let response = Self::ensure_success(response).await?;
        response
            .json::<ResolveReport>()
            .await
            .context("Failed to parse resolve response")
    }

    pub async fn status(&self, id: &str) -> Result<AuthorizationRequest> {
        let response = self
            .client
            .get(self.endpoint(&format!("api/v1/authorizations/{}/status", id)))
            .send()
            .await
            .context("Failed to reach server")?;

        let response = Self::ensure_success(response).await?;
        response
            .json::<AuthorizationRequest>()
            .await
            .context("Failed to parse authorization status")
    }

    pub async fn health(&self) -> Result<HealthReport> {
        let response = self
            .client
            .get(self.endpoint("api/v1/health"))
            .send()
            .await
            .context("Failed to reach server")?;

        let response = Self::ensure_success(response).await?;
        response
            .json::<HealthReport>()
            .await
            .context("Failed to parse health response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_paths() {
        let client = MedauthClient::new("http://127.0.0.1:3535/");
        assert_eq!(
            client.endpoint("api/v1/health"),
            "http://127.0.0.1:3535/api/v1/health"
        );
        assert_eq!(
            client.endpoint("/api/v1/health"),
            "http://127.0.0.1:3535/api/v1/health"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let client = MedauthClient::new("http://127.0.0.1:9");
        assert!(client.health().await.is_err());
    }
}
