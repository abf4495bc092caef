//! Server assembly: wires configuration into the broker, its collaborators and the HTTP routes

use crate::blob::{BlobStore, InMemoryBlobStore, PinataBlobStore};
use crate::broker::{
    AuthorizationBroker, BrokerSettings, ChannelRoute, ConfirmationSource,
    InboxConfirmationSource, KeywordClassifier, PendingRequestStore,
};
use crate::extract::HttpTextExtractor;
use crate::gateway::AccessGateway;
use crate::ledger::InMemoryLedger;
use crate::models::{
    Channel, Configuration, InboxKind, PINATA_API_KEY_ENV, PINATA_API_SECRET_ENV,
    TWILIO_AUTH_TOKEN_ENV,
};
use crate::providers::{
    InboundMessageLog, LoggingSender, MemoryInbox, NotificationSender, TwilioAccount,
    TwilioInbox, TwilioSender,
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Main medauth server
pub struct MedauthServer {
    config: Configuration,
}

impl MedauthServer {
    /// Create a new server from a validated configuration
    pub fn new(config: Configuration) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Twilio account when enabled and the token is present in the environment.
    fn twilio_account(&self) -> Option<TwilioAccount> {
        let twilio = &self.config.twilio;
        if !twilio.enabled {
            tracing::warn!("Twilio disabled: notifications are logged, not sent");
            return None;
        }
        match std::env::var(TWILIO_AUTH_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Some(TwilioAccount::new(
                twilio.api_base.clone(),
                twilio.account_sid.clone(),
                token,
            )),
            _ => {
                tracing::warn!(
                    "Twilio provider skipped: {} not set, notifications are logged only",
                    TWILIO_AUTH_TOKEN_ENV
                );
                None
            }
        }
    }

    fn blob_store(&self) -> Arc<dyn BlobStore> {
        let blob = &self.config.blob;
        if blob.enabled {
            match (
                std::env::var(PINATA_API_KEY_ENV),
                std::env::var(PINATA_API_SECRET_ENV),
            ) {
                (Ok(key), Ok(secret)) => {
                    return Arc::new(PinataBlobStore::new(blob.api_url.clone(), key, secret));
                }
                _ => tracing::warn!(
                    "Pinata skipped: {} / {} not set, using in-memory blob store",
                    PINATA_API_KEY_ENV,
                    PINATA_API_SECRET_ENV
                ),
            }
        }
        Arc::new(InMemoryBlobStore::new())
    }

    /// Build the gateway with every collaborator the configuration asks for.
    pub fn build_gateway(&self) -> AccessGateway {
        let config = &self.config;
        let account = self.twilio_account();

        let (sms_sender, whatsapp_sender): (Arc<dyn NotificationSender>, Arc<dyn NotificationSender>) =
            match &account {
                Some(account) => (
                    Arc::new(TwilioSender::new(
                        account.clone(),
                        Channel::Sms,
                        config.twilio.sms_from.clone(),
                    )),
                    Arc::new(TwilioSender::new(
                        account.clone(),
                        Channel::WhatsApp,
                        config.twilio.whatsapp_from.clone(),
                    )),
                ),
                None => (
                    Arc::new(LoggingSender::new("log-sms")),
                    Arc::new(LoggingSender::new("log-whatsapp")),
                ),
            };

        let mut webhook_inbox = None;
        let inbound_log: Arc<dyn InboundMessageLog> = match (config.broker.inbox, &account) {
            (InboxKind::Twilio, Some(account)) => {
                Arc::new(TwilioInbox::new(account.clone(), Channel::WhatsApp))
            }
            (kind, _) => {
                if kind == InboxKind::Twilio {
                    tracing::warn!("Twilio inbox unavailable, reading replies from the webhook");
                }
                let inbox = MemoryInbox::new();
                webhook_inbox = Some(inbox.clone());
                Arc::new(inbox)
            }
        };
        let confirmation: Arc<dyn ConfirmationSource> = Arc::new(InboxConfirmationSource::new(
            inbound_log,
            Arc::new(KeywordClassifier::default()),
            config.broker.tie_break,
        ));

        let store = PendingRequestStore::with_retention(config.broker.resolved_retention());
        let broker = AuthorizationBroker::new(store, BrokerSettings::from(config))
            .with_route(
                Channel::Sms,
                ChannelRoute {
                    sender: sms_sender,
                    confirmation: None,
                    default_timeout: Duration::from_secs(config.broker.default_timeout_secs),
                },
            )
            .with_route(
                Channel::WhatsApp,
                ChannelRoute {
                    sender: whatsapp_sender,
                    confirmation: Some(confirmation),
                    default_timeout: Duration::from_secs(config.broker.whatsapp_timeout_secs),
                },
            );

        let mut gateway = AccessGateway::new(
            Arc::new(broker),
            Arc::new(InMemoryLedger::new()),
            self.blob_store(),
        )
        .with_gateway_url(config.blob.gateway_url.clone());
        if let Some(inbox) = webhook_inbox {
            gateway = gateway.with_inbox(inbox);
        }
        if config.extract.enabled {
            gateway = gateway.with_extractor(Arc::new(HttpTextExtractor::new(
                config.extract.url.clone(),
            )));
        }
        gateway
    }

    /// Start the server and run until Ctrl+C
    pub async fn start(self) -> Result<()> {
        if let Err(errors) = self.config.validate() {
            anyhow::bail!("Invalid configuration: {}", errors.join("; "));
        }
        let address: SocketAddr = format!("{}:{}", self.config.server_host, self.config.server_port)
            .parse()
            .context("Invalid server address")?;

        let gateway = Arc::new(self.build_gateway());
        let routes = crate::server::api::create_api_routes(gateway);

        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(address, async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown signal received");
                }
            })
            .context(format!("Failed to bind to {}", address))?;

        println!("medauth server listening on http://{}", bound);
        println!("Authorization links use {}", self.config.public_base_url);
        println!("Press Ctrl+C to stop the server");
        tracing::info!(address = %bound, "Server started");

        server.await;
        tracing::info!("Server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_builds_dev_gateway() {
        let server = MedauthServer::new(Configuration::default());
        let gateway = server.build_gateway();
        assert_eq!(gateway.health().await.pending_authorizations, 0);
        // Webhook inbox is wired by default.
        assert!(gateway
            .record_inbound("whatsapp:+15550000001", "confirm")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_invalid_config_refuses_to_start() {
        let config = Configuration {
            server_port: 80,
            ..Configuration::default()
        };
        let err = MedauthServer::new(config).start().await.unwrap_err();
        assert!(err.to_string().contains("server_port"));
    }
}
