//! Configuration data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the Twilio auth token (never stored in the file).
pub const TWILIO_AUTH_TOKEN_ENV: &str = "MEDAUTH_TWILIO_AUTH_TOKEN";
/// Environment variables holding the Pinata credentials.
pub const PINATA_API_KEY_ENV: &str = "MEDAUTH_PINATA_API_KEY";
pub const PINATA_API_SECRET_ENV: &str = "MEDAUTH_PINATA_API_SECRET";

/// Logging level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

/// How poll mode settles disagreeing answers from the primary and secondary contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TieBreakPolicy {
    /// The primary contact's answer is used whenever it has one.
    #[serde(rename = "primary_priority")]
    #[default]
    PrimaryPriority,
    /// The earliest unambiguous reply from any contact wins.
    #[serde(rename = "first_to_respond")]
    FirstToRespond,
    /// Every contact must confirm; any cancel denies.
    #[serde(rename = "require_agreement")]
    RequireAgreement,
}

/// Where poll mode reads inbound replies from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InboxKind {
    /// Query the Twilio Messages list.
    #[serde(rename = "twilio")]
    Twilio,
    /// Replies delivered to `POST /api/v1/inbound` by the provider webhook.
    #[serde(rename = "webhook")]
    #[default]
    Webhook,
}

/// Authorization broker timing and policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Wait window for the SMS link flow
    pub default_timeout_secs: u64,
    /// Wait window for the WhatsApp reply flow
    pub whatsapp_timeout_secs: u64,
    /// Upper bound for caller-supplied timeouts
    pub max_timeout_secs: u64,
    pub poll_interval_secs: u64,
    /// Delay before the first inbox check, to let the message arrive
    pub poll_grace_secs: u64,
    /// How long a finalized decision is remembered for replayed resolve calls
    pub resolved_retention_secs: u64,
    pub tie_break: TieBreakPolicy,
    pub inbox: InboxKind,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 120,
            whatsapp_timeout_secs: 60,
            max_timeout_secs: 3600,
            poll_interval_secs: 5,
            poll_grace_secs: 5,
            resolved_retention_secs: 300,
            tie_break: TieBreakPolicy::PrimaryPriority,
            inbox: InboxKind::Webhook,
        }
    }
}

impl BrokerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_grace(&self) -> Duration {
        Duration::from_secs(self.poll_grace_secs)
    }

    pub fn resolved_retention(&self) -> Duration {
        Duration::from_secs(self.resolved_retention_secs)
    }
}

/// Twilio SMS/WhatsApp provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    pub enabled: bool,
    pub account_sid: String,
    /// Sender number for SMS, e.g. "+18623754945"
    pub sms_from: String,
    /// Sender number for WhatsApp, without the "whatsapp:" prefix
    pub whatsapp_from: String,
    pub api_base: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account_sid: String::new(),
            sms_from: String::new(),
            whatsapp_from: String::new(),
            api_base: "https://api.twilio.com".to_string(),
        }
    }
}

/// Blob (pinning service) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Use Pinata; the in-memory store is used otherwise
    pub enabled: bool,
    pub api_url: String,
    /// Public gateway prefix used to render document links
    pub gateway_url: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.pinata.cloud/pinning/pinFileToIPFS".to_string(),
            gateway_url: "https://ipfs.io/ipfs".to_string(),
        }
    }
}

/// Text extraction service settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractConfig {
    pub enabled: bool,
    /// Endpoint accepting a raw image and answering `{"text": "..."}`
    pub url: String,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Logging verbosity level
    pub log_level: LogLevel,
    /// Server bind address
    pub server_host: String,
    /// Server port number
    pub server_port: u16,
    /// Externally reachable base URL used in authorization links
    pub public_base_url: String,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server_host: "127.0.0.1".to_string(),
            server_port: 3535,
            public_base_url: "http://127.0.0.1:3535".to_string(),
            broker: BrokerConfig::default(),
            twilio: TwilioConfig::default(),
            blob: BlobConfig::default(),
            extract: ExtractConfig::default(),
        }
    }
}

impl Configuration {
    /// Load configuration from file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Configuration = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(Configuration::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(config_dir.join("medauth").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let broker = &self.broker;

        if broker.max_timeout_secs == 0 {
            errors.push("broker.max_timeout_secs must be positive".to_string());
        }
        for (name, value) in [
            ("broker.default_timeout_secs", broker.default_timeout_secs),
            ("broker.whatsapp_timeout_secs", broker.whatsapp_timeout_secs),
        ] {
            if value == 0 || value > broker.max_timeout_secs {
                errors.push(format!(
                    "{} must be between 1 and {}",
                    name, broker.max_timeout_secs
                ));
            }
        }

        if broker.poll_interval_secs == 0 {
            errors.push("broker.poll_interval_secs must be at least 1".to_string());
        }

        // Validate port (u16 is already 0-65535, so only check minimum)
        if self.server_port < 1024 {
            errors.push(
                "server_port must be at least 1024 (privileged ports not allowed)".to_string(),
            );
        }

        if url::Url::parse(&self.public_base_url).is_err() {
            errors.push("public_base_url must be an absolute URL".to_string());
        }

        if self.twilio.enabled && self.twilio.account_sid.is_empty() {
            errors.push("twilio.account_sid is required when twilio is enabled".to_string());
        }

        if self.extract.enabled && url::Url::parse(&self.extract.url).is_err() {
            errors.push(
                "extract.url must be an absolute URL when extraction is enabled".to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
