//! Command handlers

use anyhow::{Context, Result};
use medauth_core::client::MedauthClient;
use medauth_core::gateway::AuthorizationCall;
use medauth_core::models::{
    AuthorizationOutcome, Channel, Configuration, Decision, OutcomeStatus,
};
use std::path::PathBuf;

/// Expand `~/` and fall back to the XDG default for an empty path.
fn resolve_config_path(config_file: &str) -> Result<PathBuf> {
    if config_file.is_empty() {
        return Configuration::default_config_path()
            .map_err(|e| anyhow::anyhow!("Failed to get default config path: {}", e));
    }
    if let Some(rest) = config_file.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(config_file))
}

fn load_config(path: &PathBuf) -> Result<Configuration> {
    Configuration::load_from_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))
}

/// Handle the 'serve' command
pub async fn handle_serve(host: Option<String>, port: Option<u16>, config_file: String) -> Result<()> {
    let config_path = resolve_config_path(&config_file)?;
    let mut config = load_config(&config_path)?;
    if let Some(host) = host {
        config.server_host = host;
    }
    if let Some(port) = port {
        config.server_port = port;
    }

    if let Err(e) = medauth_core::services::init_logging(config.log_level) {
        eprintln!("Logging already initialized: {}", e);
    }
    tracing::info!(config = %config_path.display(), "Configuration loaded");

    medauth_core::server::MedauthServer::new(config).start().await
}

/// Handle 'config --init'
pub async fn handle_config_init(config_file: String) -> Result<()> {
    let config_path = resolve_config_path(&config_file)?;
    if config_path.exists() {
        println!(
            "Configuration file already exists: {}",
            config_path.display()
        );
        let existing = load_config(&config_path)?;
        if let Err(errors) = existing.validate() {
            for error in errors {
                println!("  warning: {}", error);
            }
        }
        return Ok(());
    }

    Configuration::default()
        .save_to_file(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", config_path.display(), e))?;
    println!("Configuration written to {}", config_path.display());
    println!("Set MEDAUTH_TWILIO_AUTH_TOKEN and enable [twilio] to send real messages.");
    Ok(())
}

/// Handle 'config' without --init: print the effective configuration
pub async fn handle_config_show(config_file: String) -> Result<()> {
    let config_path = resolve_config_path(&config_file)?;
    let config = load_config(&config_path)?;
    println!("# {}", config_path.display());
    println!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to render configuration")?
    );
    Ok(())
}

/// Assemble the request body from command-line arguments.
pub fn build_call(
    subject: String,
    requester: String,
    primary: String,
    secondary: Option<String>,
    emergency: bool,
    channel: &str,
    timeout: Option<u64>,
) -> Result<AuthorizationCall> {
    let channel: Channel = channel.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    if emergency && secondary.is_none() {
        eprintln!("warning: --emergency without --secondary notifies the patient only");
    }
    Ok(AuthorizationCall {
        subject_username: subject,
        requester_name: requester,
        is_emergency: emergency,
        primary_contact: primary,
        secondary_contact: secondary,
        channel,
        timeout_seconds: timeout,
    })
}

fn print_outcome(outcome: &AuthorizationOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    match outcome.status {
        OutcomeStatus::Confirmed => println!("Authorization GRANTED ({})", outcome.request_id),
        OutcomeStatus::Denied => println!("Authorization DENIED ({})", outcome.request_id),
        OutcomeStatus::Timeout => println!(
            "Timeout: no answer for {}. Access not granted.",
            outcome.request_id
        ),
    }
    if !outcome.notified.is_empty() {
        println!("Notified: {}", outcome.notified.join(", "));
    }
    Ok(())
}

/// Handle the 'request' command
pub async fn handle_request(call: AuthorizationCall, server: String, json: bool) -> Result<()> {
    if !json {
        println!(
            "Requesting access to {}'s records for {}",
            call.subject_username, call.requester_name
        );
        println!("Waiting for the patient's decision...");
    }

    let client = MedauthClient::new(server);
    let outcome = client.request_authorization(&call).await?;
    print_outcome(&outcome, json)?;

    match outcome.status {
        OutcomeStatus::Confirmed => Ok(()),
        OutcomeStatus::Denied => Err(anyhow::anyhow!("Authorization denied")),
        OutcomeStatus::Timeout => Err(anyhow::anyhow!("Authorization timed out")),
    }
}

/// Handle the 'resolve' command
pub async fn handle_resolve(id: String, action: String, server: String, json: bool) -> Result<()> {
    let decision: Decision = action.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let client = MedauthClient::new(server);
    let report = client.resolve(&id, decision).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.already_resolved {
        println!(
            "Request {} was already resolved: {:?}",
            report.request_id, report.state
        );
    } else {
        println!("Request {} resolved: {:?}", report.request_id, report.state);
    }
    Ok(())
}

/// Handle the 'status' command
pub async fn handle_status(id: String, server: String) -> Result<()> {
    let client = MedauthClient::new(server);
    let request = client.status(&id).await?;
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_config_path() {
        assert_eq!(
            resolve_config_path("/etc/medauth.toml").unwrap(),
            PathBuf::from("/etc/medauth.toml")
        );
        let home = resolve_config_path("~/medauth.toml").unwrap();
        assert!(home.ends_with("medauth.toml"));
        assert!(!home.to_string_lossy().contains('~'));
    }

    #[test]
    fn test_build_call_parses_channel() {
        let call = build_call(
            "alice".to_string(),
            "Dr. Smith".to_string(),
            "+15550000001".to_string(),
            None,
            false,
            "whatsapp",
            Some(60),
        )
        .unwrap();
        assert_eq!(call.channel, Channel::WhatsApp);
        assert_eq!(call.timeout_seconds, Some(60));

        assert!(build_call(
            "alice".to_string(),
            "Dr. Smith".to_string(),
            "+15550000001".to_string(),
            None,
            false,
            "pager",
            None,
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_config_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        handle_config_init(path.to_string_lossy().to_string())
            .await
            .unwrap();
        let config = Configuration::load_from_file(&path).unwrap();
        assert_eq!(config.server_port, 3535);
    }
}
