//! Logging service

use crate::models::LogLevel;
use tracing_subscriber::EnvFilter;

fn default_directives(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "medauth_core=error,medauth=error",
        LogLevel::Warn => "medauth_core=warn,medauth=warn",
        LogLevel::Info => "medauth_core=info,medauth=info",
        LogLevel::Debug => "medauth_core=debug,medauth=debug",
        LogLevel::Trace => "medauth_core=trace,medauth=trace",
    }
}

/// Initialize logging with the specified level.
///
/// `RUST_LOG` takes precedence when set. Calling this twice is harmless: the
/// second subscriber is rejected and the first stays installed.
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
}

/// Log a lifecycle transition of an authorization request
pub fn log_lifecycle(request_id: &str, phase: &str, details: Option<&str>) {
    tracing::info!(
        request_id = request_id,
        phase = phase,
        details = details.unwrap_or(""),
        "Authorization lifecycle"
    );
}

/// Log a security event (always logged regardless of level)
pub fn log_security_event(event_type: &str, subject: &str, actor: Option<&str>, details: &str) {
    tracing::warn!(
        event_type = event_type,
        subject = subject,
        actor = actor.unwrap_or("unknown"),
        details = details,
        "Security event"
    );
}

/// Log a system error
pub fn log_error(error: &str, context: Option<&str>) {
    tracing::error!(
        error = error,
        context = context.unwrap_or(""),
        "System error occurred"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_logging() {
        INIT.call_once(|| {
            let _ = init_logging(LogLevel::Info);
        });
    }

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives(LogLevel::Debug),
            "medauth_core=debug,medauth=debug"
        );
    }

    #[test]
    fn test_second_initialization_is_rejected_not_fatal() {
        init_test_logging();
        assert!(init_logging(LogLevel::Trace).is_err());
    }

    #[test]
    fn test_log_functions() {
        init_test_logging();

        // These should not panic
        log_lifecycle("20261018-abc", "Waiting", Some("timeout 120s"));
        log_security_event("access_denied", "alice", Some("dr-who"), "no grant");
        log_error("test error", Some("test context"));
    }
}
