//! Cross-cutting services

pub mod logging;

pub use logging::{init_logging, log_error, log_lifecycle, log_security_event};
