//! Data models for medauth

pub mod authorization;
pub mod configuration;
pub mod document;

pub use authorization::*;
pub use configuration::*;
pub use document::*;
