//! # medauth core library
//!
//! Brokers access to medical documents behind an out-of-band human
//! authorization step delivered over SMS or WhatsApp.
//!
//! The [`broker`] module owns the pending-request store and the authorization
//! lifecycle. Collaborators ([`ledger`], [`blob`], [`extract`], [`providers`])
//! are traits with in-process implementations for development and tests, and
//! [`gateway`] plus [`server`] expose everything over HTTP.

pub mod blob;
pub mod broker;
pub mod client;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod ledger;
pub mod models;
pub mod notices;
pub mod providers;
pub mod server;
pub mod services;

pub use error::{BrokerError, BrokerResult};
