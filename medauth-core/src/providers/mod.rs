//! Communication providers: notification senders and inbound message logs
//!
//! Twilio backs both directions in production. `LoggingSender` and
//! `MemoryInbox` (fed by the inbound webhook) let the server run without a
//! provider account.

pub mod contact;
mod inbox;
mod log;
mod sender;
mod twilio;

pub use contact::normalize_address;
pub use inbox::{InboundMessage, InboundMessageLog, InboxError, MemoryInbox};
pub use log::LoggingSender;
pub use sender::{notify_all, DeliveryError, NotificationSender, SendReceipt};
pub use twilio::{TwilioAccount, TwilioInbox, TwilioSender};
