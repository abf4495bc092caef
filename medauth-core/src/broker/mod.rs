//! Asynchronous authorization broker
//!
//! **Store**: [`PendingRequestStore`] is the only shared mutable state. Its
//! `try_resolve` is the check-and-set every resolution path goes through.
//!
//! **Push mode**: the resolve endpoint calls [`AuthorizationBroker::resolve`].
//!
//! **Poll mode**: a [`ConfirmationSource`] is polled by a per-request task
//! after a grace delay, at a fixed interval. The task is woken and stops as
//! soon as the request leaves the pending state.

pub mod classifier;
pub mod confirmation;
pub mod engine;
pub mod poller;
pub mod store;

pub use classifier::{Classification, KeywordClassifier, ReplyClassifier};
pub use confirmation::{ConfirmationSignal, ConfirmationSource, InboxConfirmationSource};
pub use engine::{
    AuthorizationBroker, BrokerSettings, ChannelRoute, LifecyclePhase, PendingAuthorization,
};
pub use poller::PollPlan;
pub use store::{PendingHandle, PendingRequestStore, ResolveResult, DEFAULT_RESOLVED_RETENTION};
