//! Authorization broker: drives one authorization lifecycle
//!
//! `Created -> Notifying -> Waiting -> {Resolved | TimedOut | Failed}`
//!
//! The caller, the optional poller and any explicit resolve call run as
//! independent tasks. They only meet in [`PendingRequestStore::try_resolve`],
//! so whichever reaches it first decides the request; the timeout is just
//! another contender and never overrides an earlier decision.

use crate::broker::confirmation::ConfirmationSource;
use crate::broker::poller::{spawn_poller, wait_terminal, PollPlan};
use crate::broker::store::{PendingRequestStore, ResolveResult};
use crate::models::{
    AuthorizationOutcome, AuthorizationRequest, AuthorizationState, Channel, Configuration,
    Decision, NewAuthorization, OutcomeStatus, RequestId, Resolution, ResolveReport,
};
use crate::providers::{notify_all, NotificationSender};
use crate::services::log_lifecycle;
use crate::{BrokerError, BrokerResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle phases, reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Created,
    Notifying,
    Waiting,
    Resolved,
    TimedOut,
    Failed,
}

/// How requests on one channel are delivered and confirmed
#[derive(Clone)]
pub struct ChannelRoute {
    pub sender: Arc<dyn NotificationSender>,
    /// Poll-mode source; `None` means push mode only (link click).
    pub confirmation: Option<Arc<dyn ConfirmationSource>>,
    pub default_timeout: Duration,
}

/// Broker-wide settings
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Base URL used to build the link sent in push-mode messages
    pub public_base_url: String,
    pub poll_interval: Duration,
    pub poll_grace: Duration,
    pub max_timeout: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:3535".to_string(),
            poll_interval: Duration::from_secs(5),
            poll_grace: Duration::from_secs(5),
            max_timeout: Duration::from_secs(3600),
        }
    }
}

impl From<&Configuration> for BrokerSettings {
    fn from(config: &Configuration) -> Self {
        Self {
            public_base_url: config.public_base_url.clone(),
            poll_interval: config.broker.poll_interval(),
            poll_grace: config.broker.poll_grace(),
            max_timeout: Duration::from_secs(config.broker.max_timeout_secs),
        }
    }
}

fn log_phase(id: &RequestId, phase: LifecyclePhase, details: &str) {
    log_lifecycle(id.as_str(), &format!("{:?}", phase), Some(details));
}

/// Orchestrates authorization lifecycles over a shared store.
pub struct AuthorizationBroker {
    store: PendingRequestStore,
    routes: HashMap<Channel, ChannelRoute>,
    settings: BrokerSettings,
}

impl AuthorizationBroker {
    pub fn new(store: PendingRequestStore, settings: BrokerSettings) -> Self {
        Self {
            store,
            routes: HashMap::new(),
            settings,
        }
    }

    /// Register the delivery route for a channel.
    pub fn with_route(mut self, channel: Channel, route: ChannelRoute) -> Self {
        self.routes.insert(channel, route);
        self
    }

    pub fn store(&self) -> &PendingRequestStore {
        &self.store
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Human-facing page for a request.
    pub fn authorization_link(&self, id: &RequestId) -> String {
        format!(
            "{}/api/v1/authorizations/{}",
            self.settings.public_base_url.trim_end_matches('/'),
            id
        )
    }

    fn compose_message(&self, request: &AuthorizationRequest, emergency: bool) -> String {
        let prefix = if emergency { "EMERGENCY: " } else { "" };
        let ask = format!(
            "{}Authorization request from {} for {}'s medical records.",
            prefix, request.requester_name, request.subject_username
        );
        let link = self.authorization_link(&request.id);
        match request.channel {
            Channel::Sms => format!("{} Please click: {}", ask, link),
            Channel::WhatsApp => format!(
                "{} Reply CONFIRM to grant access or CANCEL to deny, or open: {}",
                ask, link
            ),
        }
    }

    /// Create the request, notify its contacts and start waiting.
    ///
    /// Returns once the request is in the `Waiting` phase; the returned handle
    /// exposes the id and completes the lifecycle with [`PendingAuthorization::wait`].
    pub async fn begin(&self, new: NewAuthorization) -> BrokerResult<PendingAuthorization> {
        let route = self.routes.get(&new.channel).ok_or_else(|| {
            BrokerError::Validation(format!("channel {} is not configured", new.channel))
        })?;
        let timeout = new.timeout.unwrap_or(route.default_timeout);
        if timeout.is_zero() || timeout > self.settings.max_timeout {
            return Err(BrokerError::Validation(format!(
                "timeout must be between 1 and {} seconds",
                self.settings.max_timeout.as_secs()
            )));
        }

        let id = RequestId::generate();
        let handle = self.store.create(id.clone(), &new).await?;
        // Guard the entry from here on: a caller dropped mid-send must not leak it.
        let mut pending = PendingAuthorization {
            request: handle.request,
            state_rx: handle.state_rx,
            store: self.store.clone(),
            poller: None,
            timeout,
            notified: Vec::new(),
            finished: false,
        };
        log_phase(&id, LifecyclePhase::Created, &pending.request.channel.to_string());

        log_phase(&id, LifecyclePhase::Notifying, route.sender.name());
        let deliveries: Vec<(String, String)> = pending
            .request
            .destinations()
            .into_iter()
            .enumerate()
            .map(|(index, destination)| {
                let body = self.compose_message(&pending.request, index > 0);
                (destination, body)
            })
            .collect();
        let results = notify_all(route.sender.as_ref(), &deliveries).await;

        let mut notified = Vec::with_capacity(deliveries.len());
        for (index, ((destination, _), result)) in deliveries.iter().zip(results).enumerate() {
            match result {
                Ok(receipt) => {
                    tracing::debug!(
                        request_id = %id,
                        contact = %destination,
                        provider_id = %receipt.provider_id,
                        "Notification accepted"
                    );
                    notified.push(destination.clone());
                }
                Err(e) if index == 0 => {
                    pending.finish();
                    self.store.evict(&id).await;
                    log_phase(&id, LifecyclePhase::Failed, &e.to_string());
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %id,
                        contact = %destination,
                        error = %e,
                        "Secondary contact unreachable, continuing with primary only"
                    );
                }
            }
        }

        pending.poller = route.confirmation.as_ref().map(|source| {
            spawn_poller(
                self.store.clone(),
                Arc::clone(source),
                PollPlan {
                    request_id: id.clone(),
                    contacts: notified.clone(),
                    since: pending.request.created_at,
                    grace: self.settings.poll_grace,
                    interval: self.settings.poll_interval,
                },
                pending.state_rx.clone(),
            )
        });
        pending.notified = notified;
        log_phase(
            &id,
            LifecyclePhase::Waiting,
            &format!("timeout {}s", timeout.as_secs_f32()),
        );

        Ok(pending)
    }

    /// Full blocking lifecycle: begin, then wait for the outcome.
    pub async fn request_authorization(
        &self,
        new: NewAuthorization,
    ) -> BrokerResult<AuthorizationOutcome> {
        self.begin(new).await?.wait().await
    }

    /// Push-mode resolution (link click). Replays report the decision that won.
    pub async fn resolve(&self, id: &RequestId, decision: Decision) -> BrokerResult<ResolveReport> {
        match self.store.try_resolve(id, decision.into()).await {
            ResolveResult::Applied(request) => Ok(ResolveReport {
                request_id: request.id,
                state: request.state,
                access_granted: request.access_granted,
                already_resolved: false,
            }),
            ResolveResult::AlreadyResolved(state) => Ok(ResolveReport {
                request_id: id.clone(),
                state,
                access_granted: state.grants_access(),
                already_resolved: true,
            }),
            ResolveResult::NotFound => Err(BrokerError::NotFound(id.clone())),
        }
    }

    /// The pending entry for `id`.
    pub async fn get(&self, id: &RequestId) -> BrokerResult<AuthorizationRequest> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| BrokerError::NotFound(id.clone()))
    }
}

/// A request in the `Waiting` phase.
///
/// Dropping it without calling [`wait`](Self::wait) (e.g. the HTTP caller
/// disconnected) stops the poller and evicts the entry. The same holds while
/// [`AuthorizationBroker::begin`] is still notifying.
pub struct PendingAuthorization {
    request: AuthorizationRequest,
    state_rx: watch::Receiver<AuthorizationState>,
    store: PendingRequestStore,
    poller: Option<JoinHandle<()>>,
    timeout: Duration,
    notified: Vec<String>,
    finished: bool,
}

impl PendingAuthorization {
    pub fn id(&self) -> &RequestId {
        &self.request.id
    }

    pub fn request(&self) -> &AuthorizationRequest {
        &self.request
    }

    /// Contacts the notification reached.
    pub fn notified(&self) -> &[String] {
        &self.notified
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until the request is decided or the wait window elapses.
    pub async fn wait(mut self) -> BrokerResult<AuthorizationOutcome> {
        let id = self.request.id.clone();
        if tokio::time::timeout(self.timeout, wait_terminal(&mut self.state_rx))
            .await
            .is_err()
        {
            tracing::debug!(request_id = %id, "Wait window elapsed");
        }

        let observed = *self.state_rx.borrow();
        let state = if observed.is_terminal() {
            observed
        } else {
            match self.store.try_resolve(&id, Resolution::TimedOut).await {
                ResolveResult::Applied(request) => request.state,
                ResolveResult::AlreadyResolved(state) => state,
                ResolveResult::NotFound => {
                    self.finish();
                    log_phase(&id, LifecyclePhase::Failed, "entry evicted while waiting");
                    return Err(BrokerError::NotFound(id));
                }
            }
        };
        self.finish();

        let phase = if state == AuthorizationState::TimedOut {
            LifecyclePhase::TimedOut
        } else {
            LifecyclePhase::Resolved
        };
        log_phase(&id, phase, &format!("{:?}", state));

        Ok(AuthorizationOutcome {
            request_id: id,
            status: OutcomeStatus::from(state),
            access_granted: state.grants_access(),
            subject_username: self.request.subject_username.clone(),
            requester_name: self.request.requester_name.clone(),
            is_emergency: self.request.is_emergency,
            notified: self.notified.clone(),
        })
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

impl Drop for PendingAuthorization {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            let id = self.request.id.clone();
            runtime.spawn(async move {
                store.evict(&id).await;
                tracing::info!(request_id = %id, "Abandoned authorization evicted");
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LoggingSender;

    fn broker() -> AuthorizationBroker {
        AuthorizationBroker::new(
            PendingRequestStore::new(),
            BrokerSettings {
                public_base_url: "https://auth.example.org/".to_string(),
                ..BrokerSettings::default()
            },
        )
        .with_route(
            Channel::Sms,
            ChannelRoute {
                sender: Arc::new(LoggingSender::new("log")),
                confirmation: None,
                default_timeout: Duration::from_millis(50),
            },
        )
    }

    fn new_request(channel: Channel, emergency: bool) -> NewAuthorization {
        NewAuthorization {
            subject_username: "alice".to_string(),
            requester_name: "Dr. Smith".to_string(),
            is_emergency: emergency,
            primary_contact: "+15550000001".to_string(),
            secondary_contact: Some("+15550000002".to_string()),
            channel,
            timeout: None,
        }
    }

    #[test]
    fn test_authorization_link() {
        let id = RequestId::from("20261018-abc");
        assert_eq!(
            broker().authorization_link(&id),
            "https://auth.example.org/api/v1/authorizations/20261018-abc"
        );
    }

    #[test]
    fn test_compose_message() {
        let broker = broker();
        let request =
            AuthorizationRequest::new(RequestId::from("r1"), &new_request(Channel::Sms, true));
        let primary = broker.compose_message(&request, false);
        let secondary = broker.compose_message(&request, true);
        assert!(primary.starts_with("Authorization request from Dr. Smith for alice's"));
        assert!(primary.contains("/api/v1/authorizations/r1"));
        assert!(secondary.starts_with("EMERGENCY: "));

        let whatsapp = AuthorizationRequest::new(
            RequestId::from("r2"),
            &new_request(Channel::WhatsApp, false),
        );
        assert!(broker
            .compose_message(&whatsapp, false)
            .contains("Reply CONFIRM"));
    }

    #[tokio::test]
    async fn test_unconfigured_channel_rejected() {
        let err = broker()
            .begin(new_request(Channel::WhatsApp, false))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BrokerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_timeout_bounds() {
        let mut request = new_request(Channel::Sms, false);
        request.timeout = Some(Duration::from_secs(7200));
        let err = broker().begin(request).await.err().unwrap();
        assert!(matches!(err, BrokerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_abandoned_wait_is_evicted() {
        let broker = broker();
        let pending = broker.begin(new_request(Channel::Sms, false)).await.unwrap();
        let id = pending.id().clone();
        assert!(broker.store().is_pending(&id).await);
        drop(pending);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!broker.store().is_pending(&id).await);
    }
}
