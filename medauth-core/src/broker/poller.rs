//! Poll-mode confirmation loop, one task per waiting request

use crate::broker::confirmation::ConfirmationSource;
use crate::broker::store::{PendingRequestStore, ResolveResult};
use crate::models::{AuthorizationState, RequestId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What to poll for and how often.
#[derive(Debug, Clone)]
pub struct PollPlan {
    pub request_id: RequestId,
    /// Contacts that were actually notified, primary first.
    pub contacts: Vec<String>,
    pub since: DateTime<Utc>,
    pub grace: Duration,
    pub interval: Duration,
}

/// Resolves once the watched request is terminal or its entry is gone.
pub(crate) async fn wait_terminal(state_rx: &mut watch::Receiver<AuthorizationState>) {
    loop {
        if state_rx.borrow_and_update().is_terminal() {
            return;
        }
        if state_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `period`, returning `true` early when the request stops being pending.
async fn sleep_unless_resolved(
    state_rx: &mut watch::Receiver<AuthorizationState>,
    period: Duration,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(period) => false,
        _ = wait_terminal(state_rx) => true,
    }
}

pub fn spawn_poller(
    store: PendingRequestStore,
    source: Arc<dyn ConfirmationSource>,
    plan: PollPlan,
    state_rx: watch::Receiver<AuthorizationState>,
) -> JoinHandle<()> {
    tokio::spawn(run_poller(store, source, plan, state_rx))
}

async fn run_poller(
    store: PendingRequestStore,
    source: Arc<dyn ConfirmationSource>,
    plan: PollPlan,
    mut state_rx: watch::Receiver<AuthorizationState>,
) {
    let id = &plan.request_id;
    if sleep_unless_resolved(&mut state_rx, plan.grace).await {
        return;
    }

    loop {
        if !store.is_pending(id).await {
            break;
        }

        match source.find_signal(&plan.contacts, plan.since).await {
            Ok(Some(signal)) => {
                match store.try_resolve(id, signal.decision.into()).await {
                    ResolveResult::Applied(request) => tracing::info!(
                        request_id = %id,
                        source = source.name(),
                        contact = %signal.contact,
                        state = ?request.state,
                        "Authorization resolved by reply"
                    ),
                    ResolveResult::AlreadyResolved(state) => tracing::debug!(
                        request_id = %id,
                        state = ?state,
                        "Reply arrived after resolution"
                    ),
                    ResolveResult::NotFound => {}
                }
                break;
            }
            Ok(None) => {
                tracing::trace!(request_id = %id, "No reply yet");
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %id,
                    source = source.name(),
                    error = %e,
                    "Confirmation check failed"
                );
            }
        }

        if sleep_unless_resolved(&mut state_rx, plan.interval).await {
            break;
        }
    }
}
