//! Pending request store: the single synchronization point for authorization requests
//!
//! Every read and write of an entry goes through one async mutex. The lock is
//! never held across provider or ledger calls. Resolution is a single
//! check-and-set: the first `try_resolve` on a pending entry finalizes it and
//! evicts it in the same critical section, later attempts observe
//! `AlreadyResolved`.

use crate::models::{
    AuthorizationRequest, AuthorizationState, NewAuthorization, RequestId, Resolution,
};
use crate::{BrokerError, BrokerResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

/// Default time a finalized decision is remembered for replayed resolve calls.
pub const DEFAULT_RESOLVED_RETENTION: Duration = Duration::from_secs(300);

/// Outcome of a resolution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveResult {
    /// This call finalized the request; carries the finalized entry.
    Applied(AuthorizationRequest),
    /// Someone else finalized the request first; carries the winning state.
    AlreadyResolved(AuthorizationState),
    NotFound,
}

#[derive(Debug)]
struct PendingEntry {
    request: AuthorizationRequest,
    state_tx: watch::Sender<AuthorizationState>,
}

/// Decision remembered after eviction.
#[derive(Debug, Clone, Copy)]
struct Tombstone {
    state: AuthorizationState,
    evicted_at: Instant,
}

#[derive(Debug, Default)]
struct StoreInner {
    pending: HashMap<RequestId, PendingEntry>,
    resolved: HashMap<RequestId, Tombstone>,
}

impl StoreInner {
    fn prune_resolved(&mut self, retention: Duration) {
        self.resolved
            .retain(|_, tombstone| tombstone.evicted_at.elapsed() < retention);
    }
}

/// Handle returned by `create`: the new entry and a watch on its state.
#[derive(Debug)]
pub struct PendingHandle {
    pub request: AuthorizationRequest,
    pub state_rx: watch::Receiver<AuthorizationState>,
}

/// Process-wide registry of in-flight authorization requests.
#[derive(Clone)]
pub struct PendingRequestStore {
    inner: Arc<Mutex<StoreInner>>,
    retention: Duration,
}

impl PendingRequestStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RESOLVED_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::default())),
            retention,
        }
    }

    /// Insert a new pending entry under `id`.
    pub async fn create(&self, id: RequestId, fields: &NewAuthorization) -> BrokerResult<PendingHandle> {
        let mut guard = self.inner.lock().await;
        if guard.pending.contains_key(&id) || guard.resolved.contains_key(&id) {
            return Err(BrokerError::DuplicateId(id));
        }
        let request = AuthorizationRequest::new(id.clone(), fields);
        let (state_tx, state_rx) = watch::channel(AuthorizationState::Pending);
        guard.pending.insert(
            id,
            PendingEntry {
                request: request.clone(),
                state_tx,
            },
        );
        Ok(PendingHandle { request, state_rx })
    }

    /// Snapshot of a pending entry; `None` once evicted or never created.
    pub async fn get(&self, id: &RequestId) -> Option<AuthorizationRequest> {
        self.inner
            .lock()
            .await
            .pending
            .get(id)
            .map(|entry| entry.request.clone())
    }

    pub async fn is_pending(&self, id: &RequestId) -> bool {
        self.inner.lock().await.pending.contains_key(id)
    }

    /// Watch the state of a pending entry, e.g. to cancel a poller.
    pub async fn subscribe(&self, id: &RequestId) -> Option<watch::Receiver<AuthorizationState>> {
        self.inner
            .lock()
            .await
            .pending
            .get(id)
            .map(|entry| entry.state_tx.subscribe())
    }

    /// Atomically finalize a pending entry.
    ///
    /// On `Applied` the entry is already evicted and its waiters notified.
    pub async fn try_resolve(&self, id: &RequestId, resolution: Resolution) -> ResolveResult {
        let mut guard = self.inner.lock().await;
        guard.prune_resolved(self.retention);

        if let Some(tombstone) = guard.resolved.get(id) {
            return ResolveResult::AlreadyResolved(tombstone.state);
        }
        let Some(mut entry) = guard.pending.remove(id) else {
            return ResolveResult::NotFound;
        };

        let state = AuthorizationState::from(resolution);
        entry.request.state = state;
        entry.request.access_granted = state.grants_access();
        guard.resolved.insert(
            id.clone(),
            Tombstone {
                state,
                evicted_at: Instant::now(),
            },
        );
        // Receivers may already be gone (caller abandoned the wait).
        entry.state_tx.send_replace(state);
        ResolveResult::Applied(entry.request)
    }

    /// Remove an entry without finalizing it (failed lifecycle). Idempotent.
    pub async fn evict(&self, id: &RequestId) {
        let mut guard = self.inner.lock().await;
        guard.pending.remove(id);
        guard.prune_resolved(self.retention);
    }

    /// Number of requests still waiting for a decision.
    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn pending_ids(&self) -> Vec<RequestId> {
        self.inner.lock().await.pending.keys().cloned().collect()
    }
}

impl Default for PendingRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;

    fn fields() -> NewAuthorization {
        NewAuthorization {
            subject_username: "alice".to_string(),
            requester_name: "Dr. Smith".to_string(),
            is_emergency: false,
            primary_contact: "+15550000001".to_string(),
            secondary_contact: None,
            channel: Channel::Sms,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = PendingRequestStore::new();
        let id = RequestId::generate();
        let handle = store.create(id.clone(), &fields()).await.unwrap();
        assert_eq!(handle.request.state, AuthorizationState::Pending);
        assert_eq!(*handle.state_rx.borrow(), AuthorizationState::Pending);

        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched.subject_username, "alice");
        assert_eq!(store.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = PendingRequestStore::new();
        let id = RequestId::from("fixed");
        store.create(id.clone(), &fields()).await.unwrap();
        let err = store.create(id, &fields()).await.unwrap_err();
        assert!(matches!(err, BrokerError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn test_first_resolution_wins_and_evicts() {
        let store = PendingRequestStore::new();
        let id = RequestId::generate();
        let handle = store.create(id.clone(), &fields()).await.unwrap();

        match store.try_resolve(&id, Resolution::Confirmed).await {
            ResolveResult::Applied(request) => {
                assert_eq!(request.state, AuthorizationState::Confirmed);
                assert!(request.access_granted);
            }
            other => panic!("expected Applied, got {:?}", other),
        }
        assert_eq!(*handle.state_rx.borrow(), AuthorizationState::Confirmed);
        assert!(store.get(&id).await.is_none());

        assert_eq!(
            store.try_resolve(&id, Resolution::Denied).await,
            ResolveResult::AlreadyResolved(AuthorizationState::Confirmed)
        );
        assert_eq!(
            store.try_resolve(&id, Resolution::TimedOut).await,
            ResolveResult::AlreadyResolved(AuthorizationState::Confirmed)
        );
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let store = PendingRequestStore::new();
        assert_eq!(
            store
                .try_resolve(&RequestId::from("nope"), Resolution::Confirmed)
                .await,
            ResolveResult::NotFound
        );
    }

    #[tokio::test]
    async fn test_evict_is_idempotent_and_leaves_no_decision() {
        let store = PendingRequestStore::new();
        let id = RequestId::generate();
        store.create(id.clone(), &fields()).await.unwrap();
        store.evict(&id).await;
        store.evict(&id).await;
        assert!(store.get(&id).await.is_none());
        assert_eq!(
            store.try_resolve(&id, Resolution::Confirmed).await,
            ResolveResult::NotFound
        );
    }

    #[tokio::test]
    async fn test_tombstones_expire() {
        let store = PendingRequestStore::with_retention(Duration::from_millis(20));
        let id = RequestId::generate();
        store.create(id.clone(), &fields()).await.unwrap();
        store.try_resolve(&id, Resolution::Denied).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(
            store.try_resolve(&id, Resolution::Confirmed).await,
            ResolveResult::NotFound
        );
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_apply_once() {
        let store = PendingRequestStore::new();
        let id = RequestId::generate();
        store.create(id.clone(), &fields()).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let id = id.clone();
            let resolution = if i % 2 == 0 {
                Resolution::Confirmed
            } else {
                Resolution::Denied
            };
            tasks.push(tokio::spawn(async move {
                store.try_resolve(&id, resolution).await
            }));
        }

        let mut applied = Vec::new();
        let mut losers = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                ResolveResult::Applied(request) => applied.push(request.state),
                ResolveResult::AlreadyResolved(state) => losers.push(state),
                ResolveResult::NotFound => panic!("entry vanished"),
            }
        }
        assert_eq!(applied.len(), 1);
        assert!(losers.iter().all(|state| *state == applied[0]));
    }
}
