mod common;

use common::{fixture, RecordingSender, PRIMARY};
use medauth_core::blob::InMemoryBlobStore;
use medauth_core::client::MedauthClient;
use medauth_core::gateway::{AccessGateway, AuthorizationCall};
use medauth_core::ledger::{InMemoryLedger, Ledger};
use medauth_core::models::{AuthorizationState, Channel, Decision, OutcomeStatus, TieBreakPolicy};
use medauth_core::server::create_api_routes;
use std::sync::Arc;
use std::time::Duration;

async fn serve() -> (String, Arc<RecordingSender>) {
    let fx = fixture(RecordingSender::new(), TieBreakPolicy::PrimaryPriority);
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.register_user("alice", "secret").await.unwrap();
    let gateway = AccessGateway::new(fx.broker.clone(), ledger, Arc::new(InMemoryBlobStore::new()));

    let (addr, server) =
        warp::serve(create_api_routes(Arc::new(gateway))).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (format!("http://{}", addr), fx.sender)
}

fn call(timeout_seconds: u64) -> AuthorizationCall {
    AuthorizationCall {
        subject_username: "alice".to_string(),
        requester_name: "Dr. Smith".to_string(),
        is_emergency: false,
        primary_contact: PRIMARY.to_string(),
        secondary_contact: None,
        channel: Channel::Sms,
        timeout_seconds: Some(timeout_seconds),
    }
}

#[tokio::test]
async fn test_client_request_and_resolve() {
    let (base_url, sender) = serve().await;
    let client = Arc::new(MedauthClient::new(base_url));

    let waiting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.request_authorization(&call(5)).await })
    };
    let id = loop {
        if let Some(id) = sender.last_request_id() {
            break id;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    let pending = client.status(&id).await.unwrap();
    assert_eq!(pending.state, AuthorizationState::Pending);
    assert_eq!(client.health().await.unwrap().pending_authorizations, 1);

    let report = client.resolve(&id, Decision::Confirm).await.unwrap();
    assert_eq!(report.state, AuthorizationState::Confirmed);

    let outcome = waiting.await.unwrap().unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Confirmed);
    assert!(client.status(&id).await.is_err());
}

#[tokio::test]
async fn test_client_reports_timeout_as_outcome() {
    let (base_url, _) = serve().await;
    let client = MedauthClient::new(base_url);
    let outcome = client.request_authorization(&call(1)).await.unwrap();
    assert!(outcome.is_timeout());
}
