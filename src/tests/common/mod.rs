// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::broadcast::Receiver;

use crate::client::ApiClient;
use crate::config::settings::ApiConfig;
use crate::session::{CredentialPair, CredentialStore, MemoryBackend, SessionEvent, SessionEvents, UserProfile};

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub struct TestClient {
    pub client: ApiClient,
    pub backend: MemoryBackend,
    pub events: Receiver<SessionEvent>,
}

/// Client against `base_url` backed by an in-memory session.
/// The event receiver is subscribed before any request is sent.
pub fn build_client(base_url: &str, timeout: Option<Duration>) -> TestClient {
    let mut api = ApiConfig::new(base_url);
    if let Some(timeout) = timeout {
        api.timeout_ms = timeout.as_millis() as u64;
    }
    let backend = MemoryBackend::new();
    let store = CredentialStore::open(backend.clone()).expect("memory backend");
    let events = SessionEvents::new();
    let receiver = events.subscribe();
    let client = ApiClient::new(&api, store, events).expect("api client");
    TestClient { client, backend, events: receiver }
}

pub async fn signed_in_client(base_url: &str, access: &str, refresh: &str) -> TestClient {
    let test_client = build_client(base_url, None);
    test_client
        .client
        .store()
        .set(CredentialPair::new(access, refresh), Some(tenant()))
        .await
        .expect("store session");
    test_client
}

pub fn tenant() -> UserProfile {
    serde_json::from_value(json!({
        "id": 42,
        "email": "ana@example.com",
        "first_name": "Ana",
        "last_name": "Silva",
        "role": "tenant"
    }))
    .unwrap()
}

/// Everything emitted so far.
pub fn drain(events: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn expirations(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::SessionExpired { redirect_to, .. } => Some(redirect_to.clone()),
            _ => None,
        })
        .collect()
}

pub fn notices(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Notice(notice) => Some(notice.message.clone()),
            _ => None,
        })
        .collect()
}
