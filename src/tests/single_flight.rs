// Concurrent 401s must share one renewal:
//  - protected endpoint accepts only the renewed token, or nothing at all
//  - renewal endpoint is slow so every caller hits 401 before it completes

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use futures::future::join_all;
    use serde_json::{json, Value};
    use tokio::time::sleep;

    use crate::client::ErrorKind;
    use crate::tests::common::{drain, expirations, notices, signed_in_client, spawn_axum};

    const CALLERS: usize = 8;

    #[derive(Clone, Default)]
    struct Counters {
        renewals: Arc<AtomicUsize>,
        protected: Arc<AtomicUsize>,
    }

    fn router(counters: Counters, renewal_succeeds: bool, renewed_accepted: bool) -> Router {
        Router::new()
            .route(
                "/properties/",
                get(move |State(c): State<Counters>, headers: HeaderMap| async move {
                    c.protected.fetch_add(1, Ordering::SeqCst);
                    let bearer = headers.get("authorization").and_then(|v| v.to_str().ok());
                    if renewed_accepted && bearer == Some("Bearer A2") {
                        (StatusCode::OK, Json(json!([{"id": 3, "title": "Loft"}])))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({"detail": "token expired"})))
                    }
                }),
            )
            .route(
                "/auth/token/refresh/",
                post(move |State(c): State<Counters>, Json(_): Json<Value>| async move {
                    c.renewals.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(150)).await;
                    if renewal_succeeds {
                        (StatusCode::OK, Json(json!({"access": "A2"})))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Token is blacklisted"})))
                    }
                }),
            )
            .with_state(counters)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_unauthorized_requests_share_one_renewal() {
        let counters = Counters::default();
        let (handle, addr) = spawn_axum(router(counters.clone(), true, true)).await;

        let mut test = signed_in_client(&format!("http://{}", addr), "A1", "R1").await;
        let client = test.client.clone();
        let results = join_all((0..CALLERS).map(|_| {
            let client = client.clone();
            async move { client.get::<Value>("/properties/").await }
        }))
        .await;

        for result in results {
            assert_eq!(result.expect("every caller succeeds"), json!([{"id": 3, "title": "Loft"}]));
        }
        assert_eq!(counters.renewals.load(Ordering::SeqCst), 1, "exactly one renewal call");
        assert_eq!(counters.protected.load(Ordering::SeqCst), CALLERS * 2, "one original + one replay each");
        assert_eq!(test.client.store().access_token().await.as_deref(), Some("A2"));
        assert!(drain(&mut test.events).is_empty());

        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failed_renewal_expires_the_session_once() {
        let counters = Counters::default();
        let (handle, addr) = spawn_axum(router(counters.clone(), false, true)).await;

        let mut test = signed_in_client(&format!("http://{}", addr), "A1", "R1").await;
        let client = test.client.clone();
        let results = join_all((0..CALLERS).map(|_| {
            let client = client.clone();
            async move { client.get::<Value>("/properties/").await }
        }))
        .await;

        for result in results {
            let err = result.unwrap_err();
            assert!(err.is_session_expired());
            assert_eq!(err.kind, ErrorKind::Unauthorized);
        }
        assert_eq!(counters.renewals.load(Ordering::SeqCst), 1);
        assert!(!test.client.store().is_authenticated().await);

        let events = drain(&mut test.events);
        assert_eq!(expirations(&events).len(), 1, "navigation requested once");
        assert_eq!(notices(&events).len(), 1);

        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rejected_replays_expire_the_session_once() {
        let counters = Counters::default();
        let (handle, addr) = spawn_axum(router(counters.clone(), true, false)).await;

        let mut test = signed_in_client(&format!("http://{}", addr), "A1", "R1").await;
        let client = test.client.clone();
        let results = join_all((0..CALLERS).map(|_| {
            let client = client.clone();
            async move { client.get::<Value>("/properties/").await }
        }))
        .await;

        for result in results {
            let err = result.unwrap_err();
            assert!(err.is_session_expired());
            assert_eq!(err.kind, ErrorKind::Unauthorized);
        }
        assert_eq!(counters.renewals.load(Ordering::SeqCst), 1);
        assert_eq!(counters.protected.load(Ordering::SeqCst), CALLERS * 2, "every caller replayed once");
        assert!(!test.client.store().is_authenticated().await);
        assert!(test.backend.snapshot().is_empty());

        let events = drain(&mut test.events);
        assert_eq!(expirations(&events), vec!["/login".to_owned()], "navigation requested once");
        assert_eq!(notices(&events).len(), 1);

        handle.abort();
    }
}
