#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{HeaderMap, HeaderName};
    use axum::routing::post;
    use axum::{Json, Router};
    use httpmock::Method::{DELETE, GET, POST};
    use httpmock::MockServer;
    use serde_json::{json, Value};

    use crate::client::error::{MSG_FORBIDDEN, MSG_NOT_FOUND, MSG_NO_RESPONSE, MSG_SERVER_ERROR, MSG_TIMEOUT};
    use crate::client::{ErrorKind, FormPart, RequestDescriptor};
    use crate::tests::common::{build_client, drain, expirations, notices, signed_in_client, spawn_axum};

    #[tokio::test]
    async fn bearer_and_query_reach_the_server() {
        let server = MockServer::start_async().await;
        let listing = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/properties/")
                    .query_param("city", "Lisbon")
                    .query_param("page", "2")
                    .header("authorization", "Bearer A1");
                then.status(200).json_body(json!({"count": 1, "results": [{"id": 9}]}));
            })
            .await;

        let test = signed_in_client(&server.base_url(), "A1", "R1").await;
        let request = RequestDescriptor::get("/properties/").query("city", "Lisbon").query("page", "2");
        let page: Value = test.client.fetch(request).await.unwrap();

        assert_eq!(page["count"], json!(1));
        listing.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn multipart_upload_gets_a_boundary_from_the_transport() {
        let router = Router::new().route(
            "/auth/register/",
            post(|headers: HeaderMap| async move {
                let header = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
                Json(json!({
                    "content_type": header(CONTENT_TYPE),
                    "authorization": header(AUTHORIZATION),
                }))
            }),
        );
        let (handle, addr) = spawn_axum(router).await;

        let test = signed_in_client(&format!("http://{}", addr), "A1", "R1").await;
        let request = RequestDescriptor::post("/auth/register/").multipart(vec![
            FormPart::text("email", "host@example.com"),
            FormPart::file("avatar", "avatar.png", vec![0x89, 0x50, 0x4e, 0x47]).with_mime("image/png"),
        ]);
        let echoed: Value = test.client.fetch(request).await.unwrap();

        let content_type = echoed["content_type"].as_str().expect("content type sent");
        assert!(content_type.starts_with("multipart/form-data; boundary="), "{content_type}");
        assert_eq!(echoed["authorization"], json!("Bearer A1"));

        handle.abort();
    }

    #[tokio::test]
    async fn http_failures_are_classified_and_announced_once() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bookings/");
                then.status(400).json_body(json!({"check_out": ["Must be after check-in."]}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/admin/bookings/");
                then.status(403).json_body(json!({"detail": "Not allowed"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/bookings/77/");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/analytics/");
                then.status(500).body("<h1>Server Error</h1>");
            })
            .await;

        let mut test = signed_in_client(&server.base_url(), "A1", "R1").await;

        let err = test
            .client
            .send(RequestDescriptor::post("/bookings/").json(json!({"property": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.field_errors().unwrap()["check_out"], json!(["Must be after check-in."]));

        let err = test.client.get::<Value>("/admin/bookings/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);

        let err = test.client.delete("/bookings/77/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = test.client.get::<Value>("/analytics/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServerError);
        assert_eq!(err.payload, Some(json!("<h1>Server Error</h1>")));

        let events = drain(&mut test.events);
        assert_eq!(
            notices(&events),
            vec!["Invalid request".to_owned(), MSG_FORBIDDEN.to_owned(), MSG_NOT_FOUND.to_owned(), MSG_SERVER_ERROR.to_owned()]
        );
        assert!(expirations(&events).is_empty());
        assert!(test.client.store().is_authenticated().await, "non-auth failures keep the session");
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start_async().await;
        let slow = server
            .mock_async(|when, then| {
                when.method(GET).path("/bookings/");
                then.status(200).delay(Duration::from_secs(2)).json_body(json!([]));
            })
            .await;

        let mut test = build_client(&server.base_url(), Some(Duration::from_millis(200)));
        let err = test.client.get::<Value>("/bookings/").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.message, MSG_TIMEOUT);
        slow.assert_hits_async(1).await;
        assert_eq!(notices(&drain(&mut test.events)), vec![MSG_TIMEOUT.to_owned()]);
    }

    #[tokio::test]
    async fn refused_connection_is_network_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut test = signed_in_client(&format!("http://{}", addr), "A1", "R1").await;
        let err = test.client.get::<Value>("/bookings/").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::NetworkUnreachable);
        assert!(err.status.is_none());
        assert!(err.detail.is_some());
        assert_eq!(notices(&drain(&mut test.events)), vec![MSG_NO_RESPONSE.to_owned()]);
        assert!(test.client.store().is_authenticated().await);
    }

    #[tokio::test]
    async fn wrong_shaped_success_body_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users/profile/");
                then.status(200).json_body(json!({"unexpected": true}));
            })
            .await;

        let mut test = signed_in_client(&server.base_url(), "A1", "R1").await;
        let err = test
            .client
            .get::<crate::session::UserProfile>("/users/profile/")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(notices(&drain(&mut test.events)).len(), 1);
    }
}
