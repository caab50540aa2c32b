// AuthService against a mock API: sign-in stores the whole session,
// sign-out wipes it, profile updates refresh the cached identity.

#[cfg(test)]
mod tests {
    use httpmock::Method::{PATCH, POST};
    use httpmock::MockServer;
    use serde_json::json;

    use crate::client::Body;
    use crate::services::AuthService;
    use crate::session::{CredentialPair, Role, SessionEvent};
    use crate::tests::common::{build_client, drain, expirations, notices, signed_in_client};

    fn signed_in(events: &[SessionEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::SignedIn { user } => Some(user.id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn login_stores_tokens_and_identity() {
        let server = MockServer::start_async().await;
        let login = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/login/")
                    .json_body(json!({"email": "ana@example.com", "password": "s3cret"}));
                then.status(200).json_body(json!({
                    "user": {"id": 42, "email": "ana@example.com", "first_name": "Ana", "last_name": "Silva", "role": "tenant"},
                    "tokens": {"access": "A1", "refresh": "R1"}
                }));
            })
            .await;

        let mut test = build_client(&server.base_url(), None);
        let auth = AuthService::new(test.client.clone());
        let user = auth.login("ana@example.com", "s3cret").await.unwrap();

        login.assert_hits_async(1).await;
        assert_eq!(user.full_name(), "Ana Silva");
        assert!(auth.is_authenticated().await);
        assert!(auth.has_role(Role::Tenant).await);
        assert!(!auth.has_role(Role::Landlord).await);
        assert_eq!(test.client.store().credentials().await, Some(CredentialPair::new("A1", "R1")));
        assert!(test.backend.snapshot().user.is_some());

        let events = drain(&mut test.events);
        assert_eq!(signed_in(&events), vec![42]);
        assert_eq!(notices(&events), vec!["Login successful!".to_owned()]);
    }

    #[tokio::test]
    async fn failed_login_leaves_no_session() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/login/");
                then.status(400).json_body(json!({"detail": "Invalid email or password"}));
            })
            .await;

        let mut test = build_client(&server.base_url(), None);
        let auth = AuthService::new(test.client.clone());
        let err = auth.login("ana@example.com", "nope").await.unwrap_err();

        assert_eq!(err.message, "Invalid email or password");
        assert!(!auth.is_authenticated().await);
        let events = drain(&mut test.events);
        assert!(signed_in(&events).is_empty());
        assert!(expirations(&events).is_empty());
        assert_eq!(notices(&events), vec!["Invalid email or password".to_owned()]);
    }

    #[tokio::test]
    async fn logout_wipes_everything() {
        let mut test = signed_in_client("http://127.0.0.1:9", "A1", "R1").await;
        let auth = AuthService::new(test.client.clone());

        auth.logout().await;

        assert!(!auth.is_authenticated().await);
        assert!(auth.current_user().await.is_none());
        assert!(test.backend.snapshot().is_empty());
        let events = drain(&mut test.events);
        assert!(matches!(events.first(), Some(SessionEvent::SignedOut)));
        assert_eq!(notices(&events), vec!["Logout successful!".to_owned()]);
    }

    #[tokio::test]
    async fn become_host_refreshes_the_cached_identity() {
        let server = MockServer::start_async().await;
        let profile = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/users/profile/")
                    .header("authorization", "Bearer A1")
                    .json_body(json!({"role": "landlord"}));
                then.status(200).json_body(json!({
                    "id": 42, "email": "ana@example.com", "first_name": "Ana", "last_name": "Silva", "role": "landlord"
                }));
            })
            .await;

        let mut test = signed_in_client(&server.base_url(), "A1", "R1").await;
        let auth = AuthService::new(test.client.clone());
        let user = auth.become_host().await.unwrap();

        profile.assert_hits_async(1).await;
        assert!(user.is_landlord());
        assert!(auth.has_role(Role::Landlord).await);
        assert_eq!(notices(&drain(&mut test.events)), vec!["Welcome as a host!".to_owned()]);
    }

    #[tokio::test]
    async fn register_posts_multipart_without_a_session() {
        let server = MockServer::start_async().await;
        let register = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/register/");
                then.status(201).json_body(json!({"id": 77}));
            })
            .await;

        let mut test = build_client(&server.base_url(), None);
        let auth = AuthService::new(test.client.clone());
        let form = Body::Multipart(vec![
            crate::client::FormPart::text("email", "landlord@example.com"),
            crate::client::FormPart::text("role", "landlord"),
        ]);
        let created = auth.register(form).await.unwrap();

        register.assert_hits_async(1).await;
        assert_eq!(created["id"], 77);
        assert!(!auth.is_authenticated().await, "registration does not sign in");
        assert_eq!(
            notices(&drain(&mut test.events)),
            vec!["Registration successful! Please log in.".to_owned()]
        );
    }

    #[tokio::test]
    async fn local_user_update_merges_into_the_snapshot() {
        let test = signed_in_client("http://127.0.0.1:9", "A1", "R1").await;
        let auth = AuthService::new(test.client.clone());

        let merged = auth
            .update_user(&json!({"phone": "+351 900 000 000", "avatar": "/media/ana.png"}))
            .await
            .unwrap()
            .expect("signed in");

        assert_eq!(merged.phone.as_deref(), Some("+351 900 000 000"));
        assert_eq!(merged.extra["avatar"], "/media/ana.png");
        assert_eq!(auth.current_user().await, Some(merged));

        auth.logout().await;
        assert!(auth.update_user(&json!({"phone": "x"})).await.unwrap().is_none());
    }
}
