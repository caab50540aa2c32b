use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::api::ApiClient;
use crate::client::error::ApiError;
use crate::client::request::{Body, RequestDescriptor};
use crate::session::backend::StoreError;
use crate::session::credentials::CredentialPair;
use crate::session::events::SessionEvent;
use crate::session::identity::{Role, UserProfile};
use crate::utils::constants::{
    PATH_CHANGE_PASSWORD, PATH_LOGIN, PATH_PASSWORD_RESET, PATH_PASSWORD_RESET_CONFIRM,
    PATH_PROFILE, PATH_REGISTER,
};

#[derive(Deserialize)]
struct LoginResponse {
    user: UserProfile,
    tokens: CredentialPair,
}

/// Sign-in, sign-out and profile operations on top of [`ApiClient`].
///
/// Failures are already announced by the client; this service only adds the
/// success notices.
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let request = RequestDescriptor::post(PATH_LOGIN)
            .json(json!({ "email": email, "password": password }))
            .without_renewal();
        let LoginResponse { user, tokens } = self.api.fetch(request).await?;

        if let Err(err) = self.api.store().set(tokens, Some(user.clone())).await {
            warn!("signed in, but the session was not persisted: {}", err);
        }
        info!("signed in as user {}", user.id);
        self.api.events().emit(SessionEvent::SignedIn { user: Box::new(user.clone()) });
        self.api.events().success("Login successful!");
        Ok(user)
    }

    /// `form` is JSON, or multipart when an avatar or documents are uploaded.
    pub async fn register(&self, form: Body) -> Result<Value, ApiError> {
        let request = RequestDescriptor::post(PATH_REGISTER).body(form).without_renewal();
        let created = self.api.send(request).await?.into_body();
        self.api.events().success("Registration successful! Please log in.");
        Ok(created)
    }

    pub async fn logout(&self) {
        match self.api.store().clear().await {
            Ok(_) => info!("signed out"),
            Err(err) => warn!("signed out, but stored session could not be removed: {}", err),
        }
        self.api.events().emit(SessionEvent::SignedOut);
        self.api.events().success("Logout successful!");
    }

    pub async fn current_user(&self) -> Option<UserProfile> {
        self.api.store().user().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.api.store().is_authenticated().await
    }

    pub async fn has_role(&self, role: Role) -> bool {
        self.current_user().await.is_some_and(|user| user.has_role(role))
    }

    /// Renew the access token on demand.
    pub async fn refresh_token(&self) -> Result<String, ApiError> {
        self.api.renew().await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<Value, ApiError> {
        let request = RequestDescriptor::post(PATH_PASSWORD_RESET)
            .json(json!({ "email": email }))
            .without_renewal();
        Ok(self.api.send(request).await?.into_body())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<Value, ApiError> {
        let request = RequestDescriptor::post(PATH_PASSWORD_RESET_CONFIRM)
            .json(json!({ "token": token, "password": new_password }))
            .without_renewal();
        Ok(self.api.send(request).await?.into_body())
    }

    pub async fn update_profile(&self, patch: Value) -> Result<UserProfile, ApiError> {
        let user: UserProfile = self.api.patch(PATH_PROFILE, patch).await?;
        if let Err(err) = self.api.store().set_user(user.clone()).await {
            warn!("profile updated, but the snapshot was not persisted: {}", err);
        }
        Ok(user)
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<Value, ApiError> {
        let body = json!({ "old_password": old_password, "new_password": new_password });
        Ok(self.api.send(RequestDescriptor::post(PATH_CHANGE_PASSWORD).json(body)).await?.into_body())
    }

    pub async fn become_host(&self) -> Result<UserProfile, ApiError> {
        let user = self.update_profile(json!({ "role": "landlord" })).await?;
        self.api.events().success("Welcome as a host!");
        Ok(user)
    }

    /// Merge `patch` into the cached snapshot without calling the server.
    /// Returns `None` when nobody is signed in.
    pub async fn update_user(&self, patch: &Value) -> Result<Option<UserProfile>, StoreError> {
        let Some(current) = self.current_user().await else {
            return Ok(None);
        };
        let merged = current.merged(patch).map_err(StoreError::Identity)?;
        self.api.store().set_user(merged.clone()).await?;
        Ok(Some(merged))
    }
}
