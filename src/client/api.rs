use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::dispatcher::{Dispatch, Dispatcher};
use crate::client::error::ApiError;
use crate::client::renewal::{Notifying, RenewalCoordinator, Renewing};
use crate::client::request::RequestDescriptor;
use crate::client::response::ApiResponse;
use crate::config::settings::ApiConfig;
use crate::session::events::SessionEvents;
use crate::session::store::CredentialStore;

type Chain = Notifying<Renewing<Dispatcher>>;

/// Entry point for every API call made by the application.
///
/// Composition, outermost first: notification, renew-and-replay, bearer
/// dispatch. Clones share the chain, the store and the event stream.
#[derive(Clone)]
pub struct ApiClient {
    chain: Arc<Chain>,
    coordinator: Arc<RenewalCoordinator>,
    store: CredentialStore,
    events: SessionEvents,
}

impl ApiClient {
    pub fn new(api: &ApiConfig, store: CredentialStore, events: SessionEvents) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(api.timeout())
            .build()
            .map_err(|err| ApiError::from_transport(&err))?;

        let coordinator = Arc::new(RenewalCoordinator::new(
            http.clone(),
            api,
            store.clone(),
            events.clone(),
        ));
        let dispatcher = Dispatcher::new(http, &api.base_url, store.clone());
        let chain = Notifying::new(Renewing::new(dispatcher, coordinator.clone()), events.clone());

        Ok(Self {
            chain: Arc::new(chain),
            coordinator,
            store,
            events,
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub async fn send(&self, request: RequestDescriptor) -> Result<ApiResponse, ApiError> {
        self.chain.dispatch(&request).await
    }

    /// Send and decode the body into `T`.
    pub async fn fetch<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T, ApiError> {
        self.send(request)
            .await?
            .json()
            .inspect_err(|err| self.events.error(err.message.clone()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch(RequestDescriptor::get(path)).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.fetch(RequestDescriptor::post(path).json(body)).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.fetch(RequestDescriptor::put(path).json(body)).await
    }

    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.fetch(RequestDescriptor::patch(path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(RequestDescriptor::delete(path)).await.map(|_| ())
    }

    /// Renew the access token now, sharing any renewal already in flight.
    pub async fn renew(&self) -> Result<String, ApiError> {
        self.coordinator.renew().await
    }
}
