//! Transparent access-token renewal.
//!
//! A request answered with 401 walks `IDLE -> AWAITING_RENEWAL -> REPLAYING`
//! or `-> FAILED`:
//!
//! * the refresh token is exchanged for a new access token at the renewal
//!   endpoint (no network call when there is no refresh token),
//! * the request is replayed once with the new token, its outcome returned
//!   as is,
//! * any renewal failure, or a 401 on the replay, wipes the session and emits
//!   [`SessionEvent::SessionExpired`](crate::session::events::SessionEvent).
//!
//! Renewals are single-flight: callers that hit 401 while a renewal is running
//! await the same future, so a rotating refresh token is spent only once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::dispatcher::{join_url, Dispatch};
use crate::client::error::{ApiError, MSG_SESSION_EXPIRED};
use crate::client::request::RequestDescriptor;
use crate::client::response::{decode_body, ApiResponse};
use crate::config::settings::ApiConfig;
use crate::observability::metrics::get_metrics;
use crate::session::events::SessionEvents;
use crate::session::store::CredentialStore;

static SUCCESS_MSG: &str = "success";
static ERROR_MSG: &str = "error";

type RenewalFlight = Shared<BoxFuture<'static, Result<String, ApiError>>>;

#[derive(Serialize)]
struct RenewalRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RenewalResponse {
    access: String,
}

/// What a renewal flight needs; cloned into each flight so the flight can
/// outlive the caller that started it.
#[derive(Clone)]
struct FlightContext {
    http: Client,
    endpoint: String,
    login_path: String,
    store: CredentialStore,
    events: SessionEvents,
}

pub struct RenewalCoordinator {
    ctx: FlightContext,
    in_flight: Mutex<Option<(u64, RenewalFlight)>>,
    flights: AtomicU64,
}

impl RenewalCoordinator {
    pub fn new(http: Client, api: &ApiConfig, store: CredentialStore, events: SessionEvents) -> Self {
        Self {
            ctx: FlightContext {
                http,
                endpoint: join_url(api.base_url.trim_end_matches('/'), &api.renewal_path),
                login_path: api.login_path.clone(),
                store,
                events,
            },
            in_flight: Mutex::new(None),
            flights: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.ctx.store
    }

    /// Exchange the refresh token for a new access token, joining a renewal
    /// that is already running if there is one. On failure the session has
    /// already been wiped when this returns.
    pub async fn renew(&self) -> Result<String, ApiError> {
        let seen = self.ctx.store.generation().await;
        self.renew_after(seen).await
    }

    /// Renewal on behalf of a request rejected while carrying the credentials
    /// of generation `seen`. If those were replaced before the flight guard is
    /// taken, nothing is sent: the current token is returned, or a
    /// session-expired error when the session is gone.
    pub(crate) async fn renew_after(&self, seen: u64) -> Result<String, ApiError> {
        let (id, flight) = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                // a finished flight left behind by a cancelled caller is not joined
                Some((id, flight)) if flight.peek().is_none() => {
                    debug!("joining renewal flight {}", id);
                    (*id, flight.clone())
                }
                _ => {
                    let (access, generation) = self.ctx.store.access_snapshot().await;
                    if generation != seen {
                        debug!("credentials changed since generation {}, not renewing", seen);
                        return access.ok_or_else(|| ApiError::missing_refresh_token().into_session_expired());
                    }
                    let id = self.flights.fetch_add(1, Ordering::Relaxed);
                    let flight = run_flight(self.ctx.clone(), seen).boxed().shared();
                    *slot = Some((id, flight.clone()));
                    debug!("starting renewal flight {}", id);
                    (id, flight)
                }
            }
        };

        let outcome = flight.await;

        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
        }
        outcome
    }

    /// Terminal failure for the session of `generation`: wipe it and tell the
    /// shell, unless another caller already did.
    pub(crate) async fn expire_session(&self, generation: u64, err: ApiError) -> ApiError {
        expire(&self.ctx, generation, err).await
    }
}

async fn run_flight(ctx: FlightContext, generation: u64) -> Result<String, ApiError> {
    let metrics = get_metrics().await;
    match exchange(&ctx).await {
        Ok(access) => {
            metrics.token_renewals.with_label_values(&[SUCCESS_MSG]).inc();
            info!("access token renewed");
            Ok(access)
        }
        Err(err) => {
            metrics.token_renewals.with_label_values(&[ERROR_MSG]).inc();
            warn!("access token renewal failed: {} ({:?})", err, err.detail);
            Err(expire(&ctx, generation, err).await)
        }
    }
}

async fn exchange(ctx: &FlightContext) -> Result<String, ApiError> {
    let refresh = ctx
        .store
        .refresh_token()
        .await
        .ok_or_else(ApiError::missing_refresh_token)?;

    let response = ctx
        .http
        .post(&ctx.endpoint)
        .json(&RenewalRequest { refresh: &refresh })
        .send()
        .await
        .map_err(|err| ApiError::from_transport(&err))?;
    let status = response.status();
    let bytes = response.bytes().await.map_err(|err| ApiError::from_transport(&err))?;
    let body = decode_body(&bytes);
    if !status.is_success() {
        return Err(ApiError::from_status(status, body));
    }

    let renewed: RenewalResponse = serde_json::from_value(body).map_err(ApiError::decode)?;
    match ctx.store.set_access(renewed.access.clone()).await {
        Ok(true) => {}
        // logged out while we were waiting on the server
        Ok(false) => return Err(ApiError::missing_refresh_token()),
        Err(err) => warn!("renewed access token kept in memory only: {}", err),
    }
    Ok(renewed.access)
}

async fn expire(ctx: &FlightContext, generation: u64, err: ApiError) -> ApiError {
    match ctx.store.clear_if_generation(generation).await {
        Ok(true) => {}
        Ok(false) => {
            debug!("session of generation {} already replaced, nothing to expire", generation);
            return err.into_session_expired();
        }
        Err(store_err) => warn!("session cleared in memory but not in storage: {}", store_err),
    }
    get_metrics().await.session_expirations.inc();
    warn!("session expired, redirecting to {}", ctx.login_path);
    ctx.events.error(MSG_SESSION_EXPIRED);
    ctx.events.session_expired(&ctx.login_path);
    err.into_session_expired()
}

/// Layer that turns a 401 into renew-and-replay.
pub struct Renewing<D> {
    inner: D,
    coordinator: Arc<RenewalCoordinator>,
}

impl<D: Dispatch> Renewing<D> {
    pub fn new(inner: D, coordinator: Arc<RenewalCoordinator>) -> Self {
        Self { inner, coordinator }
    }
}

impl<D: Dispatch> Dispatch for Renewing<D> {
    async fn dispatch(&self, request: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let before = self.coordinator.store().generation().await;

        let err = match self.inner.dispatch(request).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        if !err.is_unauthorized() || !request.renewal_enabled() {
            return Err(err);
        }
        if request.is_retried() {
            return Err(self.terminal(err).await);
        }

        // no bearer attached: renew for whatever the store held at send time
        self.coordinator.renew_after(err.generation.unwrap_or(before)).await?;

        match self.inner.dispatch(&request.replay()).await {
            Err(err) if err.is_unauthorized() => Err(self.terminal(err).await),
            outcome => outcome,
        }
    }
}

impl<D: Dispatch> Renewing<D> {
    /// A 401 that renewal cannot fix. Sent without a bearer means the session
    /// was already wiped and announced by someone else.
    async fn terminal(&self, err: ApiError) -> ApiError {
        match err.generation {
            Some(generation) => self.coordinator.expire_session(generation, err).await,
            None => err.into_session_expired(),
        }
    }
}

/// Outermost layer: every failure becomes exactly one user notice. Session
/// expiry already announced itself, so it is skipped here.
pub struct Notifying<D> {
    inner: D,
    events: SessionEvents,
}

impl<D: Dispatch> Notifying<D> {
    pub fn new(inner: D, events: SessionEvents) -> Self {
        Self { inner, events }
    }
}

impl<D: Dispatch> Dispatch for Notifying<D> {
    async fn dispatch(&self, request: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        self.inner.dispatch(request).await.inspect_err(|err| {
            if !err.is_session_expired() {
                self.events.error(err.message.clone());
            }
        })
    }
}
