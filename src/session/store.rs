use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::session::backend::{MemoryBackend, PersistedSlots, SessionBackend, StoreError};
use crate::session::credentials::CredentialPair;
use crate::session::identity::UserProfile;

#[derive(Clone, Default)]
struct SessionState {
    access: Option<String>,
    refresh: Option<String>,
    user: Option<UserProfile>,
    /// bumped whenever the credentials change, identity edits excluded
    generation: u64,
}

impl SessionState {
    fn to_slots(&self) -> Result<PersistedSlots, StoreError> {
        let user = self
            .user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::Identity)?;
        Ok(PersistedSlots {
            access_token: self.access.clone(),
            refresh_token: self.refresh.clone(),
            user,
        })
    }
}

/// Session credentials shared by every component of one client.
///
/// Reads are served from memory; every mutation is written through to the
/// backend while the write lock is held, so observers see either the old or
/// the new session and never a mix. When the backend write fails the memory
/// state is still updated and the error is returned to the caller.
///
/// Every credential change bumps a generation counter. A request remembers
/// the generation its bearer belonged to, which tells a late 401 apart from
/// one that still concerns the current credentials.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<RwLock<SessionState>>,
    backend: Arc<dyn SessionBackend>,
}

impl CredentialStore {
    /// Restore the session persisted by `backend`. Runs synchronously so it
    /// can be called before the runtime serves the first request.
    pub fn open(backend: impl SessionBackend + 'static) -> Result<Self, StoreError> {
        let slots = backend.load()?;
        let mut state = SessionState {
            access: slots.access_token,
            refresh: slots.refresh_token,
            user: None,
            generation: 0,
        };

        if state.access.is_some() != state.refresh.is_some() {
            warn!("discarding partially persisted session");
            backend.reset()?;
            state = SessionState::default();
        } else if state.access.is_some() {
            state.user = slots.user.as_deref().and_then(|raw| {
                serde_json::from_str(raw)
                    .inspect_err(|err| warn!("ignoring unreadable identity snapshot: {}", err))
                    .ok()
            });
            info!("session restored, user cached: {}", state.user.is_some());
        }

        Ok(Self {
            inner: Arc::new(RwLock::new(state)),
            backend: Arc::new(backend),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState::default())),
            backend: Arc::new(MemoryBackend::new()),
        }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.access.clone()
    }

    /// The access token together with the generation it belongs to, read
    /// under one lock.
    pub async fn access_snapshot(&self) -> (Option<String>, u64) {
        let state = self.inner.read().await;
        (state.access.clone(), state.generation)
    }

    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.inner.read().await.refresh.clone()
    }

    pub async fn credentials(&self) -> Option<CredentialPair> {
        let state = self.inner.read().await;
        match (&state.access, &state.refresh) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            _ => None,
        }
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.inner.read().await.user.clone()
    }

    /// Presence check only: an expired access token still counts until the
    /// server rejects it.
    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.access.is_some()
    }

    /// Store a complete session.
    pub async fn set(&self, pair: CredentialPair, user: Option<UserProfile>) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        *state = SessionState {
            access: Some(pair.access),
            refresh: Some(pair.refresh),
            user,
            generation: state.generation + 1,
        };
        debug!("session credentials replaced");
        self.persist(&state).await
    }

    /// Replace the access token after a renewal. Returns `false` without
    /// writing anything when the session no longer holds a refresh token,
    /// i.e. it was cleared while the renewal was in flight.
    pub async fn set_access(&self, access: String) -> Result<bool, StoreError> {
        let mut state = self.inner.write().await;
        if state.refresh.is_none() {
            return Ok(false);
        }
        state.access = Some(access);
        state.generation += 1;
        debug!("access token renewed");
        self.persist(&state).await.map(|_| true)
    }

    pub async fn set_user(&self, user: UserProfile) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state.user = Some(user);
        self.persist(&state).await
    }

    /// Drop access, refresh and identity together. Returns whether there was
    /// anything to drop.
    pub async fn clear(&self) -> Result<bool, StoreError> {
        let mut state = self.inner.write().await;
        let had_session = state.access.is_some() || state.refresh.is_some() || state.user.is_some();
        *state = SessionState {
            generation: state.generation + 1,
            ..SessionState::default()
        };
        debug!("session cleared");
        self.persist(&state).await.map(|_| had_session)
    }

    /// Clear only if the credentials are still those of `generation`.
    /// Returns `false`, touching nothing, when they changed in between, e.g.
    /// another caller already cleared them. An error means the session was
    /// cleared in memory but not in storage.
    pub async fn clear_if_generation(&self, generation: u64) -> Result<bool, StoreError> {
        let mut state = self.inner.write().await;
        if state.generation != generation {
            return Ok(false);
        }
        *state = SessionState {
            generation: generation + 1,
            ..SessionState::default()
        };
        debug!("session cleared at generation {}", generation);
        self.persist(&state).await.map(|_| true)
    }

    async fn persist(&self, state: &SessionState) -> Result<(), StoreError> {
        let slots = state.to_slots()?;
        self.backend.save(&slots).await
    }
}
