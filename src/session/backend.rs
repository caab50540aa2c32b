//! Durable key-value persistence for the session.
//!
//! A session is three named string slots: access token, refresh token and the
//! serialized identity snapshot. Backends persist all three in one write so a
//! crash can never leave half a session on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::utils::constants::{SLOT_ACCESS_TOKEN, SLOT_REFRESH_TOKEN, SLOT_USER};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is corrupt: {0}")]
    Corrupt(serde_json::Error),
    #[error("identity snapshot could not be encoded: {0}")]
    Identity(serde_json::Error),
}

/// The three persisted slots. Key names match the ones the web front end
/// keeps in browser storage so a session file is interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSlots {
    #[serde(rename = "accessToken", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl PersistedSlots {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }

    pub fn slot(&self, name: &str) -> Option<&str> {
        match name {
            SLOT_ACCESS_TOKEN => self.access_token.as_deref(),
            SLOT_REFRESH_TOKEN => self.refresh_token.as_deref(),
            SLOT_USER => self.user.as_deref(),
            _ => None,
        }
    }
}

pub trait SessionBackend: Send + Sync {
    /// Blocking read, done once at startup before requests are served.
    fn load(&self) -> Result<PersistedSlots, StoreError>;

    /// Blocking removal of whatever is persisted, for startup cleanup.
    fn reset(&self) -> Result<(), StoreError>;

    /// Replace every slot at once; an empty `slots` removes the session.
    fn save<'a>(&'a self, slots: &'a PersistedSlots) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// JSON document on disk, replaced atomically (tmp file + rename).
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, slots: &PersistedSlots) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec_pretty(slots).map_err(StoreError::Corrupt)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        fs::rename(&tmp, &self.path).await?;
        debug!("session written to {}", self.path.display());
        Ok(())
    }

    async fn remove(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path).await {
            Ok(_) => {
                info!("removed session file {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl SessionBackend for FileBackend {
    fn load(&self) -> Result<PersistedSlots, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(PersistedSlots::default()),
            Ok(raw) => serde_json::from_str(&raw).map_err(StoreError::Corrupt),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no session file at {}", self.path.display());
                Ok(PersistedSlots::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn reset(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(_) => {
                info!("removed session file {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn save<'a>(&'a self, slots: &'a PersistedSlots) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            if slots.is_empty() {
                self.remove().await
            } else {
                self.write(slots).await
            }
        }
        .boxed()
    }
}

/// Process-local backend for tests and embedders that persist elsewhere.
/// Clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<PersistedSlots>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slots(slots: PersistedSlots) -> Self {
        Self { inner: Arc::new(Mutex::new(slots)) }
    }

    pub fn snapshot(&self) -> PersistedSlots {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> Result<PersistedSlots, StoreError> {
        Ok(self.snapshot())
    }

    fn reset(&self) -> Result<(), StoreError> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = PersistedSlots::default();
        Ok(())
    }

    fn save<'a>(&'a self, slots: &'a PersistedSlots) -> BoxFuture<'a, Result<(), StoreError>> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = slots.clone();
        future::ready(Ok(())).boxed()
    }
}
