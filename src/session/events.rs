use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::debug;

use crate::session::identity::UserProfile;
use crate::utils::channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-facing message; the shell decides how to present it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Notice(Notice),
    SignedIn { user: Box<UserProfile> },
    SignedOut,
    /// Credentials are gone; the shell should navigate to `redirect_to`.
    SessionExpired { redirect_to: String, at: DateTime<Utc> },
}

/// Broadcast side of the session event stream. Cheap to clone; every
/// component of one client shares the same channel.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        Self { sender: channel::run() }
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        // nobody listening is fine
        let _ = self
            .sender
            .send(event)
            .inspect_err(|err| debug!("session event dropped: {}", err));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Notice(Notice { level: NoticeLevel::Success, message: message.into() }));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Notice(Notice { level: NoticeLevel::Error, message: message.into() }));
    }

    pub fn session_expired(&self, redirect_to: &str) {
        self.emit(SessionEvent::SessionExpired { redirect_to: redirect_to.to_owned(), at: Utc::now() });
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
