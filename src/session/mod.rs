//! Session state: credentials, identity snapshot, persistence and the
//! event stream the application shell listens to.

pub mod backend;
pub mod credentials;
pub mod events;
pub mod identity;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, PersistedSlots, SessionBackend, StoreError};
pub use credentials::CredentialPair;
pub use events::{Notice, NoticeLevel, SessionEvent, SessionEvents};
pub use identity::{Role, UserProfile};
pub use store::CredentialStore;
