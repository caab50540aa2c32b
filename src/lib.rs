//! # Propertree Client Library
//!
//! Authenticated access to the Propertree rental API: every request carries
//! the current bearer token, an expired token is renewed once and the request
//! replayed, and a session that cannot be renewed is wiped and reported to
//! the application shell as an event.
//!
//! Modules:
//! - `config`: client configuration, loading and validation
//! - `session`: credential store, persistence backends, identity snapshot, events
//! - `client`: request chain: dispatcher, renewal coordinator, error taxonomy
//! - `services`: auth operations built on the client
//! - `observability`: prometheus metrics

pub mod config;
pub mod session;
pub mod client;
pub mod services;
pub mod observability;
pub mod utils;
#[cfg(test)]
mod tests;


pub use crate::client::{ApiClient, ApiError, ErrorKind, RequestDescriptor};
pub use crate::session::{CredentialPair, CredentialStore, SessionEvent, SessionEvents, UserProfile};
pub use crate::services::AuthService;
