//! Authenticated REST client: bearer dispatch, error classification and
//! transparent token renewal, composed as a chain of [`Dispatch`] layers.

pub mod api;
pub mod dispatcher;
pub mod error;
pub mod renewal;
pub mod request;
pub mod response;

pub use api::ApiClient;
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{ApiError, ErrorKind};
pub use renewal::{Notifying, RenewalCoordinator, Renewing};
pub use request::{Body, FormPart, PartValue, RequestDescriptor};
pub use response::ApiResponse;
