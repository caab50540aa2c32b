use std::fmt::Display;

use http::StatusCode;
use serde_json::{Map, Value};
use thiserror::Error;

pub const MSG_INVALID_REQUEST: &str = "Invalid request";
pub const MSG_FORBIDDEN: &str = "You do not have permission to access this resource";
pub const MSG_NOT_FOUND: &str = "Resource not found";
pub const MSG_SERVER_ERROR: &str = "Server error. Please try again later.";
pub const MSG_NO_RESPONSE: &str = "No response from server. Check your connection.";
pub const MSG_TIMEOUT: &str = "Request timed out. Check your connection.";
pub const MSG_REQUEST_FAILED: &str = "Error making request";
pub const MSG_UNEXPECTED_RESPONSE: &str = "Unexpected response from server";
pub const MSG_SOMETHING_WRONG: &str = "Something went wrong";
pub const MSG_NO_REFRESH_TOKEN: &str = "No refresh token available";
pub const MSG_SESSION_EXPIRED: &str = "Session expired. Please log in again.";

/// Closed classification of everything a request can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 400, payload usually carries field errors
    Validation,
    /// 401, handled by renewal unless the request opted out
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 500
    ServerError,
    /// no response: refused connection, dns, reset
    NetworkUnreachable,
    Timeout,
    Unknown,
}

impl ErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ErrorKind::Validation,
            StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
            StatusCode::FORBIDDEN => ErrorKind::Forbidden,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::INTERNAL_SERVER_ERROR => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkUnreachable => "network_unreachable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// A failed API call. `message` is ready to show to the user.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,
    /// decoded response body, when the server answered
    pub payload: Option<Value>,
    /// transport or decoding detail for logs
    pub detail: Option<String>,
    /// set when this failure ended the session
    pub session_expired: bool,
    /// credential generation of the bearer the failed request carried,
    /// `None` when it went out without one
    pub(crate) generation: Option<u64>,
}

impl ApiError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            payload: None,
            detail: None,
            session_expired: false,
            generation: None,
        }
    }

    pub fn from_status(status: StatusCode, payload: Value) -> Self {
        let kind = ErrorKind::from_status(status);
        let message = match kind {
            ErrorKind::Validation => payload_message(&payload).unwrap_or_else(|| MSG_INVALID_REQUEST.to_owned()),
            ErrorKind::Forbidden => MSG_FORBIDDEN.to_owned(),
            ErrorKind::NotFound => MSG_NOT_FOUND.to_owned(),
            ErrorKind::ServerError => MSG_SERVER_ERROR.to_owned(),
            _ => payload_message(&payload).unwrap_or_else(|| MSG_SOMETHING_WRONG.to_owned()),
        };
        Self {
            status: Some(status),
            payload: Some(payload),
            ..Self::new(kind, message)
        }
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        let (kind, message) = if err.is_timeout() {
            (ErrorKind::Timeout, MSG_TIMEOUT)
        } else if err.is_builder() {
            (ErrorKind::Unknown, MSG_REQUEST_FAILED)
        } else if err.is_connect() || err.is_request() || err.is_body() {
            (ErrorKind::NetworkUnreachable, MSG_NO_RESPONSE)
        } else {
            (ErrorKind::Unknown, MSG_REQUEST_FAILED)
        };
        Self::new(kind, message).with_detail(err)
    }

    /// The request could not be assembled (bad header value, bad form part).
    pub fn request(detail: impl Display) -> Self {
        Self::new(ErrorKind::Unknown, MSG_REQUEST_FAILED).with_detail(detail)
    }

    /// The server answered 2xx with a body of the wrong shape.
    pub fn decode(detail: impl Display) -> Self {
        Self::new(ErrorKind::Unknown, MSG_UNEXPECTED_RESPONSE).with_detail(detail)
    }

    pub fn missing_refresh_token() -> Self {
        Self::new(ErrorKind::Unauthorized, MSG_NO_REFRESH_TOKEN)
    }

    pub(crate) fn sent_at(mut self, generation: Option<u64>) -> Self {
        self.generation = generation;
        self
    }

    fn with_detail(mut self, detail: impl Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    /// Rewrite as the error a caller sees once the session has been wiped.
    /// Kind, status and payload of the underlying failure are kept.
    pub(crate) fn into_session_expired(mut self) -> Self {
        if self.detail.is_none() {
            self.detail = Some(self.message.clone());
        }
        self.message = MSG_SESSION_EXPIRED.to_owned();
        self.session_expired = true;
        self
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }

    pub fn is_session_expired(&self) -> bool {
        self.session_expired
    }

    /// Field-level errors of a 400 payload (`{"email": ["..."]}`), for forms.
    pub fn field_errors(&self) -> Option<&Map<String, Value>> {
        match (self.kind, &self.payload) {
            (ErrorKind::Validation, Some(Value::Object(fields))) => Some(fields),
            _ => None,
        }
    }
}

fn payload_message(payload: &Value) -> Option<String> {
    payload
        .get("message")
        .or_else(|| payload.get("detail"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}
