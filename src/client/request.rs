use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde_json::Value;

/// One field of a multipart form, owned so the form can be rebuilt for a replay.
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub value: PartValue,
}

#[derive(Debug, Clone)]
pub enum PartValue {
    Text(String),
    File {
        file_name: String,
        bytes: Vec<u8>,
        mime: Option<String>,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: PartValue::Text(value.into()) }
    }

    pub fn file(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value: PartValue::File { file_name: file_name.into(), bytes, mime: None },
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        if let PartValue::File { mime: slot, .. } = &mut self.value {
            *slot = Some(mime.into());
        }
        self
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    Json(Value),
    Multipart(Vec<FormPart>),
}

impl Body {
    pub fn is_multipart(&self) -> bool {
        matches!(self, Body::Multipart(_))
    }
}

/// Everything needed to send a request, and to send it again after renewal.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Body>,
    headers: HeaderMap,
    renewal: bool,
    retried: bool,
}

impl RequestDescriptor {
    /// `path` is relative to the API base url, e.g. `/bookings/`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            renewal: true,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = Some(Body::Multipart(parts));
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Surface 401 to the caller instead of renewing, for endpoints that
    /// authenticate by other means (login, registration, password reset).
    pub fn without_renewal(mut self) -> Self {
        self.renewal = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body_ref(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn renewal_enabled(&self) -> bool {
        self.renewal
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Copy for the single replay after renewal. The copy carries the retry
    /// marker, so it can never trigger another renewal.
    pub fn replay(&self) -> Self {
        Self { retried: true, ..self.clone() }
    }
}
