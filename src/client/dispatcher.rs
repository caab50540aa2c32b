use std::future::Future;

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tokio::time::Instant;
use tracing::debug;

use crate::client::error::ApiError;
use crate::client::request::{Body, FormPart, PartValue, RequestDescriptor};
use crate::client::response::{decode_body, ApiResponse};
use crate::observability::metrics::get_metrics;
use crate::session::store::CredentialStore;

static OK_MSG: &str = "ok";
const APPLICATION_JSON: &str = "application/json";

/// One link of the request chain. Layers wrap an inner `Dispatch` and add
/// behaviour around it; the innermost one talks to the network.
pub trait Dispatch: Send + Sync {
    fn dispatch(
        &self,
        request: &RequestDescriptor,
    ) -> impl Future<Output = Result<ApiResponse, ApiError>> + Send;
}

/// Innermost layer: attaches the bearer token and performs the HTTP call.
pub struct Dispatcher {
    http: Client,
    base_url: String,
    store: CredentialStore,
}

impl Dispatcher {
    pub fn new(http: Client, base_url: &str, store: CredentialStore) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            store,
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

impl Dispatch for Dispatcher {
    async fn dispatch(&self, request: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let metrics = get_metrics().await;
        let method = request.method().as_str().to_owned();

        // read fresh on every call, the store is the only source of truth
        let (access, generation) = self.store.access_snapshot().await;
        let sent_at = access.is_some().then_some(generation);
        let headers = prepare_headers(request, access.as_deref()).map_err(|err| err.sent_at(sent_at))?;

        let mut builder = self
            .http
            .request(request.method().clone(), self.url_for(request.path()))
            .headers(headers);
        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }
        builder = match request.body_ref() {
            None => builder,
            Some(Body::Json(value)) => builder.json(value),
            Some(Body::Multipart(parts)) => {
                builder.multipart(build_form(parts).map_err(|err| err.sent_at(sent_at))?)
            }
        };

        debug!("{} {} (retried: {})", method, request.path(), request.is_retried());
        let start = Instant::now();
        let outcome = send(builder).await.map_err(|err| err.sent_at(sent_at));
        metrics.api_request_duration.with_label_values(&[method.as_str()]).observe(start.elapsed().as_secs_f64());

        let label = match &outcome {
            Ok(_) => OK_MSG,
            Err(err) => err.kind.as_str(),
        };
        metrics.api_requests.with_label_values(&[method.as_str(), label]).inc();
        if let Err(err) = &outcome {
            debug!("{} {} failed: {} ({:?})", method, request.path(), err.kind.as_str(), err.detail);
        }
        outcome
    }
}

async fn send(builder: reqwest::RequestBuilder) -> Result<ApiResponse, ApiError> {
    let response = builder.send().await.map_err(|err| ApiError::from_transport(&err))?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.bytes().await.map_err(|err| ApiError::from_transport(&err))?;
    let body = decode_body(&bytes);

    if status.is_success() {
        Ok(ApiResponse { status, headers, body })
    } else {
        Err(ApiError::from_status(status, body))
    }
}

/// Headers for one dispatch: JSON defaults, per-call overrides, then the
/// bearer token. Multipart bodies get no content type here so the transport
/// can write one with the boundary.
pub fn prepare_headers(request: &RequestDescriptor, access: Option<&str>) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

    for (name, value) in request.headers() {
        headers.insert(name.clone(), value.clone());
    }

    if let Some(token) = access {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(ApiError::request)?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    if request.body_ref().is_some_and(Body::is_multipart) {
        headers.remove(CONTENT_TYPE);
    }
    Ok(headers)
}

fn build_form(parts: &[FormPart]) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for part in parts {
        form = match &part.value {
            PartValue::Text(text) => form.text(part.name.clone(), text.clone()),
            PartValue::File { file_name, bytes, mime } => {
                let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file.mime_str(mime).map_err(ApiError::request)?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{}", base_url, path)
    } else {
        format!("{}/{}", base_url, path)
    }
}
