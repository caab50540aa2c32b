use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::info;
use std::sync::Arc;
use tokio::sync::OnceCell;


// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE.get_or_init(|| async {
        info!("Initializing Metrics ...");
        Metrics::new()}
    ).await
}


#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Request metrics
    pub api_requests: IntCounterVec,
    pub api_request_duration: HistogramVec,

    // Renewal metrics
    pub token_renewals: IntCounterVec,
    pub session_expirations: IntCounter,

    // Config
    pub config_validation_errors: IntCounter,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("propertree_client".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            api_requests: IntCounterVec::new(Opts::new("api_requests_total", "Dispatched API requests by outcome"),&["method", "outcome"],).unwrap(),
            api_request_duration: HistogramVec::new(HistogramOpts::new("api_request_duration_seconds", "API request duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),&["method"],).unwrap(),

            token_renewals: IntCounterVec::new(Opts::new("token_renewals_total", "Access token renewals by outcome"),&["outcome"],).unwrap(),
            session_expirations: IntCounter::new("session_expirations_total", "Sessions wiped after a failed renewal or replay").unwrap(),

            config_validation_errors: IntCounter::new("config_validation_errors_total","Validation errors while loading config",).unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.api_requests.clone())).unwrap();
        reg.register(Box::new(metrics.api_request_duration.clone())).unwrap();
        reg.register(Box::new(metrics.token_renewals.clone())).unwrap();
        reg.register(Box::new(metrics.session_expirations.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();

        metrics
    }
}

/// Prometheus text exposition of every registered metric.
pub async fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = get_metrics().await.registry.gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {}", err);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
