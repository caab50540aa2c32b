//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Validates base url scheme, timeout bounds, path shapes and logging level

use tracing::{error, info};

use crate::config::settings::{ApiConfig, ClientConfig, LoggingConfig};
use crate::observability::metrics::get_metrics;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_client_config(cfg: &ClientConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_api(&cfg.api, &mut errors);
    if let Some(logging) = &cfg.logging {
        validate_logging(logging, &mut errors);
    }
    if let Some(path) = &cfg.session.path {
        if path.as_os_str().is_empty() {
            errors.push("session.path must not be empty".to_string());
        }
    }

    if errors.is_empty() {
        info!("config is valid");
        Ok(())
    } else {
        for e in &errors {
            error!("config validation: {}", e);
        }
        get_metrics().await.config_validation_errors.inc_by(errors.len() as u64);
        Err(errors)
    }
}

fn validate_api(api: &ApiConfig, errors: &mut Vec<String>) {
    if !(api.base_url.starts_with("http://") || api.base_url.starts_with("https://")) {
        errors.push(format!(
            "api.base_url '{}' must start with http:// or https://",
            api.base_url
        ));
    }
    if api.timeout_ms == 0 {
        errors.push("api.timeout_ms must be greater than 0".to_string());
    }
    for (name, path) in [
        ("api.renewal_path", &api.renewal_path),
        ("api.login_path", &api.login_path),
    ] {
        if !path.starts_with('/') {
            errors.push(format!("{} '{}' must start with '/'", name, path));
        }
    }
}

fn validate_logging(logging: &LoggingConfig, errors: &mut Vec<String>) {
    if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "logging.level '{}' must be one of {:?}",
            logging.level, LOG_LEVELS
        ));
    }
}
