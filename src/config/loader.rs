use std::path::Path;

use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::{debug, error, warn};

use crate::config::settings::{ClientConfig, LoggingConfig};
use crate::config::validator;

/// Load and validate config from YAML file.
/// A missing file is not an error: the client runs on defaults.
pub async fn file_to_config(path: &Path) -> Result<ClientConfig> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("config file '{}' not found, using defaults", path.display());
            return finalize(ClientConfig::default()).await;
        }
        Err(err) => return Err(anyhow!(err)),
    };

    let expanded = expand_env_vars(&content);
    parse_config(&expanded).await
}

pub async fn parse_config(content: &str) -> Result<ClientConfig> {
    let client_config: ClientConfig = serde_yaml::from_str(content)
        .inspect_err(|e| error!("parse config error: {}", e))?;
    finalize(client_config).await
}

async fn finalize(mut client_config: ClientConfig) -> Result<ClientConfig> {
    // Apply defaults
    if client_config.logging.is_none() {
        client_config.logging = Some(LoggingConfig::default());
    }
    client_config.api.base_url = client_config.api.base_url.trim_end_matches('/').to_owned();

    debug!("validation config ...");
    validator::validate_client_config(&client_config)
        .await
        .map_err(|errors| anyhow!("config is not valid: {}", errors.join("; ")))?;

    Ok(client_config)
}

pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}
