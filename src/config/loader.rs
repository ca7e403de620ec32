//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load the effective configuration: `.env`, optional TOML file, then process environment.
///
/// Environment variables override file values.
pub fn load(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    match dotenvy::dotenv() {
        Ok(env_file) => tracing::debug!(path = %env_file.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env"),
    }

    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment values onto `config` using `lookup` as the variable source.
pub fn apply_env<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("GATEWAY_HOST") {
        config.listener.host = host;
    }
    if let Some(port) = lookup("GATEWAY_PORT") {
        config.listener.port = parse_number("GATEWAY_PORT", &port)?;
    }
    if let Some(api_key) = lookup("API_KEY") {
        config.security.api_key = api_key;
    }
    if let Some(enabled) = lookup("IP_WHITELIST_ENABLED") {
        config.security.ip_whitelist_enabled = parse_flag(&enabled);
    }
    if let Some(extra) = lookup("ALLOWED_IPS") {
        config.security.allowed_ips.extend(parse_cidr_list(&extra));
    }
    if let Some(dir) = lookup("DATA_DIR") {
        config.store.data_dir = PathBuf::from(dir);
    }
    if let Some(root) = lookup("VAULT_PATH") {
        config.vault.root = PathBuf::from(root);
    }
    if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
        config.timeouts.request_secs = parse_number("REQUEST_TIMEOUT_SECS", &secs)?;
    }
    if let Some(bytes) = lookup("MAX_BODY_BYTES") {
        config.limits.max_body_bytes = parse_number("MAX_BODY_BYTES", &bytes)?;
    }
    if let Some(addr) = lookup("METRICS_ADDRESS") {
        let addr = addr.trim();
        config.observability.metrics_address = (!addr.is_empty()).then(|| addr.to_string());
    }
    Ok(())
}

/// `true`, `1` and `yes` (any case) enable; anything else disables.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// Split a comma-separated CIDR list, dropping blank entries.
pub fn parse_cidr_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    })
}
