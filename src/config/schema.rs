//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind host and port).
    pub listener: ListenerConfig,

    /// Access control: allow-list and API key.
    pub security: SecurityConfig,

    /// Record store settings.
    pub store: StoreConfig,

    /// Note vault settings.
    pub vault: VaultConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind host (e.g., "127.0.0.1", "0.0.0.0", "::").
    pub host: String,

    /// Bind port.
    pub port: u16,
}

impl ListenerConfig {
    /// `host:port`, bracketing IPv6 hosts.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8008,
        }
    }
}

/// Access-control configuration.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared secret for Bearer auth. Empty disables credential checks.
    pub api_key: String,

    /// Enable the origin (IP allow-list) filter.
    pub ip_whitelist_enabled: bool,

    /// Extra CIDR ranges appended to the allow-list.
    pub allowed_ips: Vec<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let api_key = if self.api_key.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("SecurityConfig")
            .field("api_key", &api_key)
            .field("ip_whitelist_enabled", &self.ip_whitelist_enabled)
            .field("allowed_ips", &self.allowed_ips)
            .finish()
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one JSON snapshot per table.
    pub data_dir: PathBuf,

    /// Write snapshots after every mutation. Disable for throwaway instances.
    pub persist: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            persist: true,
        }
    }
}

/// Note vault configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory of the vault. All tool paths are relative to it.
    pub root: PathBuf,

    /// Largest file `vault_read` will return, in bytes.
    pub max_file_bytes: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./vault"),
            max_file_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Prometheus exporter bind address. Unset disables the exporter.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}
