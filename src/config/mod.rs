//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env file (dotenvy)
//! config file (TOML, optional)
//!     → loader.rs (parse, deserialize, overlay environment)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared by value/Arc with all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Environment wins over the file, matching the deployment `.env` workflow
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::GatewayConfig;
pub use schema::{
    LimitsConfig, ListenerConfig, ObservabilityConfig, SecurityConfig, StoreConfig,
    TimeoutConfig, VaultConfig,
};
