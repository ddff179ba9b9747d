//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML/TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EdgeConfig (validated, immutable)
//!     → consumed once by EdgeServer at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, EdgeConfig, ListenerConfig, MetricsConfig, RateLimitParams, RateLimits,
    RouteConfig, TimeoutConfig, TlsConfig, UpstreamConfig, DEFAULT_HOST,
};
pub use validation::{config_warnings, validate_config, ConfigWarning, ValidationError};
