//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → policy table / secrets handed to the security components
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the policy table and webhook secrets
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CsrfConfig, EndpointPolicyConfig, Environment, GuardConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, RateLimitConfig, UpstreamConfig, WebhookConfig,
    DEFAULT_POLICY_KEY,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
