//! Domain-driven configuration management for Tributary
//!
//! Configuration is split by functional domain, validated per domain, and
//! can be loaded from YAML with `TRIBUTARY_*` environment overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    execution::ExecutionConfig,
    logging::{LogFormat, LogLevel, LogTarget, LoggingConfig},
    TributaryConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_option};
