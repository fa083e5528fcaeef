//! Configuration file loading for agent-planner
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `PLANNER_*` environment variables (`__` separates sections)
//! 2. `--config <path>` specified file
//! 3. Project root: `./planner.toml` or `./.planner.toml`
//! 4. Global: `$XDG_CONFIG_HOME/agent-planner/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileCacheConfig, FileCircuitBreakerConfig, FileConfig,
    FileCoordinatorConfig, FileLoggingConfig, FileRateLimitConfig, FileResilienceConfig,
    FileSemanticCacheConfig, FileTransportConfig, TransportKind,
};
pub use loader::ConfigLoader;
