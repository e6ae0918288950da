//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `dockhand.yaml`
//! - The resource type registry with built-in definitions
//! - Validation of configuration and desired specs
//! - Computing desired spec hashes for change detection

mod hash;
mod parser;
mod registry;
mod spec;
mod validator;

pub use hash::SpecHasher;
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_DEFAULT_MODE, ENV_RETRY_MAX_ATTEMPTS, ENV_STATE_PATH,
    ENV_STOP_TIMEOUT_SECS, find_config_file,
};
pub use registry::TypeRegistry;
pub use spec::{DockhandConfig, ResourceConfig, RetryPolicy, Settings, StateConfig};
pub use validator::{ConfigIssue, ConfigValidator, ValidationReport};
