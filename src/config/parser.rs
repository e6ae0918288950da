//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, DockhandError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::DockhandConfig;
use crate::model::ComparisonMode;

/// Environment variable overriding `settings.default_mode`.
pub const ENV_DEFAULT_MODE: &str = "DOCKHAND_DEFAULT_MODE";
/// Environment variable overriding `state.path`.
pub const ENV_STATE_PATH: &str = "DOCKHAND_STATE_PATH";
/// Environment variable overriding `settings.retry.max_attempts`.
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "DOCKHAND_RETRY_MAX_ATTEMPTS";
/// Environment variable overriding `settings.stop_timeout_secs`.
pub const ENV_STOP_TIMEOUT_SECS: &str = "DOCKHAND_STOP_TIMEOUT_SECS";

/// Configuration parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DockhandConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(DockhandError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            DockhandError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DockhandConfig> {
        debug!("Parsing YAML configuration");

        let config: DockhandConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            DockhandError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed {} resource(s) and {} type definition(s)",
            config.resources.len(),
            config.types.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// override holds an invalid value.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DockhandConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `DOCKHAND_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] when a value cannot be parsed.
    pub fn apply_env_overrides<F>(config: &mut DockhandConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(ENV_DEFAULT_MODE) {
            debug!("Overriding settings.default_mode from environment");
            config.settings.default_mode = mode
                .parse::<ComparisonMode>()
                .map_err(|_| invalid_env(ENV_DEFAULT_MODE, &mode))?;
        }

        if let Some(path) = lookup(ENV_STATE_PATH) {
            debug!("Overriding state.path from environment");
            config.state.path = PathBuf::from(path);
        }

        if let Some(attempts) = lookup(ENV_RETRY_MAX_ATTEMPTS) {
            debug!("Overriding settings.retry.max_attempts from environment");
            config.settings.retry.max_attempts = attempts
                .trim()
                .parse()
                .map_err(|_| invalid_env(ENV_RETRY_MAX_ATTEMPTS, &attempts))?;
        }

        if let Some(secs) = lookup(ENV_STOP_TIMEOUT_SECS) {
            debug!("Overriding settings.stop_timeout_secs from environment");
            config.settings.stop_timeout_secs = secs
                .trim()
                .parse()
                .map_err(|_| invalid_env(ENV_STOP_TIMEOUT_SECS, &secs))?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                DockhandError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn invalid_env(name: &str, value: &str) -> DockhandError {
    DockhandError::Config(ConfigError::InvalidEnvVar {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["dockhand.yaml", "dockhand.yml"];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(DockhandError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
