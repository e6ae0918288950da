//! Configuration specification types.
//!
//! This module defines the structs that map to the `dockhand.yaml` file:
//! global settings, the local state directory, user resource type
//! definitions, and the declared resources.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::model::{ComparisonMode, DesiredSpec, ResourceId, ResourceType, TargetState};

/// The root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockhandConfig {
    /// Global settings.
    #[serde(default)]
    pub settings: Settings,
    /// Local state configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// User resource type definitions. A definition replaces the built-in
    /// definition of the same kind.
    #[serde(default)]
    pub types: Vec<ResourceType>,
    /// Declared resources.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Global reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Comparison mode for fields without an explicit mode.
    #[serde(default)]
    pub default_mode: ComparisonMode,
    /// Timeout passed to backend `stop` calls.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
    /// Whether removal is forced.
    #[serde(default = "default_true")]
    pub force_remove: bool,
    /// Retry policy for retry-safe backend operations.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Bounded exponential backoff for transient backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Factor applied to the delay after each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

/// Local state configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding the resource table and lock file.
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource kind.
    pub kind: String,
    /// Resource name, unique within its kind.
    pub name: String,
    /// Target lifecycle. Defaults per kind.
    #[serde(default)]
    pub state: Option<TargetState>,
    /// Desired fields. `null` means explicitly empty; omitted keys are not
    /// provided.
    #[serde(default)]
    pub spec: Map<String, Value>,
}

const fn default_true() -> bool {
    true
}

const fn default_stop_timeout() -> u64 {
    10
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff() -> u64 {
    200
}

const fn default_max_backoff() -> u64 {
    5000
}

const fn default_multiplier() -> u32 {
    2
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".dockhand")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_mode: ComparisonMode::default(),
            stop_timeout_secs: default_stop_timeout(),
            force_remove: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    /// Returns the stop timeout as a duration.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), capped at
    /// `max_backoff_ms`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_backoff_ms;
        for _ in 1..attempt {
            delay = delay.saturating_mul(u64::from(self.multiplier));
            if delay >= self.max_backoff_ms {
                break;
            }
        }
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl ResourceConfig {
    /// Returns the resource identity.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.kind, &self.name)
    }

    /// Builds the desired spec, keeping the declared field order.
    #[must_use]
    pub fn desired(&self) -> DesiredSpec {
        DesiredSpec::from_map(&self.spec)
    }

    /// Resolves the target, falling back to the kind's default.
    #[must_use]
    pub fn target(&self, resource_type: &ResourceType) -> TargetState {
        self.state.unwrap_or_else(|| resource_type.default_target())
    }
}

impl DockhandConfig {
    /// Finds a declared resource by kind and name.
    #[must_use]
    pub fn resource(&self, kind: &str, name: &str) -> Option<&ResourceConfig> {
        self.resources
            .iter()
            .find(|r| r.kind == kind && r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provision;

    #[test]
    fn test_defaults() {
        let config: DockhandConfig = serde_yaml::from_str("resources: []").unwrap();
        assert_eq!(config.settings.default_mode, ComparisonMode::Strict);
        assert_eq!(config.settings.stop_timeout(), Duration::from_secs(10));
        assert!(config.settings.force_remove);
        assert_eq!(config.settings.retry.max_attempts, 3);
        assert_eq!(config.state.path, PathBuf::from(".dockhand"));
    }

    #[test]
    fn test_backoff_schedule() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for(3), Duration::from_millis(800));
        assert_eq!(retry.delay_for(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_resource_spec_tri_state() {
        let yaml = r"
kind: container
name: web
spec:
  image: nginx
  published_ports: null
";
        let resource: ResourceConfig = serde_yaml::from_str(yaml).unwrap();
        let desired = resource.desired();
        assert_eq!(desired.get("published_ports"), &Provision::Empty);
        assert!(!desired.get("env").is_provided());
        assert_eq!(resource.id(), ResourceId::new("container", "web"));
        assert_eq!(resource.state, None);
    }
}
