//! Resource type registry.
//!
//! Built-in definitions ship as YAML next to the crate and are compiled in.
//! User definitions from the configuration replace built-ins of the same
//! kind.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::model::ResourceType;

/// Built-in definitions as `(file name, YAML)` pairs.
const BUILTIN_DEFINITIONS: &[(&str, &str)] = &[
    ("container.yaml", include_str!("../../definitions/container.yaml")),
    ("network.yaml", include_str!("../../definitions/network.yaml")),
    ("volume.yaml", include_str!("../../definitions/volume.yaml")),
    ("service.yaml", include_str!("../../definitions/service.yaml")),
];

/// Registry of resource type definitions keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, ResourceType>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in definition fails to parse.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for (file, yaml) in BUILTIN_DEFINITIONS {
            let definition: ResourceType = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
                message: format!("Invalid built-in definition: {e}"),
                location: Some((*file).to_string()),
            })?;
            registry.register(definition);
        }
        Ok(registry)
    }

    /// Creates a registry of built-ins overlaid with user definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in definition fails to parse.
    pub fn with_overrides(definitions: &[ResourceType]) -> Result<Self> {
        let mut registry = Self::builtin()?;
        for definition in definitions {
            if registry.register(definition.clone()).is_some() {
                debug!("User definition replaces built-in kind '{}'", definition.kind);
            }
        }
        Ok(registry)
    }

    /// Registers a definition, returning the one it replaced.
    pub fn register(&mut self, definition: ResourceType) -> Option<ResourceType> {
        self.types.insert(definition.kind.clone(), definition)
    }

    /// Looks up a definition.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&ResourceType> {
        self.types.get(kind)
    }

    /// Iterates over definitions ordered by kind.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.values()
    }

    /// Returns the registered kinds.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Returns the number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no definitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeEffect, ValueKind};

    #[test]
    fn test_builtins_parse() {
        let registry = TypeRegistry::builtin().unwrap();
        assert_eq!(registry.kinds(), vec!["container", "network", "service", "volume"]);

        let container = registry.get("container").unwrap();
        assert_eq!(container.fields["networks"].effect, Some(ChangeEffect::Update));
        assert_eq!(container.fields["mounts"].kind, Some(ValueKind::ListUnordered));
        assert_eq!(container.fields["networks"].key.as_deref(), Some("name"));

        let volume = registry.get("volume").unwrap();
        assert!(!volume.capabilities.start);
        assert!(!volume.capabilities.update);
    }

    #[test]
    fn test_user_definition_replaces_builtin() {
        let custom = ResourceType::new("volume");
        let registry = TypeRegistry::with_overrides(&[custom, ResourceType::new("secret")]).unwrap();
        assert!(registry.get("volume").unwrap().fields.is_empty());
        assert!(registry.get("secret").is_some());
        assert_eq!(registry.len(), 5);
    }
}
