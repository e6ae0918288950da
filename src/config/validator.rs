//! Configuration and desired spec validation.
//!
//! Everything here runs before the backend is contacted. Configuration
//! problems are collected and the first one is reported; desired spec
//! problems fail fast with a [`ValidationError`].

use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{ConfigError, Result, ValidationError};
use crate::model::{ComparisonMode, DesiredSpec, Provision, ResourceId, ResourceType, TargetState};

use super::registry::TypeRegistry;
use super::spec::{DockhandConfig, RetryPolicy};

/// Validator for configurations and desired specs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigValidator;

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Fatal problems.
    pub errors: Vec<ConfigIssue>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration against a type registry.
    ///
    /// # Errors
    ///
    /// Returns the first problem found if any fatal problem exists.
    pub fn validate(&self, config: &DockhandConfig, registry: &TypeRegistry) -> Result<ValidationReport> {
        let report = self.check(config, registry);

        if let Some(first) = report.errors.first() {
            return Err(ConfigError::Invalid {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            }
            .into());
        }

        debug!(
            "Configuration validation passed with {} warning(s)",
            report.warnings.len()
        );
        Ok(report)
    }

    /// Collects every problem without failing.
    #[must_use]
    pub fn check(&self, config: &DockhandConfig, registry: &TypeRegistry) -> ValidationReport {
        let mut report = ValidationReport::default();

        Self::validate_retry(&config.settings.retry, &mut report);
        Self::validate_types(&config.types, &mut report);
        Self::validate_resources(config, registry, &mut report);

        report
    }

    /// Validates a desired spec against its resource type.
    ///
    /// # Errors
    ///
    /// Returns the first problem: incomplete identity, empty or duplicate
    /// field names, undeclared fields when the type forbids them, or values
    /// whose shape does not match the declared kind.
    pub fn validate_desired(
        resource: &ResourceId,
        desired: &DesiredSpec,
        resource_type: &ResourceType,
    ) -> std::result::Result<(), ValidationError> {
        if resource.kind.is_empty() {
            return Err(ValidationError::EmptyIdentity { what: "kind" });
        }
        if resource.name.is_empty() {
            return Err(ValidationError::EmptyIdentity { what: "name" });
        }

        let mut seen = HashSet::new();
        for (field, provision) in desired.iter() {
            if field.is_empty() {
                return Err(ValidationError::EmptyFieldName);
            }
            if !seen.insert(field) {
                return Err(ValidationError::DuplicateField {
                    field: field.to_string(),
                });
            }

            let policy = resource_type.fields.get(field);
            if policy.is_none() && !resource_type.allow_unknown_fields {
                return Err(ValidationError::UnknownField {
                    kind: resource_type.kind.clone(),
                    field: field.to_string(),
                });
            }

            let Provision::Value(value) = provision else {
                continue;
            };

            if let Some(kind) = policy.and_then(|p| p.kind)
                && !kind.accepts(value)
            {
                return Err(ValidationError::KindMismatch {
                    field: field.to_string(),
                    expected: kind.to_string(),
                    found: describe(value).to_string(),
                });
            }

            if policy.and_then(|p| p.key.as_ref()).is_some()
                && let Value::Array(items) = value
                && items.iter().any(Value::is_array)
            {
                return Err(ValidationError::InvalidPolicy {
                    field: field.to_string(),
                    message: String::from("keyed elements must be scalars or mappings"),
                });
            }
        }

        Ok(())
    }

    /// Validates a resource type definition.
    ///
    /// # Errors
    ///
    /// Returns an error for empty field names, identity keys on non-collection
    /// kinds, and defaults that do not match the declared kind.
    pub fn validate_type(resource_type: &ResourceType) -> std::result::Result<(), ValidationError> {
        if resource_type.kind.is_empty() {
            return Err(ValidationError::EmptyIdentity { what: "kind" });
        }

        for (field, policy) in &resource_type.fields {
            if field.is_empty() {
                return Err(ValidationError::EmptyFieldName);
            }

            if let (Some(kind), Some(_)) = (policy.kind, &policy.key)
                && !kind.is_collection()
            {
                return Err(ValidationError::InvalidPolicy {
                    field: field.clone(),
                    message: format!("an identity key requires a collection kind, not {kind}"),
                });
            }

            if let (Some(kind), Some(default)) = (policy.kind, &policy.default)
                && !kind.accepts(default)
            {
                return Err(ValidationError::InvalidPolicy {
                    field: field.clone(),
                    message: format!("default is a {}, expected {kind}", describe(default)),
                });
            }
        }

        Ok(())
    }

    fn validate_retry(retry: &RetryPolicy, report: &mut ValidationReport) {
        if retry.max_attempts == 0 {
            report.error("settings.retry.max_attempts", "Retry attempts must be at least 1");
        }
        if retry.multiplier == 0 {
            report.error("settings.retry.multiplier", "Backoff multiplier must be at least 1");
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            report.error(
                "settings.retry.initial_backoff_ms",
                format!(
                    "Initial backoff {}ms exceeds maximum backoff {}ms",
                    retry.initial_backoff_ms, retry.max_backoff_ms
                ),
            );
        }
    }

    fn validate_types(types: &[ResourceType], report: &mut ValidationReport) {
        let mut seen = HashSet::new();
        for (i, definition) in types.iter().enumerate() {
            let prefix = format!("types[{i}]");
            if !seen.insert(definition.kind.as_str()) {
                let duplicate = ConfigError::DuplicateName {
                    resource_type: String::from("type"),
                    name: definition.kind.clone(),
                };
                report.error(format!("{prefix}.kind"), duplicate.to_string());
            }
            if let Err(e) = Self::validate_type(definition) {
                report.error(prefix, e.to_string());
            }
        }
    }

    fn validate_resources(config: &DockhandConfig, registry: &TypeRegistry, report: &mut ValidationReport) {
        if config.resources.is_empty() {
            report.warnings.push(String::from("No resources defined in configuration"));
            return;
        }

        let mut seen = HashSet::new();
        for (i, resource) in config.resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");
            let id = resource.id();

            if !seen.insert(id.key()) {
                let duplicate = ConfigError::DuplicateName {
                    resource_type: String::from("resource"),
                    name: id.key(),
                };
                report.error(format!("{prefix}.name"), duplicate.to_string());
            }

            let Some(resource_type) = registry.get(&resource.kind) else {
                report.error(
                    format!("{prefix}.kind"),
                    ValidationError::UnknownKind {
                        kind: resource.kind.clone(),
                    }
                    .to_string(),
                );
                continue;
            };

            if let Err(e) = Self::validate_desired(&id, &resource.desired(), resource_type) {
                report.error(format!("{prefix}.spec"), e.to_string());
            }

            let target = resource.target(resource_type);
            if target == TargetState::Absent && !resource.spec.is_empty() {
                report.warnings.push(format!(
                    "{prefix}: spec of {id} is ignored because its state is absent"
                ));
            }

            for field in resource.spec.keys() {
                let ignored = resource_type
                    .fields
                    .get(field)
                    .and_then(|p| p.mode)
                    .or(resource_type.default_mode)
                    == Some(ComparisonMode::Ignore);
                if ignored {
                    report.warnings.push(format!(
                        "{prefix}.spec.{field}: field is never compared (mode ignore)"
                    ));
                }
            }
        }
    }
}

impl ValidationReport {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Names the shape of a value for error messages.
const fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldPolicy, ValueKind};
    use serde_json::json;

    fn container() -> ResourceType {
        let mut rt = ResourceType::new("container")
            .with_field("image", FieldPolicy::of_kind(ValueKind::Scalar))
            .with_field("networks", FieldPolicy::of_kind(ValueKind::Set).key("name"));
        rt.allow_unknown_fields = false;
        rt
    }

    fn web() -> ResourceId {
        ResourceId::new("container", "web")
    }

    #[test]
    fn test_valid_desired() {
        let desired = DesiredSpec::new()
            .with("image", json!("nginx"))
            .with("networks", json!(["front", {"name": "back"}]));
        assert!(ConfigValidator::validate_desired(&web(), &desired, &container()).is_ok());
    }

    #[test]
    fn test_empty_identity() {
        let err = ConfigValidator::validate_desired(
            &ResourceId::new("container", ""),
            &DesiredSpec::new(),
            &container(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyIdentity { what: "name" }));
    }

    #[test]
    fn test_duplicate_and_unknown_fields() {
        let desired = DesiredSpec::new()
            .with("image", json!("a"))
            .with("image", json!("b"));
        assert!(matches!(
            ConfigValidator::validate_desired(&web(), &desired, &container()),
            Err(ValidationError::DuplicateField { .. })
        ));

        let desired = DesiredSpec::new().with("privileged", json!(true));
        assert!(matches!(
            ConfigValidator::validate_desired(&web(), &desired, &container()),
            Err(ValidationError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_kind_mismatch() {
        let desired = DesiredSpec::new().with("networks", json!("front"));
        let err = ConfigValidator::validate_desired(&web(), &desired, &container()).unwrap_err();
        assert_eq!(err.to_string(), "Field 'networks' expects a set value, got string");

        // Explicitly empty values always fit their kind.
        let desired = DesiredSpec::new().with_empty("networks");
        assert!(ConfigValidator::validate_desired(&web(), &desired, &container()).is_ok());
    }

    #[test]
    fn test_invalid_type_definitions() {
        let rt = ResourceType::new("x").with_field("a", FieldPolicy::of_kind(ValueKind::Scalar).key("name"));
        assert!(ConfigValidator::validate_type(&rt).is_err());

        let rt = ResourceType::new("x")
            .with_field("a", FieldPolicy::of_kind(ValueKind::Mapping).default_value(json!([])));
        assert!(ConfigValidator::validate_type(&rt).is_err());
    }

    #[test]
    fn test_config_validation() {
        let yaml = r"
settings:
  retry:
    max_attempts: 0
resources:
  - kind: container
    name: web
";
        let config: DockhandConfig = serde_yaml::from_str(yaml).unwrap();
        let registry = TypeRegistry::builtin().unwrap();
        let report = ConfigValidator::new().check(&config, &registry);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "settings.retry.max_attempts");
        assert!(ConfigValidator::new().validate(&config, &registry).is_err());
    }

    #[test]
    fn test_duplicate_resources_and_unknown_kind() {
        let yaml = r"
resources:
  - kind: volume
    name: data
  - kind: volume
    name: data
  - kind: gadget
    name: g
";
        let config: DockhandConfig = serde_yaml::from_str(yaml).unwrap();
        let registry = TypeRegistry::builtin().unwrap();
        let report = ConfigValidator::new().check(&config, &registry);
        let messages: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Duplicate resource: volume/data"));
        assert!(messages[1].contains("Unknown resource kind: gadget"));
    }

    #[test]
    fn test_warnings() {
        let yaml = r"
types:
  - kind: probe
    fields:
      note:
        mode: ignore
resources:
  - kind: probe
    name: p
    spec:
      note: hello
  - kind: volume
    name: old
    state: absent
    spec:
      driver: local
";
        let config: DockhandConfig = serde_yaml::from_str(yaml).unwrap();
        let registry = TypeRegistry::with_overrides(&config.types).unwrap();
        let report = ConfigValidator::new().validate(&config, &registry).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.warning_count(), 2);
    }
}
