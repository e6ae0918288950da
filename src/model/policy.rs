//! Comparison policies and resource type definitions.
//!
//! A [`ResourceType`] is static configuration describing how each field of
//! a resource kind is compared and whether changing it can be applied in
//! place. New kinds are added by supplying a new definition, not new code.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::desired::{DesiredSpec, Provision};
use super::resource::TargetState;

/// How strictly a desired value must match the observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Values must match exactly.
    #[default]
    Strict,
    /// The field never causes a diff.
    Ignore,
    /// Observed may contain more than desired (subset / subsequence / extra keys).
    #[serde(alias = "allow-more-present")]
    AllowMorePresent,
}

/// Shape of a field's value, which selects the comparison algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// A single value.
    Scalar,
    /// An unordered collection without duplicates.
    Set,
    /// A sequence where order matters.
    #[serde(alias = "list", alias = "list-ordered")]
    ListOrdered,
    /// A sequence where order does not matter but multiplicity does.
    #[serde(alias = "list-unordered")]
    ListUnordered,
    /// A key/value mapping.
    #[serde(alias = "dict")]
    Mapping,
}

/// What a change to a field requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEffect {
    /// The change can be applied to the live resource.
    Update,
    /// The resource must be destroyed and recreated.
    Recreate,
}

/// Per-field policy entry of a resource type definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPolicy {
    /// Value kind. Inferred from the desired value when omitted.
    #[serde(default)]
    pub kind: Option<ValueKind>,
    /// Comparison mode. Falls back to the type or global default.
    #[serde(default)]
    pub mode: Option<ComparisonMode>,
    /// Effect of a change. Falls back to the type default.
    #[serde(default)]
    pub effect: Option<ChangeEffect>,
    /// Identity key for collection elements; scalar elements `x` are
    /// normalized to `{key: x}` on both sides.
    #[serde(default)]
    pub key: Option<String>,
    /// Scalars compare ignoring ASCII case.
    #[serde(default)]
    pub case_insensitive: bool,
    /// Value injected when the caller does not provide the field.
    #[serde(default)]
    pub default: Option<Value>,
}

/// Lifecycle operations a resource kind supports besides `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Can be started.
    #[serde(default = "default_true")]
    pub start: bool,
    /// Can be stopped.
    #[serde(default = "default_true")]
    pub stop: bool,
    /// Supports in-place updates.
    #[serde(default = "default_true")]
    pub update: bool,
    /// Can be removed.
    #[serde(default = "default_true")]
    pub remove: bool,
}

/// Static definition of a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    /// Kind name.
    pub kind: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Supported lifecycle operations.
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Mode for fields without an explicit mode.
    #[serde(default)]
    pub default_mode: Option<ComparisonMode>,
    /// Effect for fields without an explicit effect.
    #[serde(default = "default_effect")]
    pub default_effect: ChangeEffect,
    /// Whether fields missing from `fields` may be used.
    #[serde(default = "default_true")]
    pub allow_unknown_fields: bool,
    /// Field policies.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldPolicy>,
}

/// Resolved comparison policy for one resource kind.
///
/// Every field resolves to exactly one [`FieldRule`]; fields without an
/// entry use the default mode and an inferred kind.
#[derive(Debug, Clone)]
pub struct ComparisonPolicy {
    default_mode: ComparisonMode,
    default_effect: ChangeEffect,
    fields: BTreeMap<String, FieldPolicy>,
}

/// Fully resolved rule for comparing one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule<'a> {
    /// Comparison mode.
    pub mode: ComparisonMode,
    /// Value kind.
    pub kind: ValueKind,
    /// Effect of a change.
    pub effect: ChangeEffect,
    /// Identity key for collection elements.
    pub key: Option<&'a str>,
    /// Case-insensitive scalar comparison.
    pub case_insensitive: bool,
}

const fn default_true() -> bool {
    true
}

const fn default_effect() -> ChangeEffect {
    ChangeEffect::Recreate
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            start: true,
            stop: true,
            update: true,
            remove: true,
        }
    }
}

impl ValueKind {
    /// Infers a kind from a value: arrays are sets, objects are mappings.
    #[must_use]
    pub const fn infer(value: &Value) -> Self {
        match value {
            Value::Array(_) => Self::Set,
            Value::Object(_) => Self::Mapping,
            _ => Self::Scalar,
        }
    }

    /// Returns the empty value of this kind.
    #[must_use]
    pub fn empty_value(self) -> Value {
        match self {
            Self::Scalar => Value::Null,
            Self::Set | Self::ListOrdered | Self::ListUnordered => Value::Array(Vec::new()),
            Self::Mapping => Value::Object(Map::new()),
        }
    }

    /// Returns true if a desired value has an acceptable shape for this kind.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Scalar => !matches!(value, Value::Array(_) | Value::Object(_)),
            Self::Set | Self::ListOrdered | Self::ListUnordered => matches!(value, Value::Array(_)),
            Self::Mapping => matches!(value, Value::Object(_)),
        }
    }

    /// Returns true for the collection kinds.
    #[must_use]
    pub const fn is_collection(self) -> bool {
        matches!(self, Self::Set | Self::ListOrdered | Self::ListUnordered)
    }
}

impl ResourceType {
    /// Creates a definition with default capabilities and no field policies.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: None,
            capabilities: Capabilities::default(),
            default_mode: None,
            default_effect: default_effect(),
            allow_unknown_fields: true,
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field policy.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, policy: FieldPolicy) -> Self {
        self.fields.insert(name.into(), policy);
        self
    }

    /// Replaces the capability set.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Target used when a resource does not name one.
    #[must_use]
    pub const fn default_target(&self) -> TargetState {
        if self.capabilities.start {
            TargetState::Running
        } else {
            TargetState::Present
        }
    }
}

impl FieldPolicy {
    /// Creates a policy with an explicit kind.
    #[must_use]
    pub fn of_kind(kind: ValueKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Sets the comparison mode.
    #[must_use]
    pub const fn mode(mut self, mode: ComparisonMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the change effect.
    #[must_use]
    pub const fn effect(mut self, effect: ChangeEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Sets the element identity key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Enables case-insensitive scalar comparison.
    #[must_use]
    pub const fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Sets the injected default.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

impl ComparisonPolicy {
    /// Creates a policy with no field entries.
    #[must_use]
    pub const fn new(default_mode: ComparisonMode) -> Self {
        Self {
            default_mode,
            default_effect: ChangeEffect::Recreate,
            fields: BTreeMap::new(),
        }
    }

    /// Builds the policy for a resource type. The type's default mode wins
    /// over the global one.
    #[must_use]
    pub fn for_type(resource_type: &ResourceType, global_default: ComparisonMode) -> Self {
        Self {
            default_mode: resource_type.default_mode.unwrap_or(global_default),
            default_effect: resource_type.default_effect,
            fields: resource_type.fields.clone(),
        }
    }

    /// Adds or replaces a field entry.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, policy: FieldPolicy) -> Self {
        self.fields.insert(name.into(), policy);
        self
    }

    /// Returns the explicit entry for a field, if one exists.
    #[must_use]
    pub fn entry(&self, field: &str) -> Option<&FieldPolicy> {
        self.fields.get(field)
    }

    /// Resolves the rule for a field, inferring the kind from the desired
    /// value when the entry does not declare one.
    #[must_use]
    pub fn rule<'a>(&'a self, field: &str, desired: &Provision) -> FieldRule<'a> {
        let entry = self.fields.get(field);
        let kind = entry
            .and_then(|p| p.kind)
            .or_else(|| desired.value().map(ValueKind::infer))
            .unwrap_or(ValueKind::Scalar);

        FieldRule {
            mode: entry.and_then(|p| p.mode).unwrap_or(self.default_mode),
            kind,
            effect: entry.and_then(|p| p.effect).unwrap_or(self.default_effect),
            key: entry.and_then(|p| p.key.as_deref()),
            case_insensitive: entry.is_some_and(|p| p.case_insensitive),
        }
    }

    /// Applies default-injection rules: every field with a default that the
    /// caller did not provide gets the default as its desired value.
    #[must_use]
    pub fn apply_defaults(&self, desired: &DesiredSpec) -> DesiredSpec {
        let mut resolved = DesiredSpec::new();
        for (name, provision) in desired.iter() {
            let provision = match (provision, self.fields.get(name).and_then(|p| p.default.clone())) {
                (Provision::NotProvided, Some(default)) => Provision::Value(default),
                (p, _) => p.clone(),
            };
            resolved.push(name, provision);
        }

        for (name, policy) in &self.fields {
            if desired.contains(name) {
                continue;
            }
            if let Some(default) = &policy.default {
                resolved.push(name.clone(), Provision::Value(default.clone()));
            }
        }

        resolved
    }

    /// Resolves a desired spec into concrete values for creation or update.
    ///
    /// `Empty` becomes the empty value of the field's kind; unprovided
    /// fields are left out.
    #[must_use]
    pub fn concrete_values(&self, desired: &DesiredSpec) -> Map<String, Value> {
        desired
            .provided()
            .map(|(name, provision)| {
                let value = match provision {
                    Provision::Value(v) => v.clone(),
                    Provision::Empty | Provision::NotProvided => {
                        self.rule(name, provision).kind.empty_value()
                    }
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

impl FromStr for ComparisonMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(Self::Strict),
            "ignore" => Ok(Self::Ignore),
            "allow_more_present" => Ok(Self::AllowMorePresent),
            other => Err(format!(
                "Invalid comparison mode: {other}. Expected: strict, ignore, or allow_more_present"
            )),
        }
    }
}

impl std::fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Strict => "strict",
            Self::Ignore => "ignore",
            Self::AllowMorePresent => "allow_more_present",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scalar => "scalar",
            Self::Set => "set",
            Self::ListOrdered => "ordered list",
            Self::ListUnordered => "unordered list",
            Self::Mapping => "mapping",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ChangeEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Update => "update",
            Self::Recreate => "recreate",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_falls_back_to_defaults() {
        let policy = ComparisonPolicy::new(ComparisonMode::AllowMorePresent);
        let rule = policy.rule("labels", &Provision::Value(json!({"a": "b"})));
        assert_eq!(rule.mode, ComparisonMode::AllowMorePresent);
        assert_eq!(rule.kind, ValueKind::Mapping);
        assert_eq!(rule.effect, ChangeEffect::Recreate);
    }

    #[test]
    fn test_rule_uses_entry() {
        let policy = ComparisonPolicy::new(ComparisonMode::Strict).with_field(
            "networks",
            FieldPolicy::of_kind(ValueKind::Set)
                .effect(ChangeEffect::Update)
                .key("name"),
        );
        let rule = policy.rule("networks", &Provision::Empty);
        assert_eq!(rule.kind, ValueKind::Set);
        assert_eq!(rule.effect, ChangeEffect::Update);
        assert_eq!(rule.key, Some("name"));
        assert_eq!(rule.mode, ComparisonMode::Strict);
    }

    #[test]
    fn test_type_default_mode_overrides_global() {
        let mut rt = ResourceType::new("network");
        rt.default_mode = Some(ComparisonMode::Ignore);
        let policy = ComparisonPolicy::for_type(&rt, ComparisonMode::Strict);
        assert_eq!(
            policy.rule("x", &Provision::Value(json!(1))).mode,
            ComparisonMode::Ignore
        );
    }

    #[test]
    fn test_apply_defaults_injects_only_unprovided() {
        let policy = ComparisonPolicy::new(ComparisonMode::Strict)
            .with_field(
                "restart_policy",
                FieldPolicy::of_kind(ValueKind::Scalar).default_value(json!("no")),
            )
            .with_field(
                "init",
                FieldPolicy::of_kind(ValueKind::Scalar).default_value(json!(false)),
            );

        let desired = DesiredSpec::new()
            .with("image", json!("nginx"))
            .with_unset("restart_policy");
        let resolved = policy.apply_defaults(&desired);

        assert_eq!(resolved.get("restart_policy"), &Provision::Value(json!("no")));
        assert_eq!(resolved.get("init"), &Provision::Value(json!(false)));
        assert_eq!(resolved.get("image"), &Provision::Value(json!("nginx")));

        let explicit = DesiredSpec::new().with("init", json!(true));
        assert_eq!(
            policy.apply_defaults(&explicit).get("init"),
            &Provision::Value(json!(true))
        );
    }

    #[test]
    fn test_concrete_values_expand_empty() {
        let policy = ComparisonPolicy::new(ComparisonMode::Strict)
            .with_field("ports", FieldPolicy::of_kind(ValueKind::ListUnordered));
        let desired = DesiredSpec::new().with_empty("ports").with_unset("cmd");
        let values = policy.concrete_values(&desired);
        assert_eq!(values.get("ports"), Some(&json!([])));
        assert!(!values.contains_key("cmd"));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "allow-more-present".parse::<ComparisonMode>(),
            Ok(ComparisonMode::AllowMorePresent)
        );
        assert!("loose".parse::<ComparisonMode>().is_err());
    }

    #[test]
    fn test_parse_resource_type_yaml() {
        let yaml = r"
kind: volume
capabilities:
  start: false
  stop: false
  update: false
fields:
  driver:
    kind: scalar
  labels:
    kind: dict
    mode: allow_more_present
";
        let rt: ResourceType = serde_yaml::from_str(yaml).unwrap();
        assert!(!rt.capabilities.start);
        assert!(rt.capabilities.remove);
        assert_eq!(rt.default_effect, ChangeEffect::Recreate);
        assert_eq!(rt.fields["labels"].kind, Some(ValueKind::Mapping));
        assert_eq!(rt.default_target(), TargetState::Present);
    }
}
