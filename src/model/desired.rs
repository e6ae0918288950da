//! Desired state supplied by the caller.
//!
//! The key distinction here is between a field the caller never mentioned
//! and a field the caller explicitly emptied. Both tend to serialize to the
//! same empty value, but only the second one may cause a diff.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Tri-state "was this field provided" flag with its value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Provision {
    /// The caller did not mention the field. It never causes a diff.
    #[default]
    NotProvided,
    /// The caller explicitly asked for the empty value of the field's kind.
    Empty,
    /// The caller provided a concrete value.
    Value(Value),
}

/// Ordered desired-state specification for one resource.
///
/// Field order is preserved so that diff output is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredSpec {
    fields: Vec<(String, Provision)>,
}

impl Provision {
    /// Converts a raw configuration value. `null` means "explicitly empty".
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        if value.is_null() {
            Self::Empty
        } else {
            Self::Value(value)
        }
    }

    /// Returns true unless the field was not provided.
    #[must_use]
    pub const fn is_provided(&self) -> bool {
        !matches!(self, Self::NotProvided)
    }

    /// Returns the concrete value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::NotProvided | Self::Empty => None,
        }
    }
}

impl DesiredSpec {
    /// Creates an empty spec.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Builds a spec from a configuration mapping, keeping key order.
    ///
    /// Keys missing from the mapping are simply not provided.
    #[must_use]
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let fields = map
            .iter()
            .map(|(k, v)| (k.clone(), Provision::from_value(v.clone())))
            .collect();
        Self { fields }
    }

    /// Appends a field with a concrete value.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.push(field, Provision::Value(value));
        self
    }

    /// Appends a field explicitly set to empty.
    #[must_use]
    pub fn with_empty(mut self, field: impl Into<String>) -> Self {
        self.push(field, Provision::Empty);
        self
    }

    /// Appends a field that is explicitly marked as not provided.
    #[must_use]
    pub fn with_unset(mut self, field: impl Into<String>) -> Self {
        self.push(field, Provision::NotProvided);
        self
    }

    /// Appends a field. Duplicates are kept and rejected at validation.
    pub fn push(&mut self, field: impl Into<String>, provision: Provision) {
        self.fields.push((field.into(), provision));
    }

    /// Looks up a field's provision. Unknown fields are not provided.
    #[must_use]
    pub fn get(&self, field: &str) -> &Provision {
        static NOT_PROVIDED: Provision = Provision::NotProvided;
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map_or(&NOT_PROVIDED, |(_, p)| p)
    }

    /// Returns true if the field appears in the spec with any provision.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == field)
    }

    /// Iterates over all fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Provision)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over provided fields only, in declaration order.
    pub fn provided(&self) -> impl Iterator<Item = (&str, &Provision)> {
        self.iter().filter(|(_, p)| p.is_provided())
    }

    /// Returns the number of fields, provided or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the spec has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for DesiredSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: Map<String, Value> = self
            .provided()
            .map(|(k, p)| (k.to_string(), p.value().cloned().unwrap_or(Value::Null)))
            .collect();
        map.serialize(serializer)
    }
}
