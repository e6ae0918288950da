//! Resource differ.
//!
//! This module compares every provided field of a desired spec against an
//! observed snapshot and classifies the overall change.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{
    ChangeEffect, ComparisonMode, ComparisonPolicy, DesiredSpec, ObservedState, Provision,
    ValueKind,
};

use super::compare::compare;

/// Engine for computing field-level diffs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

/// What a single field difference requires. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Nothing to do.
    None,
    /// In-place update.
    Update,
    /// Destroy and recreate.
    Recreate,
}

/// Aggregate classification of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Observed matches desired.
    Identical,
    /// All differences can be applied in place.
    Updatable,
    /// At least one difference requires recreation.
    MustRecreate,
}

/// Result of comparing one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    /// Field name.
    pub field: String,
    /// Whether the field matches.
    pub equal: bool,
    /// What a mismatch requires. `None` when equal.
    pub requires: Requirement,
    /// Mode the field was compared under.
    pub mode: ComparisonMode,
    /// Kind the field was compared as.
    pub kind: ValueKind,
    /// Observed value, if the backend reported one.
    pub before: Option<Value>,
    /// Resolved desired value.
    pub after: Value,
}

/// Ordered field diffs plus their aggregate classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffReport {
    /// Field diffs in desired-spec order.
    pub fields: Vec<FieldDiff>,
    /// Maximum severity across all fields.
    pub classification: Classification,
}

impl DiffEngine {
    /// Diffs a desired spec against an observed snapshot.
    ///
    /// Only provided fields are compared; the emitted order follows the
    /// desired spec.
    #[must_use]
    pub fn diff(
        desired: &DesiredSpec,
        observed: &ObservedState,
        policy: &ComparisonPolicy,
    ) -> DiffReport {
        let fields: Vec<FieldDiff> = desired
            .provided()
            .map(|(name, provision)| Self::diff_field(name, provision, observed, policy))
            .collect();

        let classification = fields
            .iter()
            .map(|f| f.requires)
            .max()
            .map_or(Classification::Identical, Classification::from);

        debug!(
            "Diff for {}: {} field(s) compared, {}",
            observed.resource,
            fields.len(),
            classification
        );

        DiffReport {
            fields,
            classification,
        }
    }

    fn diff_field(
        name: &str,
        provision: &Provision,
        observed: &ObservedState,
        policy: &ComparisonPolicy,
    ) -> FieldDiff {
        let rule = policy.rule(name, provision);
        let before = observed.field(name).cloned();
        let equal = compare(provision, before.as_ref(), &rule).is_equal();

        let requires = if equal {
            Requirement::None
        } else {
            match rule.effect {
                ChangeEffect::Update => Requirement::Update,
                ChangeEffect::Recreate => Requirement::Recreate,
            }
        };

        if !equal {
            debug!("Field {name} differs ({} {}, {})", rule.mode, rule.kind, requires);
        }

        FieldDiff {
            field: name.to_string(),
            equal,
            requires,
            mode: rule.mode,
            kind: rule.kind,
            before,
            after: provision
                .value()
                .cloned()
                .unwrap_or_else(|| rule.kind.empty_value()),
        }
    }
}

impl DiffReport {
    /// Returns true if nothing differs.
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.classification == Classification::Identical
    }

    /// Returns the fields that differ.
    pub fn changed(&self) -> impl Iterator<Item = &FieldDiff> {
        self.fields.iter().filter(|f| !f.equal)
    }

    /// Returns the names of differing fields.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<String> {
        self.changed().map(|f| f.field.clone()).collect()
    }

    /// Builds the patch of desired values for the differing fields.
    #[must_use]
    pub fn patch(&self) -> Map<String, Value> {
        self.changed()
            .map(|f| (f.field.clone(), f.after.clone()))
            .collect()
    }

    /// Returns `(before, after)` mappings restricted to differing fields.
    #[must_use]
    pub fn before_after(&self) -> (Map<String, Value>, Map<String, Value>) {
        let before = self
            .changed()
            .map(|f| (f.field.clone(), f.before.clone().unwrap_or(Value::Null)))
            .collect();
        (before, self.patch())
    }
}

impl From<Requirement> for Classification {
    fn from(requirement: Requirement) -> Self {
        match requirement {
            Requirement::None => Self::Identical,
            Requirement::Update => Self::Updatable,
            Requirement::Recreate => Self::MustRecreate,
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Update => "update",
            Self::Recreate => "recreate",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Identical => "identical",
            Self::Updatable => "updatable",
            Self::MustRecreate => "must recreate",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.equal {
            return write!(f, "{}: unchanged", self.field);
        }
        let before = self
            .before
            .as_ref()
            .map_or_else(|| String::from("<unset>"), ToString::to_string);
        write!(f, "{}: {} -> {} ({})", self.field, before, self.after, self.requires)
    }
}
