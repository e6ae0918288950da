//! Observed state snapshots read from a backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::resource::{Lifecycle, ResourceId};

/// Snapshot of a resource as read from the backend.
///
/// Taken once per reconciliation attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    /// Resource identity.
    pub resource: ResourceId,
    /// Backend-assigned identifier, if the resource exists.
    #[serde(default)]
    pub backend_id: Option<String>,
    /// Lifecycle status.
    pub lifecycle: Lifecycle,
    /// Field values as reported by the backend.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Spec hash recorded at creation time, if the backend keeps one.
    #[serde(default)]
    pub spec_hash: Option<String>,
    /// When the snapshot was taken.
    pub observed_at: DateTime<Utc>,
}

impl ObservedState {
    /// Creates a snapshot of a resource that does not exist.
    #[must_use]
    pub fn absent(resource: ResourceId) -> Self {
        Self {
            resource,
            backend_id: None,
            lifecycle: Lifecycle::Absent,
            fields: Map::new(),
            spec_hash: None,
            observed_at: Utc::now(),
        }
    }

    /// Creates a snapshot of an existing resource.
    #[must_use]
    pub fn present(
        resource: ResourceId,
        backend_id: impl Into<String>,
        lifecycle: Lifecycle,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            resource,
            backend_id: Some(backend_id.into()),
            lifecycle,
            fields,
            spec_hash: None,
            observed_at: Utc::now(),
        }
    }

    /// Returns the observed value of a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true if the resource exists.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.lifecycle.is_present()
    }
}
