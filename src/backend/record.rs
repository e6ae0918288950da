//! Resource records shared by the in-process backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::BackendError;
use crate::model::{Lifecycle, ObservedState, ResourceId};

use super::resource::{BackendResult, CreateRequest};

/// A resource as stored by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    /// Backend identifier.
    pub id: String,
    /// Resource identity.
    pub resource: ResourceId,
    /// Current lifecycle.
    pub lifecycle: Lifecycle,
    /// Field values.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Spec hash recorded at creation.
    #[serde(default)]
    pub spec_hash: Option<String>,
    /// When the resource was created.
    pub created_at: DateTime<Utc>,
    /// When the resource last changed.
    pub updated_at: DateTime<Utc>,
}

/// Table of stored resources keyed by backend identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTable {
    /// Resources by backend identifier.
    #[serde(default)]
    pub resources: BTreeMap<String, StoredResource>,
}

impl StoredResource {
    /// Creates a new record in the `created` lifecycle.
    #[must_use]
    pub fn new(resource: ResourceId, request: &CreateRequest) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4().simple().to_string();
        Self {
            id: id[..12].to_string(),
            resource,
            lifecycle: Lifecycle::Created,
            fields: request.fields.clone(),
            spec_hash: request.spec_hash.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Converts the record into an observed snapshot.
    #[must_use]
    pub fn to_observed(&self) -> ObservedState {
        let mut observed = ObservedState::present(
            self.resource.clone(),
            self.id.clone(),
            self.lifecycle,
            self.fields.clone(),
        );
        observed.spec_hash.clone_from(&self.spec_hash);
        observed
    }

    fn touch(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
        self.updated_at = Utc::now();
    }
}

impl ResourceTable {
    /// Finds a resource by identity.
    #[must_use]
    pub fn find(&self, resource: &ResourceId) -> Option<&StoredResource> {
        self.resources.values().find(|r| &r.resource == resource)
    }

    /// Creates a resource. Fails with a conflict if the name is taken.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Conflict` if a resource with the same kind and
    /// name already exists.
    pub fn create(&mut self, resource: &ResourceId, request: &CreateRequest) -> BackendResult<String> {
        if let Some(existing) = self.find(resource) {
            return Err(BackendError::Conflict {
                operation: String::from("create"),
                message: format!("{resource} already exists (ID: {})", existing.id),
            });
        }
        let record = StoredResource::new(resource.clone(), request);
        let id = record.id.clone();
        self.resources.insert(id.clone(), record);
        Ok(id)
    }

    /// Marks a resource as running.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown identifiers and `Conflict` for
    /// resources that are being removed.
    pub fn start(&mut self, id: &str) -> BackendResult<()> {
        let record = self.get_mut(id)?;
        if record.lifecycle == Lifecycle::Removing {
            return Err(BackendError::Conflict {
                operation: String::from("start"),
                message: format!("{} is being removed", record.resource),
            });
        }
        record.touch(Lifecycle::Running);
        Ok(())
    }

    /// Marks a resource as stopped.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown identifiers.
    pub fn stop(&mut self, id: &str) -> BackendResult<()> {
        let record = self.get_mut(id)?;
        if record.lifecycle.is_running() {
            record.touch(Lifecycle::Stopped);
        }
        Ok(())
    }

    /// Merges changed fields into a resource.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown identifiers.
    pub fn update(&mut self, id: &str, patch: &Map<String, Value>) -> BackendResult<()> {
        let record = self.get_mut(id)?;
        for (field, value) in patch {
            record.fields.insert(field.clone(), value.clone());
        }
        let lifecycle = record.lifecycle;
        record.touch(lifecycle);
        Ok(())
    }

    /// Removes a resource. Removing an unknown identifier is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when a running resource is removed without `force`.
    pub fn remove(&mut self, id: &str, force: bool) -> BackendResult<()> {
        let Some(record) = self.resources.get_mut(id) else {
            debug!("Resource {id} already absent, nothing to remove");
            return Ok(());
        };
        if record.lifecycle.is_running() && !force {
            return Err(BackendError::Conflict {
                operation: String::from("remove"),
                message: format!("{} is running; stop it or force removal", record.resource),
            });
        }
        self.resources.remove(id);
        Ok(())
    }

    /// Snapshots every resource, ordered by identity.
    #[must_use]
    pub fn observe_all(&self) -> Vec<ObservedState> {
        let mut all: Vec<ObservedState> = self.resources.values().map(StoredResource::to_observed).collect();
        all.sort_by(|a, b| a.resource.cmp(&b.resource));
        all
    }

    fn get_mut(&mut self, id: &str) -> BackendResult<&mut StoredResource> {
        self.resources
            .get_mut(id)
            .ok_or_else(|| BackendError::not_found(id))
    }
}
