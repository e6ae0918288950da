//! Resource backend trait definition.
//!
//! This module defines the interface the reconciler uses to observe and
//! mutate resources. Implementations own all transport concerns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::BackendError;
use crate::model::{ObservedState, ResourceId};

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Everything a backend needs to create a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Concrete field values.
    pub fields: Map<String, Value>,
    /// Hash of the desired spec the resource is created from.
    #[serde(default)]
    pub spec_hash: Option<String>,
}

/// Trait for resource backends.
///
/// Every error is tagged transient or permanent through [`BackendError`].
/// `remove` of an already-absent resource succeeds. Backends that cannot
/// tell may return `NotFound`, which the executor also treats as success.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Reads the current state of a resource.
    ///
    /// Returns `None` if the resource does not exist.
    async fn fetch(&self, resource: &ResourceId) -> BackendResult<Option<ObservedState>>;

    /// Creates a resource and returns its backend identifier.
    async fn create(&self, resource: &ResourceId, request: &CreateRequest) -> BackendResult<String>;

    /// Starts a resource.
    async fn start(&self, backend_id: &str) -> BackendResult<()>;

    /// Stops a resource, waiting at most `timeout` for it to exit.
    async fn stop(&self, backend_id: &str, timeout: Duration) -> BackendResult<()>;

    /// Removes a resource.
    async fn remove(&self, backend_id: &str, force: bool) -> BackendResult<()>;

    /// Applies changed fields to a live resource.
    async fn update(&self, backend_id: &str, patch: &Map<String, Value>) -> BackendResult<()>;

    /// Lists every resource the backend knows about.
    async fn list(&self) -> BackendResult<Vec<ObservedState>>;

    /// Drops any cached lookups so the next call reads fresh data.
    fn invalidate_cache(&self) {}

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl ResourceBackend for Box<dyn ResourceBackend> {
    async fn fetch(&self, resource: &ResourceId) -> BackendResult<Option<ObservedState>> {
        (**self).fetch(resource).await
    }

    async fn create(&self, resource: &ResourceId, request: &CreateRequest) -> BackendResult<String> {
        (**self).create(resource, request).await
    }

    async fn start(&self, backend_id: &str) -> BackendResult<()> {
        (**self).start(backend_id).await
    }

    async fn stop(&self, backend_id: &str, timeout: Duration) -> BackendResult<()> {
        (**self).stop(backend_id, timeout).await
    }

    async fn remove(&self, backend_id: &str, force: bool) -> BackendResult<()> {
        (**self).remove(backend_id, force).await
    }

    async fn update(&self, backend_id: &str, patch: &Map<String, Value>) -> BackendResult<()> {
        (**self).update(backend_id, patch).await
    }

    async fn list(&self) -> BackendResult<Vec<ObservedState>> {
        (**self).list().await
    }

    fn invalidate_cache(&self) {
        (**self).invalidate_cache();
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
