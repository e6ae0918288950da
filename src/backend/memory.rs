//! In-memory resource backend.
//!
//! Keeps resources in process, records every call, and can be told to fail
//! specific operations. Used by tests and by library consumers that want
//! to exercise reconciliation without a real engine.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::BackendError;
use crate::model::{Lifecycle, ObservedState, ResourceId};

use super::record::{ResourceTable, StoredResource};
use super::resource::{BackendResult, CreateRequest, ResourceBackend};

/// Backend operation, used for call recording and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    /// `fetch`
    Fetch,
    /// `create`
    Create,
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `remove`
    Remove,
    /// `update`
    Update,
    /// `list`
    List,
}

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    /// Operation invoked.
    pub op: BackendOp,
    /// Resource key or backend identifier the call targeted.
    pub target: String,
}

/// In-memory resource backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    invalidations: AtomicUsize,
}

#[derive(Debug, Default)]
struct MemoryState {
    table: ResourceTable,
    calls: Vec<BackendCall>,
    failures: HashMap<BackendOp, VecDeque<BackendError>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a resource directly, bypassing the call log.
    pub async fn insert(
        &self,
        resource: ResourceId,
        lifecycle: Lifecycle,
        fields: Map<String, Value>,
    ) -> String {
        let mut record = StoredResource::new(
            resource,
            &CreateRequest {
                fields,
                spec_hash: None,
            },
        );
        record.lifecycle = lifecycle;
        let id = record.id.clone();
        self.state.lock().await.table.resources.insert(id.clone(), record);
        id
    }

    /// Makes the next call of `op` fail with `error`. Queued failures are
    /// consumed in order.
    pub async fn fail_next(&self, op: BackendOp, error: BackendError) {
        self.state
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Returns every call made so far.
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().await.calls.clone()
    }

    /// Counts calls of one operation.
    pub async fn call_count(&self, op: BackendOp) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.op == op)
            .count()
    }

    /// Returns true if any mutating call was made.
    pub async fn mutated(&self) -> bool {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .any(|c| !matches!(c.op, BackendOp::Fetch | BackendOp::List))
    }

    /// Clears the call log.
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Mutates a stored resource's field outside of reconciliation.
    pub async fn set_field(&self, resource: &ResourceId, field: &str, value: Value) {
        let mut state = self.state.lock().await;
        if let Some(record) = state
            .table
            .resources
            .values_mut()
            .find(|r| &r.resource == resource)
        {
            record.fields.insert(field.to_string(), value);
        }
    }

    /// Number of cache invalidations requested.
    #[must_use]
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Records a call and pops any injected failure for it.
    async fn enter(&self, op: BackendOp, target: &str) -> BackendResult<tokio::sync::MutexGuard<'_, MemoryState>> {
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall {
            op,
            target: target.to_string(),
        });
        if let Some(err) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            debug!("Injected failure for {op:?} on {target}: {err}");
            return Err(err);
        }
        Ok(state)
    }
}

#[async_trait]
impl ResourceBackend for MemoryBackend {
    async fn fetch(&self, resource: &ResourceId) -> BackendResult<Option<ObservedState>> {
        let state = self.enter(BackendOp::Fetch, &resource.key()).await?;
        Ok(state.table.find(resource).map(StoredResource::to_observed))
    }

    async fn create(&self, resource: &ResourceId, request: &CreateRequest) -> BackendResult<String> {
        let mut state = self.enter(BackendOp::Create, &resource.key()).await?;
        state.table.create(resource, request)
    }

    async fn start(&self, backend_id: &str) -> BackendResult<()> {
        let mut state = self.enter(BackendOp::Start, backend_id).await?;
        state.table.start(backend_id)
    }

    async fn stop(&self, backend_id: &str, _timeout: Duration) -> BackendResult<()> {
        let mut state = self.enter(BackendOp::Stop, backend_id).await?;
        state.table.stop(backend_id)
    }

    async fn remove(&self, backend_id: &str, force: bool) -> BackendResult<()> {
        let mut state = self.enter(BackendOp::Remove, backend_id).await?;
        state.table.remove(backend_id, force)
    }

    async fn update(&self, backend_id: &str, patch: &Map<String, Value>) -> BackendResult<()> {
        let mut state = self.enter(BackendOp::Update, backend_id).await?;
        state.table.update(backend_id, patch)
    }

    async fn list(&self) -> BackendResult<Vec<ObservedState>> {
        let state = self.enter(BackendOp::List, "*").await?;
        Ok(state.table.observe_all())
    }

    fn invalidate_cache(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let backend = MemoryBackend::new();
        let web = ResourceId::new("container", "web");
        backend
            .fail_next(BackendOp::Fetch, BackendError::transient("fetch", "reset"))
            .await;

        assert!(backend.fetch(&web).await.is_err());
        assert!(backend.fetch(&web).await.unwrap().is_none());
        assert_eq!(backend.call_count(BackendOp::Fetch).await, 2);
    }

    #[tokio::test]
    async fn test_seeded_resource_is_observed() {
        let backend = MemoryBackend::new();
        let web = ResourceId::new("container", "web");
        let mut fields = Map::new();
        fields.insert(String::from("image"), json!("nginx"));
        let id = backend.insert(web.clone(), Lifecycle::Running, fields).await;

        let observed = backend.fetch(&web).await.unwrap().unwrap();
        assert_eq!(observed.backend_id.as_deref(), Some(id.as_str()));
        assert_eq!(observed.lifecycle, Lifecycle::Running);
        assert!(!backend.mutated().await);
    }

    #[tokio::test]
    async fn test_remove_missing_is_a_no_op() {
        let backend = MemoryBackend::new();
        backend.remove("nope", true).await.unwrap();
        assert!(backend.list().await.unwrap().is_empty());
        assert!(backend.mutated().await);
    }
}
