//! Local file-based resource backend.
//!
//! Resources live in a JSON table under the state directory. Every
//! mutation takes a lock file, re-reads the table from disk, and writes it
//! back atomically. Reads go through an in-memory cache that is only
//! dropped by [`ResourceBackend::invalidate_cache`] or by a mutation.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::BackendError;
use crate::model::{ObservedState, ResourceId};

use super::lock::{LockInfo, generate_holder_id};
use super::record::{ResourceTable, StoredResource};
use super::resource::{BackendResult, CreateRequest, ResourceBackend};

/// Resource table file name.
const TABLE_FILE: &str = "resources.json";

/// Lock file name.
const LOCK_FILE: &str = "resources.lock";

/// Local file-based resource backend.
#[derive(Debug)]
pub struct LocalBackend {
    /// Base directory for state files.
    base_dir: PathBuf,
    /// Path to the resource table.
    table_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
    /// Holder name written into lock files.
    holder: String,
    /// Cached resource table.
    cache: RwLock<Option<ResourceTable>>,
}

fn io_error(operation: &str, context: &str, e: &std::io::Error) -> BackendError {
    BackendError::permanent(operation, format!("{context}: {e}"))
}

impl LocalBackend {
    /// Creates a backend rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let table_path = base_dir.join(TABLE_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            table_path,
            lock_path,
            holder: generate_holder_id(),
            cache: RwLock::new(None),
        }
    }

    /// Overrides the lock holder name.
    #[must_use]
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Returns the state directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the current lock, if one is held and not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file exists but cannot be read.
    pub async fn current_lock(&self) -> BackendResult<Option<LockInfo>> {
        Ok(self
            .read_lock_file("lock")
            .await?
            .filter(|lock| !lock.is_expired()))
    }

    /// Drops the table cache and clears a lock left behind by a crashed
    /// run. A live lock is only cleared with `force`.
    ///
    /// Returns the lock that was removed, if any.
    ///
    /// # Errors
    ///
    /// Returns a conflict if a live lock is held and `force` is not set.
    pub async fn reset(&self, force: bool) -> BackendResult<Option<LockInfo>> {
        self.invalidate_cache();

        let Some(existing) = self.read_lock_file("reset").await? else {
            return Ok(None);
        };
        if !existing.is_expired() && !force {
            return Err(BackendError::Conflict {
                operation: String::from("reset"),
                message: format!(
                    "lock held by {} is still live (expires in {}s)",
                    existing.holder,
                    existing.remaining_secs()
                ),
            });
        }

        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| io_error("reset", "Failed to delete lock file", &e))?;
        info!("Cleared lock {} held by {}", existing.lock_id, existing.holder);
        Ok(Some(existing))
    }

    fn cached(&self) -> Option<ResourceTable> {
        self.cache.read().ok().and_then(|cache| cache.clone())
    }

    fn store_cache(&self, table: Option<ResourceTable>) {
        if let Ok(mut cache) = self.cache.write() {
            *cache = table;
        }
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self, operation: &str) -> BackendResult<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| io_error(operation, "Failed to create state directory", &e))?;
        }
        Ok(())
    }

    async fn read_table(&self, operation: &str) -> BackendResult<ResourceTable> {
        if !self.table_path.exists() {
            debug!("Resource table does not exist: {}", self.table_path.display());
            return Ok(ResourceTable::default());
        }

        let content = fs::read_to_string(&self.table_path)
            .await
            .map_err(|e| io_error(operation, "Failed to read resource table", &e))?;

        serde_json::from_str(&content).map_err(|e| {
            BackendError::permanent(operation, format!("Failed to parse resource table: {e}"))
        })
    }

    /// Loads the table through the cache.
    async fn load(&self, operation: &str) -> BackendResult<ResourceTable> {
        if let Some(table) = self.cached() {
            return Ok(table);
        }
        let table = self.read_table(operation).await?;
        self.store_cache(Some(table.clone()));
        Ok(table)
    }

    /// Writes the table to a temporary file, then renames it into place.
    async fn save(&self, operation: &str, table: &ResourceTable) -> BackendResult<()> {
        self.ensure_dir(operation).await?;

        let content = serde_json::to_string_pretty(table).map_err(|e| {
            BackendError::permanent(operation, format!("Failed to serialize resource table: {e}"))
        })?;

        let temp_path = self.table_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| io_error(operation, "Failed to create temp table file", &e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| io_error(operation, "Failed to write table file", &e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error(operation, "Failed to sync table file", &e))?;

        fs::rename(&temp_path, &self.table_path)
            .await
            .map_err(|e| io_error(operation, "Failed to rename table file", &e))?;

        debug!("Resource table saved to {}", self.table_path.display());
        Ok(())
    }

    async fn read_lock_file(&self, operation: &str) -> BackendResult<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path)
            .await
            .map_err(|e| io_error(operation, "Failed to read lock file", &e))?;

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| BackendError::permanent(operation, format!("Failed to parse lock file: {e}")))
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        if let Some(existing) = self.read_lock_file(operation).await? {
            if !existing.is_expired() && existing.holder != self.holder {
                return Err(BackendError::Conflict {
                    operation: operation.to_string(),
                    message: format!(
                        "state is locked by {} since {} (expires in {}s)",
                        existing.holder,
                        existing.acquired_at.to_rfc3339(),
                        existing.remaining_secs()
                    ),
                });
            }
            debug!("Taking over lock held by {}", existing.holder);
        }

        self.ensure_dir(operation).await?;
        let lock = LockInfo::new(&self.holder);
        let content = serde_json::to_string_pretty(&lock).map_err(|e| {
            BackendError::permanent(operation, format!("Failed to serialize lock: {e}"))
        })?;
        fs::write(&self.lock_path, content)
            .await
            .map_err(|e| io_error(operation, "Failed to write lock file", &e))?;

        debug!("Acquired lock {}", lock.lock_id);
        Ok(lock)
    }

    async fn release_lock(&self, operation: &str, lock: &LockInfo) -> BackendResult<()> {
        match self.read_lock_file(operation).await? {
            Some(existing) if existing.lock_id == lock.lock_id => {
                fs::remove_file(&self.lock_path)
                    .await
                    .map_err(|e| io_error(operation, "Failed to delete lock file", &e))?;
                debug!("Released lock {}", lock.lock_id);
            }
            Some(existing) => {
                debug!(
                    "Lock ID mismatch: expected {}, found {}",
                    lock.lock_id, existing.lock_id
                );
            }
            None => {}
        }
        Ok(())
    }

    /// Runs a mutation under the lock against a freshly read table.
    async fn mutate<T>(
        &self,
        operation: &str,
        apply: impl FnOnce(&mut ResourceTable) -> BackendResult<T> + Send,
    ) -> BackendResult<T> {
        let lock = self.acquire_lock(operation).await?;

        let outcome = async {
            let mut table = self.read_table(operation).await?;
            let value = apply(&mut table)?;
            self.save(operation, &table).await?;
            self.store_cache(Some(table));
            Ok(value)
        }
        .await;

        if outcome.is_err() {
            self.store_cache(None);
        }
        self.release_lock(operation, &lock).await?;
        outcome
    }
}

#[async_trait]
impl ResourceBackend for LocalBackend {
    async fn fetch(&self, resource: &ResourceId) -> BackendResult<Option<ObservedState>> {
        let table = self.load("fetch").await?;
        Ok(table.find(resource).map(StoredResource::to_observed))
    }

    async fn create(&self, resource: &ResourceId, request: &CreateRequest) -> BackendResult<String> {
        let id = self.mutate("create", |table| table.create(resource, request)).await?;
        info!("Created {resource} (ID: {id})");
        Ok(id)
    }

    async fn start(&self, backend_id: &str) -> BackendResult<()> {
        self.mutate("start", |table| table.start(backend_id)).await
    }

    async fn stop(&self, backend_id: &str, timeout: Duration) -> BackendResult<()> {
        debug!("Stopping {backend_id} (timeout {}s)", timeout.as_secs());
        self.mutate("stop", |table| table.stop(backend_id)).await
    }

    async fn remove(&self, backend_id: &str, force: bool) -> BackendResult<()> {
        self.mutate("remove", |table| table.remove(backend_id, force)).await
    }

    async fn update(&self, backend_id: &str, patch: &Map<String, Value>) -> BackendResult<()> {
        self.mutate("update", |table| table.update(backend_id, patch)).await
    }

    async fn list(&self) -> BackendResult<Vec<ObservedState>> {
        Ok(self.load("list").await?.observe_all())
    }

    fn invalidate_cache(&self) {
        debug!("Invalidating resource table cache");
        self.store_cache(None);
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
