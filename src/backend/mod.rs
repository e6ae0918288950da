//! Resource backends.
//!
//! This module defines the [`ResourceBackend`] collaborator the reconciler
//! drives, plus two in-process implementations: a fault-injectable memory
//! backend and a lock-protected JSON file backend.

mod local;
mod lock;
mod memory;
mod record;
mod resource;

pub use local::LocalBackend;
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use memory::{BackendCall, BackendOp, MemoryBackend};
pub use record::{ResourceTable, StoredResource};
#[cfg(test)]
pub use resource::MockResourceBackend;
pub use resource::{BackendResult, CreateRequest, ResourceBackend};
