//! Core data model for reconciliation.
//!
//! This module defines the desired and observed sides of a reconciliation,
//! the resource lifecycle, and the per-field comparison policy that the
//! planner consumes.

mod desired;
mod observed;
mod policy;
mod resource;

pub use desired::{DesiredSpec, Provision};
pub use observed::ObservedState;
pub use policy::{
    Capabilities, ChangeEffect, ComparisonMode, ComparisonPolicy, FieldPolicy, FieldRule,
    ResourceType, ValueKind,
};
pub use resource::{Lifecycle, ResourceId, TargetState};
