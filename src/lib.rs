// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Dockhand
//!
//! A declarative, idempotent reconciler for Docker-style resources.
//!
//! ## Overview
//!
//! Dockhand compares a desired spec with the observed state of a resource
//! and applies the smallest set of operations that converges them:
//!
//! - Fields are compared under a per-field policy (`strict`, `ignore`,
//!   `allow_more_present`) that understands scalars, sets, ordered and
//!   unordered lists, and mappings
//! - Each changed field is classified as updatable in place or requiring
//!   recreation
//! - Plans are ordered `stop`/`remove`/`create`/`start`/`update` steps with
//!   lifecycle preconditions, executed in order with bounded retries for
//!   idempotent steps only
//!
//! ## Architecture
//!
//! 1. **Desired state**: a [`model::DesiredSpec`] where each field is
//!    provided, explicitly empty, or not provided
//! 2. **Observed state**: fetched fresh from a [`backend::ResourceBackend`]
//! 3. **Reconciler**: diffs, plans, executes, and re-fetches the ground truth
//!
//! ## Modules
//!
//! - [`model`]: Desired and observed state, comparison policies, resource types
//! - [`config`]: Configuration parsing, type registry, validation, hashing
//! - [`planner`]: Field comparison, diffing, action planning, execution
//! - [`reconciler`]: Per-resource and configuration-wide reconciliation
//! - [`backend`]: Backend trait plus memory and local file implementations
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! resources:
//!   - kind: container
//!     name: web
//!     state: running
//!     spec:
//!       image: nginx:1.27
//!       published_ports: ["8080:80"]
//!       env: null          # explicitly empty
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod planner;
pub mod reconciler;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{LocalBackend, MemoryBackend, ResourceBackend};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DockhandConfig, SpecHasher, TypeRegistry};
pub use error::{DockhandError, Result};
pub use model::{ComparisonMode, ComparisonPolicy, DesiredSpec, ObservedState, Provision, ResourceId, TargetState};
pub use planner::{ActionPlan, DiffEngine, DiffReport, PlanExecutor, RunMode};
pub use reconciler::{DriftReport, ReconcileRequest, ReconciliationResult, Reconciler};
