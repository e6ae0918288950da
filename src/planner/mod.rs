//! Planning module for reconciliation.
//!
//! This module compares desired and observed state field by field,
//! classifies the difference, turns it into an ordered action plan, and
//! executes that plan against a backend.

mod compare;
mod diff;
mod executor;
mod plan;

pub use compare::{Comparison, compare};
pub use diff::{Classification, DiffEngine, DiffReport, FieldDiff, Requirement};
pub use executor::{ExecutionResult, PlanExecutor, StepOutcome};
pub use plan::{ActionPlan, Operation, PlanStep, Precondition, RunMode};
