//! Action plan types and construction.
//!
//! This module turns a diff classification plus the current and target
//! lifecycles into an ordered list of backend operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::model::{Capabilities, Lifecycle, ResourceId, TargetState};

use super::diff::{Classification, DiffReport};

/// Whether a plan is executed or only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Execute mutating operations.
    #[default]
    Normal,
    /// Compute the plan but never mutate.
    Check,
}

/// Abstract backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create the resource.
    Create,
    /// Start the resource.
    Start,
    /// Stop the resource.
    Stop,
    /// Apply changed fields in place.
    Update,
    /// Remove the resource.
    Remove,
}

/// Lifecycle condition that must hold before a step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// The resource does not exist.
    Absent,
    /// The resource exists.
    Present,
    /// The resource is running.
    Running,
    /// The resource exists and is not running.
    NotRunning,
}

/// A single step of an action plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    /// Operation to perform.
    pub operation: Operation,
    /// Lifecycle required before running.
    pub precondition: Precondition,
    /// Why this step is needed.
    pub reason: String,
    /// Whether the step may be retried on transient failure.
    pub retry_safe: bool,
    /// Fields carried by an update step.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// Ordered operations that converge one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ActionPlan {
    /// Resource the plan applies to.
    pub resource: ResourceId,
    /// Steps in execution order.
    pub steps: Vec<PlanStep>,
    /// Diff classification the plan was built from.
    pub classification: Classification,
    /// Lifecycle observed when planning.
    pub current: Lifecycle,
    /// Requested target.
    pub target: TargetState,
    /// Check-mode plans must not be executed.
    pub dry: bool,
    /// Hash of the resolved desired spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
}

/// Internal builder that accumulates steps and capability failures.
struct Planner<'a> {
    resource: &'a ResourceId,
    current: Lifecycle,
    target: TargetState,
    capabilities: &'a Capabilities,
    steps: Vec<PlanStep>,
}

impl Operation {
    /// Returns true if the operation may be retried on transient failure.
    ///
    /// Stop and remove are idempotent; create, start and update are not.
    #[must_use]
    pub const fn is_retry_safe(self) -> bool {
        matches!(self, Self::Stop | Self::Remove)
    }

    /// Precondition each operation requires.
    #[must_use]
    pub const fn precondition(self) -> Precondition {
        match self {
            Self::Create => Precondition::Absent,
            Self::Start => Precondition::NotRunning,
            Self::Stop => Precondition::Running,
            Self::Update | Self::Remove => Precondition::Present,
        }
    }

    /// Lifecycle after the operation succeeds, given the one before.
    #[must_use]
    pub const fn next_lifecycle(self, before: Lifecycle) -> Lifecycle {
        match self {
            Self::Create => Lifecycle::Created,
            Self::Start => Lifecycle::Running,
            Self::Stop => Lifecycle::Stopped,
            Self::Update => before,
            Self::Remove => Lifecycle::Absent,
        }
    }
}

impl Precondition {
    /// Returns true if the condition holds for a lifecycle.
    #[must_use]
    pub const fn holds(self, lifecycle: Lifecycle) -> bool {
        match self {
            Self::Absent => !lifecycle.is_present(),
            Self::Present => lifecycle.is_present(),
            Self::Running => lifecycle.is_running(),
            Self::NotRunning => lifecycle.is_present() && !lifecycle.is_running(),
        }
    }
}

impl Planner<'_> {
    fn push(&mut self, operation: Operation, reason: impl Into<String>) {
        self.steps.push(PlanStep {
            operation,
            precondition: operation.precondition(),
            reason: reason.into(),
            retry_safe: operation.is_retry_safe(),
            fields: Vec::new(),
        });
    }

    fn unreachable(&self, reason: impl Into<String>) -> PlanError {
        PlanError::Unreachable {
            kind: self.resource.kind.clone(),
            name: self.resource.name.clone(),
            current: self.current.to_string(),
            target: self.target.to_string(),
            reason: reason.into(),
        }
    }

    fn require(&self, allowed: bool, operation: &str) -> Result<(), PlanError> {
        if allowed {
            Ok(())
        } else {
            Err(self.unreachable(format!("kind '{}' cannot be {operation}", self.resource.kind)))
        }
    }

    /// Steps that take an existing resource from `running` to the target.
    fn transition(&mut self, running: bool) -> Result<(), PlanError> {
        match self.target {
            TargetState::Running if !running => {
                self.require(self.capabilities.start, "started")?;
                self.push(Operation::Start, "Resource is not running");
            }
            TargetState::Stopped if running => {
                self.require(self.capabilities.stop, "stopped")?;
                self.push(Operation::Stop, "Resource is running");
            }
            _ => {}
        }
        Ok(())
    }

    /// Steps that destroy the existing resource.
    fn teardown(&mut self, reason: &str) -> Result<(), PlanError> {
        self.require(self.capabilities.remove, "removed")?;
        if self.current.is_running() && self.capabilities.stop {
            self.push(Operation::Stop, reason);
        }
        self.push(Operation::Remove, reason);
        Ok(())
    }

    /// Steps that bring a nonexistent resource to the target.
    fn build(&mut self, reason: &str) -> Result<(), PlanError> {
        if self.target == TargetState::Running {
            self.require(self.capabilities.start, "started")?;
        }
        self.push(Operation::Create, reason);
        if self.target == TargetState::Running {
            self.push(Operation::Start, reason);
        }
        Ok(())
    }

    fn plan(&mut self, diff: &DiffReport) -> Result<Classification, PlanError> {
        if self.target == TargetState::Absent {
            if self.current.is_present() {
                self.teardown("Resource should be absent")?;
            }
            return Ok(diff.classification);
        }

        if !self.current.is_present() {
            self.build("Resource does not exist")?;
            return Ok(diff.classification);
        }

        let mut classification = diff.classification;
        if self.current == Lifecycle::Removing {
            classification = Classification::MustRecreate;
        }
        if classification == Classification::Updatable && !self.capabilities.update {
            classification = Classification::MustRecreate;
        }

        match classification {
            Classification::Identical => self.transition(self.current.is_running())?,
            Classification::Updatable => {
                let fields = diff.changed_fields();
                self.steps.push(PlanStep {
                    operation: Operation::Update,
                    precondition: Operation::Update.precondition(),
                    reason: format!("Changed: {}", fields.join(", ")),
                    retry_safe: Operation::Update.is_retry_safe(),
                    fields,
                });
                self.transition(self.current.is_running())?;
            }
            Classification::MustRecreate => {
                let reason = if self.current == Lifecycle::Removing {
                    String::from("Resource is being removed")
                } else {
                    format!("Recreate required by: {}", diff.changed_fields().join(", "))
                };
                self.teardown(&reason)?;
                self.build(&reason)?;
            }
        }

        Ok(classification)
    }
}

impl ActionPlan {
    /// Builds a plan from a diff report and the current/target lifecycles.
    ///
    /// # Errors
    ///
    /// Returns a `PlanError` if the target cannot be reached with the
    /// resource kind's capabilities.
    pub fn from_diff(
        resource: &ResourceId,
        diff: &DiffReport,
        current: Lifecycle,
        target: TargetState,
        mode: RunMode,
        capabilities: &Capabilities,
    ) -> Result<Self, PlanError> {
        let mut planner = Planner {
            resource,
            current,
            target,
            capabilities,
            steps: Vec::new(),
        };
        let classification = planner.plan(diff)?;

        Ok(Self {
            resource: resource.clone(),
            steps: planner.steps,
            classification,
            current,
            target,
            dry: mode == RunMode::Check,
            spec_hash: None,
            created_at: Utc::now(),
        })
    }

    /// Attaches the desired spec hash.
    #[must_use]
    pub fn with_spec_hash(mut self, hash: impl Into<String>) -> Self {
        self.spec_hash = Some(hash.into());
        self
    }

    /// Returns true if the plan has no steps.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the operations in order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.steps.iter().map(|s| s.operation).collect()
    }

    /// Returns true if the plan destroys and recreates the resource.
    #[must_use]
    pub fn is_recreate(&self) -> bool {
        let ops = self.operations();
        ops.contains(&Operation::Remove) && ops.contains(&Operation::Create)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Check => "check",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Update => "update",
            Self::Remove => "remove",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Present => "present",
            Self::Running => "running",
            Self::NotRunning => "present and not running",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ActionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "{}: no changes", self.resource);
        }
        let ops: Vec<String> = self.steps.iter().map(|s| s.operation.to_string()).collect();
        write!(f, "{}: {}", self.resource, ops.join(" -> "))?;
        if self.dry {
            write!(f, " (check)")?;
        }
        Ok(())
    }
}
