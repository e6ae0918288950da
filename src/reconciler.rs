//! Reconciler for converging resources to their desired state.
//!
//! This module implements the per-resource reconciliation pass: validate
//! the desired spec, fetch observed state, diff, plan, execute, and
//! re-fetch the ground truth. Configuration-wide helpers run the same pass
//! over every declared resource.

use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{CreateRequest, ResourceBackend};
use crate::config::{ConfigValidator, DockhandConfig, ResourceConfig, Settings, SpecHasher, TypeRegistry};
use crate::error::{DockhandError, ReconcileError, Result, ValidationError};
use crate::model::{ComparisonPolicy, DesiredSpec, ObservedState, ResourceId, TargetState};
use crate::planner::{
    ActionPlan, Classification, DiffEngine, DiffReport, Operation, PlanExecutor, PlanStep, RunMode,
    StepOutcome,
};

/// Reconciler for a single backend.
pub struct Reconciler<'a> {
    /// Resource backend.
    backend: &'a dyn ResourceBackend,
    /// Resource type definitions.
    registry: &'a TypeRegistry,
    /// Global settings.
    settings: Settings,
    /// Desired spec hasher.
    hasher: SpecHasher,
    /// Cooperative cancellation checked between plan steps.
    cancel: Option<CancellationToken>,
}

/// What the caller asks a reconciliation pass to do.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileRequest {
    /// Resource identity.
    pub resource: ResourceId,
    /// Desired fields.
    pub desired: DesiredSpec,
    /// Target lifecycle. `None` uses the kind's default.
    pub target: Option<TargetState>,
    /// Run mode.
    pub mode: RunMode,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    /// Resource identity.
    pub resource: ResourceId,
    /// Whether the resource changed (or would change in check mode).
    pub changed: bool,
    /// Whether this was a check-mode pass.
    pub dry_run: bool,
    /// Resolved target lifecycle.
    pub target: TargetState,
    /// Diff classification.
    pub classification: Classification,
    /// Hash of the resolved desired spec.
    pub spec_hash: String,
    /// Planned steps.
    pub actions: Vec<PlanStep>,
    /// Steps that completed.
    pub executed: Vec<StepOutcome>,
    /// Field-by-field diff.
    pub diff: DiffReport,
    /// Observed state before the pass.
    pub before: ObservedState,
    /// Observed state after the pass. `None` if it could not be re-fetched.
    pub after: Option<ObservedState>,
    /// Failure details if a step failed.
    pub error: Option<FailureReport>,
}

/// Failure details attached to a reconciliation result.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    /// Index of the failed step.
    pub step: Option<usize>,
    /// Operation of the failed step.
    pub operation: Option<Operation>,
    /// Error message.
    pub message: String,
    /// Whether the underlying backend failure was transient.
    pub transient: bool,
    /// Last observed state known to be accurate.
    pub last_known_good: Option<ObservedState>,
}

/// Results of reconciling a whole configuration.
#[derive(Debug, Default, Serialize)]
pub struct ReconcileSummary {
    /// Per-resource results, in configuration order.
    pub results: Vec<ReconciliationResult>,
    /// Resources that failed before a result could be produced.
    pub errors: Vec<ResourceFailure>,
    /// Resources not attempted after a failure.
    pub skipped: Vec<ResourceId>,
}

/// A resource whose reconciliation failed before planning completed.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceFailure {
    /// Resource identity.
    pub resource: ResourceId,
    /// Error message.
    pub message: String,
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Resources whose plan is not empty.
    pub drifted: Vec<DriftEntry>,
    /// Total number of resources in the configuration.
    pub total_resources: usize,
}

/// A single drifted resource.
#[derive(Debug, Clone, Serialize)]
pub struct DriftEntry {
    /// Resource identity.
    pub resource: ResourceId,
    /// Diff classification.
    pub classification: Classification,
    /// Operations that would run.
    pub actions: Vec<Operation>,
    /// Fields that differ.
    pub fields: Vec<String>,
}

impl ReconcileRequest {
    /// Creates a request in normal mode with the kind's default target.
    #[must_use]
    pub fn new(resource: ResourceId, desired: DesiredSpec) -> Self {
        Self {
            resource,
            desired,
            target: None,
            mode: RunMode::Normal,
        }
    }

    /// Builds a request from a declared resource.
    #[must_use]
    pub fn from_config(resource: &ResourceConfig, mode: RunMode) -> Self {
        Self {
            resource: resource.id(),
            desired: resource.desired(),
            target: resource.state,
            mode,
        }
    }

    /// Sets the target lifecycle.
    #[must_use]
    pub const fn with_target(mut self, target: TargetState) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the run mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }
}

impl std::fmt::Debug for Reconciler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("backend", &self.backend.backend_type())
            .field("kinds", &self.registry.kinds())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler with default settings.
    #[must_use]
    pub fn new(backend: &'a dyn ResourceBackend, registry: &'a TypeRegistry) -> Self {
        Self {
            backend,
            registry,
            settings: Settings::default(),
            hasher: SpecHasher::new(),
            cancel: None,
        }
    }

    /// Sets the global settings.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn executor(&self) -> PlanExecutor<'a> {
        let executor = PlanExecutor::new(self.backend)
            .with_retry(self.settings.retry)
            .with_stop_timeout(self.settings.stop_timeout())
            .with_force_remove(self.settings.force_remove);
        match &self.cancel {
            Some(token) => executor.with_cancellation(token.clone()),
            None => executor,
        }
    }

    /// Computes the plan for a request without executing it.
    ///
    /// # Errors
    ///
    /// Returns an error on validation or planning failure, or if observed
    /// state cannot be fetched.
    pub async fn plan(&self, request: &ReconcileRequest) -> Result<(ActionPlan, DiffReport, ObservedState)> {
        let prepared = self.prepare(request).await?;
        Ok((prepared.plan, prepared.diff, prepared.before))
    }

    /// Reconciles one resource.
    ///
    /// Validation and planning errors are returned before any mutating
    /// backend call. Step failures are reported in the result so the caller
    /// sees what already changed.
    ///
    /// # Errors
    ///
    /// Returns an error on validation or planning failure, or if observed
    /// state cannot be fetched.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconciliationResult> {
        info!("Reconciling {} ({} mode)", request.resource, request.mode);

        let Prepared {
            plan,
            diff,
            before,
            create,
        } = self.prepare(request).await?;

        let mut result = ReconciliationResult {
            resource: request.resource.clone(),
            changed: !plan.is_empty(),
            dry_run: plan.dry,
            target: plan.target,
            classification: plan.classification,
            spec_hash: create.spec_hash.clone().unwrap_or_default(),
            actions: plan.steps.clone(),
            executed: Vec::new(),
            diff,
            after: Some(before.clone()),
            before,
            error: None,
        };

        if plan.dry || plan.is_empty() {
            debug!("{}: {}", request.resource, result.message());
            return Ok(result);
        }

        let executor = self.executor();
        let execution = executor.execute(&plan, &result.before, &create).await;

        self.backend.invalidate_cache();
        result.after = match executor.fetch(&request.resource).await {
            Ok(observed) => Some(observed),
            Err(e) => {
                warn!("Could not re-fetch {} after execution: {e}", request.resource);
                None
            }
        };
        result.changed = execution.mutated;
        result.executed = execution.outcomes;

        if let Some(err) = execution.error {
            error!("Reconciliation of {} failed: {err}", request.resource);
            result.error = Some(FailureReport::from_error(&err, &result.before));
        } else {
            info!("{}: {}", request.resource, result.message());
        }

        Ok(result)
    }

    /// Reconciles every declared resource in order.
    ///
    /// Without `continue_on_error` the first failure stops the run and the
    /// remaining resources are reported as skipped.
    pub async fn reconcile_all(
        &self,
        config: &DockhandConfig,
        mode: RunMode,
        continue_on_error: bool,
    ) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for (i, resource) in config.resources.iter().enumerate() {
            let request = ReconcileRequest::from_config(resource, mode);
            let failed = match self.reconcile(&request).await {
                Ok(result) => {
                    let failed = result.is_failed();
                    summary.results.push(result);
                    failed
                }
                Err(e) => {
                    error!("Reconciliation of {} failed: {e}", request.resource);
                    summary.errors.push(ResourceFailure {
                        resource: request.resource,
                        message: e.to_string(),
                    });
                    true
                }
            };

            if failed && !continue_on_error {
                summary.skipped = config.resources[i + 1..].iter().map(ResourceConfig::id).collect();
                if !summary.skipped.is_empty() {
                    warn!("Skipping {} remaining resource(s)", summary.skipped.len());
                }
                break;
            }
        }

        summary
    }

    /// Removes every declared resource, in reverse declaration order.
    pub async fn destroy_all(
        &self,
        config: &DockhandConfig,
        mode: RunMode,
        continue_on_error: bool,
    ) -> ReconcileSummary {
        let mut reversed = config.clone();
        reversed.resources.reverse();
        for resource in &mut reversed.resources {
            resource.state = Some(TargetState::Absent);
        }
        self.reconcile_all(&reversed, mode, continue_on_error).await
    }

    /// Checks every declared resource for drift without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns the first validation, planning or fetch error.
    pub async fn check_drift(&self, config: &DockhandConfig) -> Result<DriftReport> {
        info!("Checking {} resource(s) for drift", config.resources.len());

        let mut drifted = Vec::new();
        for resource in &config.resources {
            let request = ReconcileRequest::from_config(resource, RunMode::Check);
            let (plan, diff, _) = self.plan(&request).await?;
            if !plan.is_empty() {
                drifted.push(DriftEntry {
                    resource: request.resource,
                    classification: plan.classification,
                    actions: plan.operations(),
                    fields: diff.changed_fields(),
                });
            }
        }

        Ok(DriftReport {
            drifted,
            total_resources: config.resources.len(),
        })
    }

    async fn prepare(&self, request: &ReconcileRequest) -> Result<Prepared> {
        let resource_type = self.registry.get(&request.resource.kind).ok_or_else(|| {
            DockhandError::Validation(ValidationError::UnknownKind {
                kind: request.resource.kind.clone(),
            })
        })?;
        ConfigValidator::validate_desired(&request.resource, &request.desired, resource_type)?;

        let target = request.target.unwrap_or_else(|| resource_type.default_target());
        let policy = ComparisonPolicy::for_type(resource_type, self.settings.default_mode);
        let resolved = if target == TargetState::Absent {
            DesiredSpec::new()
        } else {
            policy.apply_defaults(&request.desired)
        };
        let spec_hash = self.hasher.hash_spec(&resolved);

        self.backend.invalidate_cache();
        let before = self.executor().fetch(&request.resource).await?;
        debug!("Observed {} as {}", request.resource, before.lifecycle);

        let diff = DiffEngine::diff(&resolved, &before, &policy);
        let plan = ActionPlan::from_diff(
            &request.resource,
            &diff,
            before.lifecycle,
            target,
            request.mode,
            &resource_type.capabilities,
        )?
        .with_spec_hash(&spec_hash);

        Ok(Prepared {
            plan,
            diff,
            before,
            create: CreateRequest {
                fields: policy.concrete_values(&resolved),
                spec_hash: Some(spec_hash),
            },
        })
    }
}

/// Everything computed before execution.
struct Prepared {
    plan: ActionPlan,
    diff: DiffReport,
    before: ObservedState,
    create: CreateRequest,
}

impl FailureReport {
    fn from_error(error: &ReconcileError, before: &ObservedState) -> Self {
        let (operation, transient, last_known_good) = match error {
            ReconcileError::StepFailed {
                operation,
                source,
                last_known_good,
                ..
            } => (
                Some(*operation),
                source.is_transient(),
                last_known_good.as_deref().cloned(),
            ),
            ReconcileError::PreconditionFailed { operation, .. }
            | ReconcileError::Cancelled { operation, .. } => (Some(*operation), false, Some(before.clone())),
            ReconcileError::Aborted { .. } => (None, false, Some(before.clone())),
        };

        Self {
            step: error.step(),
            operation,
            message: error.to_string(),
            transient,
            last_known_good,
        }
    }
}

impl ReconciliationResult {
    /// Returns true if a step failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Human-readable one-line outcome.
    #[must_use]
    pub fn message(&self) -> String {
        if let Some(err) = &self.error {
            return err.message.clone();
        }
        match (self.changed, self.dry_run) {
            (false, _) => String::from("no changes"),
            (true, true) => format!("would run {}", self.operation_list()),
            (true, false) => format!("ran {}", self.operation_list()),
        }
    }

    fn operation_list(&self) -> String {
        self.actions
            .iter()
            .map(|s| s.operation.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders the result as an automation module return value.
    #[must_use]
    pub fn module_output(&self) -> Value {
        let (before, after) = self.diff.before_after();
        let facts = self.after.as_ref().map_or(Value::Null, |a| {
            json!({
                "id": a.backend_id,
                "state": a.lifecycle,
                "fields": a.fields,
            })
        });
        json!({
            "changed": self.changed,
            "failed": self.is_failed(),
            "msg": self.message(),
            "actions": self.actions.iter().map(|s| s.operation).collect::<Vec<_>>(),
            "diff": { "before": before, "after": after },
            "resource": facts,
        })
    }
}

impl ReconcileSummary {
    /// Returns the number of changed resources.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.results.iter().filter(|r| r.changed).count()
    }

    /// Returns the number of failed resources.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count() + self.errors.len()
    }

    /// Returns true if every resource reconciled cleanly.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0 && self.skipped.is_empty()
    }
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.drifted.is_empty()
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.drifted.is_empty() {
            return write!(f, "No drift detected - state is converged");
        }
        writeln!(f, "Drift detected:")?;
        for entry in &self.drifted {
            writeln!(f, "  - {} ({})", entry.resource, entry.classification)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match (self.is_failed(), self.changed) {
            (true, _) => "failed",
            (false, true) => "changed",
            (false, false) => "ok",
        };
        write!(f, "{}: {status} ({})", self.resource, self.message())
    }
}

impl std::fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reconciled {} resource(s):", self.results.len())?;
        writeln!(f, "  Changed: {}", self.changed_count())?;
        writeln!(f, "  Failed: {}", self.failed_count())?;
        if !self.skipped.is_empty() {
            writeln!(f, "  Skipped: {}", self.skipped.len())?;
        }
        for failure in &self.errors {
            writeln!(f, "  - {}: {}", failure.resource, failure.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, MemoryBackend, MockResourceBackend};
    use crate::config::RetryPolicy;
    use crate::error::BackendError;
    use crate::model::{Capabilities, ChangeEffect, FieldPolicy, Lifecycle, ResourceType, ValueKind};
    use serde_json::Map;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register(
            ResourceType::new("app")
                .with_field("image", FieldPolicy::of_kind(ValueKind::Scalar))
                .with_field("memory", FieldPolicy::of_kind(ValueKind::Scalar).effect(ChangeEffect::Update)),
        );
        registry.register(ResourceType::new("disk").with_capabilities(Capabilities {
            start: false,
            stop: false,
            update: false,
            remove: true,
        }));
        registry
    }

    fn fast_settings() -> Settings {
        Settings {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
                multiplier: 2,
            },
            ..Settings::default()
        }
    }

    fn web() -> ResourceId {
        ResourceId::new("app", "web")
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_create_then_converged() {
        let backend = MemoryBackend::new();
        let registry = registry();
        let reconciler = Reconciler::new(&backend, &registry).with_settings(fast_settings());
        let request = ReconcileRequest::new(web(), DesiredSpec::new().with("image", json!("nginx")));

        let first = reconciler.reconcile(&request).await.unwrap();
        assert!(first.changed);
        assert_eq!(
            first.executed.iter().map(|o| o.operation).collect::<Vec<_>>(),
            vec![Operation::Create, Operation::Start]
        );
        let after = first.after.as_ref().unwrap();
        assert_eq!(after.lifecycle, Lifecycle::Running);
        assert_eq!(after.field("image"), Some(&json!("nginx")));

        let second = reconciler.reconcile(&request).await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.classification, Classification::Identical);
        assert!(second.actions.is_empty());
    }

    #[tokio::test]
    async fn test_check_mode_does_not_mutate() {
        let backend = MemoryBackend::new();
        let registry = registry();
        let reconciler = Reconciler::new(&backend, &registry);
        let request = ReconcileRequest::new(web(), DesiredSpec::new().with("image", json!("nginx")))
            .with_mode(RunMode::Check);

        let result = reconciler.reconcile(&request).await.unwrap();
        assert!(result.changed);
        assert!(result.dry_run);
        assert_eq!(result.after.as_ref(), Some(&result.before));
        assert!(!backend.mutated().await);
        assert_eq!(result.message(), "would run create, start");
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let backend = MemoryBackend::new();
        backend
            .insert(web(), Lifecycle::Running, fields(json!({"image": "nginx", "memory": "256m"})))
            .await;
        let registry = registry();
        let reconciler = Reconciler::new(&backend, &registry);
        let request = ReconcileRequest::new(
            web(),
            DesiredSpec::new()
                .with("image", json!("nginx"))
                .with("memory", json!("512m")),
        );

        let result = reconciler.reconcile(&request).await.unwrap();
        assert_eq!(result.classification, Classification::Updatable);
        assert_eq!(
            result.actions.iter().map(|s| s.operation).collect::<Vec<_>>(),
            vec![Operation::Update]
        );
        assert_eq!(
            result.after.unwrap().field("memory"),
            Some(&json!("512m"))
        );
        assert_eq!(backend.call_count(BackendOp::Create).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_kind_makes_no_backend_call() {
        let backend = MemoryBackend::new();
        let registry = registry();
        let reconciler = Reconciler::new(&backend, &registry);
        let request = ReconcileRequest::new(ResourceId::new("gadget", "x"), DesiredSpec::new());

        let err = reconciler.reconcile(&request).await.unwrap_err();
        assert!(matches!(err, DockhandError::Validation(ValidationError::UnknownKind { .. })));
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_target_is_plan_error() {
        let backend = MemoryBackend::new();
        let registry = registry();
        let reconciler = Reconciler::new(&backend, &registry);
        let request = ReconcileRequest::new(ResourceId::new("disk", "data"), DesiredSpec::new())
            .with_target(TargetState::Running);

        let err = reconciler.reconcile(&request).await.unwrap_err();
        assert!(matches!(err, DockhandError::Plan(_)));
        assert!(!backend.mutated().await);
    }

    #[tokio::test]
    async fn test_create_is_not_retried() {
        let mut backend = MockResourceBackend::new();
        backend.expect_invalidate_cache().return_const(());
        backend.expect_backend_type().return_const("mock");
        backend.expect_fetch().returning(|_| Ok(None));
        backend
            .expect_create()
            .times(1)
            .returning(|_, _| Err(BackendError::transient("create", "connection reset")));

        let registry = registry();
        let reconciler = Reconciler::new(&backend, &registry).with_settings(fast_settings());
        let request = ReconcileRequest::new(web(), DesiredSpec::new().with("image", json!("nginx")));

        let result = reconciler.reconcile(&request).await.unwrap();
        let failure = result.error.as_ref().unwrap();
        assert_eq!(failure.step, Some(0));
        assert_eq!(failure.operation, Some(Operation::Create));
        assert!(failure.transient);
        assert!(!result.changed);
        assert_eq!(result.after.unwrap().lifecycle, Lifecycle::Absent);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_change() {
        let backend = MemoryBackend::new();
        backend
            .fail_next(BackendOp::Start, BackendError::permanent("start", "port in use"))
            .await;
        let registry = registry();
        let reconciler = Reconciler::new(&backend, &registry);
        let request = ReconcileRequest::new(web(), DesiredSpec::new().with("image", json!("nginx")));

        let result = reconciler.reconcile(&request).await.unwrap();
        assert!(result.changed);
        assert!(result.is_failed());
        assert_eq!(result.error.as_ref().unwrap().step, Some(1));
        assert_eq!(result.after.as_ref().unwrap().lifecycle, Lifecycle::Created);
        assert_eq!(
            result.error.as_ref().unwrap().last_known_good.as_ref().unwrap().lifecycle,
            Lifecycle::Absent
        );

        let output = result.module_output();
        assert_eq!(output["changed"], json!(true));
        assert_eq!(output["failed"], json!(true));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let backend = MemoryBackend::new();
        let registry = registry();
        let token = CancellationToken::new();
        token.cancel();
        let reconciler = Reconciler::new(&backend, &registry).with_cancellation(token);
        let request = ReconcileRequest::new(web(), DesiredSpec::new().with("image", json!("nginx")));

        let result = reconciler.reconcile(&request).await.unwrap();
        assert!(!result.changed);
        assert!(result.error.unwrap().message.contains("cancelled"));
        assert!(!backend.mutated().await);
    }

    #[tokio::test]
    async fn test_reconcile_all_stops_on_first_failure() {
        let yaml = r"
resources:
  - kind: gadget
    name: broken
  - kind: app
    name: web
    spec:
      image: nginx
";
        let config: DockhandConfig = serde_yaml::from_str(yaml).unwrap();
        let backend = MemoryBackend::new();
        let registry = registry();
        let reconciler = Reconciler::new(&backend, &registry);

        let summary = reconciler.reconcile_all(&config, RunMode::Normal, false).await;
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.skipped, vec![web()]);
        assert!(!summary.is_success());

        let summary = reconciler.reconcile_all(&config, RunMode::Normal, true).await;
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.changed_count(), 1);
    }

    #[tokio::test]
    async fn test_check_drift_and_destroy() {
        let yaml = r"
resources:
  - kind: app
    name: web
    spec:
      image: nginx
  - kind: disk
    name: data
";
        let config: DockhandConfig = serde_yaml::from_str(yaml).unwrap();
        let backend = MemoryBackend::new();
        let registry = registry();
        let reconciler = Reconciler::new(&backend, &registry);

        let drift = reconciler.check_drift(&config).await.unwrap();
        assert_eq!(drift.drifted.len(), 2);
        assert!(!backend.mutated().await);

        assert!(reconciler.reconcile_all(&config, RunMode::Normal, false).await.is_success());
        assert!(reconciler.check_drift(&config).await.unwrap().is_converged());

        let summary = reconciler.destroy_all(&config, RunMode::Normal, false).await;
        assert_eq!(summary.changed_count(), 2);
        assert!(backend.list().await.unwrap().is_empty());
    }
}
