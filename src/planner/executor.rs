//! Plan executor for applying action plans.
//!
//! This module runs plan steps strictly in order against a backend,
//! tracking the resource lifecycle, retrying only retry-safe operations,
//! and honouring cooperative cancellation between steps.

use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendResult, CreateRequest, ResourceBackend};
use crate::config::RetryPolicy;
use crate::error::{BackendError, ReconcileError};
use crate::model::{Lifecycle, ObservedState, ResourceId};

use super::plan::{ActionPlan, Operation, PlanStep};

/// Executor for action plans.
pub struct PlanExecutor<'a> {
    /// Resource backend.
    backend: &'a dyn ResourceBackend,
    /// Retry policy for retry-safe operations.
    retry: RetryPolicy,
    /// Timeout passed to backend `stop`.
    stop_timeout: Duration,
    /// Whether `remove` forces removal.
    force_remove: bool,
    /// Cancellation checked before each step.
    cancel: Option<CancellationToken>,
}

/// Result of executing a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// Step index.
    pub index: usize,
    /// Operation that was executed.
    pub operation: Operation,
    /// Number of backend calls made.
    pub attempts: u32,
    /// Whether the backend state was changed.
    pub mutated: bool,
}

/// Result of executing an entire plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Outcomes of the steps that completed.
    pub outcomes: Vec<StepOutcome>,
    /// Whether any completed step changed the backend.
    pub mutated: bool,
    /// Backend identifier after execution.
    pub backend_id: Option<String>,
    /// Lifecycle tracked through the executed steps.
    pub lifecycle: Lifecycle,
    /// The failure that stopped execution, if any.
    pub error: Option<ReconcileError>,
}

impl std::fmt::Debug for PlanExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("backend", &self.backend.backend_type())
            .field("retry", &self.retry)
            .field("stop_timeout", &self.stop_timeout)
            .field("force_remove", &self.force_remove)
            .finish_non_exhaustive()
    }
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(backend: &'a dyn ResourceBackend) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
            stop_timeout: Duration::from_secs(10),
            force_remove: true,
            cancel: None,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the timeout passed to `stop`.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Sets whether removal is forced.
    #[must_use]
    pub const fn with_force_remove(mut self, force: bool) -> Self {
        self.force_remove = force;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Fetches observed state, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last backend error once retries are exhausted or on a
    /// permanent failure.
    pub async fn fetch(&self, resource: &ResourceId) -> BackendResult<ObservedState> {
        let (observed, _) = self
            .retrying("fetch", || self.backend.fetch(resource))
            .await
            .map_err(|(e, _)| e)?;
        Ok(observed.unwrap_or_else(|| ObservedState::absent(resource.clone())))
    }

    /// Executes a plan.
    ///
    /// Steps run in order; the first failure stops execution and is
    /// reported in the result together with whatever already succeeded.
    pub async fn execute(
        &self,
        plan: &ActionPlan,
        before: &ObservedState,
        request: &CreateRequest,
    ) -> ExecutionResult {
        let mut result = ExecutionResult {
            outcomes: Vec::new(),
            mutated: false,
            backend_id: before.backend_id.clone(),
            lifecycle: before.lifecycle,
            error: None,
        };

        if plan.dry {
            result.error = Some(ReconcileError::Aborted {
                reason: String::from("check-mode plans cannot be executed"),
            });
            return result;
        }

        info!("Executing plan for {} with {} step(s)", plan.resource, plan.steps.len());

        for (index, step) in plan.steps.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                warn!("Cancelled before step {index} ({})", step.operation);
                result.error = Some(ReconcileError::Cancelled {
                    step: index,
                    operation: step.operation,
                });
                break;
            }

            if !step.precondition.holds(result.lifecycle) {
                error!(
                    "Step {index} ({}) requires {}, resource is {}",
                    step.operation, step.precondition, result.lifecycle
                );
                result.error = Some(ReconcileError::PreconditionFailed {
                    step: index,
                    operation: step.operation,
                    required: step.precondition.to_string(),
                    actual: result.lifecycle.to_string(),
                });
                break;
            }

            info!("Step {index}: {} {} ({})", step.operation, plan.resource, step.reason);

            match self
                .run_step(&plan.resource, step, result.backend_id.as_deref(), request)
                .await
            {
                Ok(effect) => {
                    if let Some(id) = effect.backend_id {
                        result.backend_id = Some(id);
                    }
                    result.lifecycle = step.operation.next_lifecycle(result.lifecycle);
                    if step.operation == Operation::Remove {
                        result.backend_id = None;
                    }
                    result.mutated |= effect.mutated;
                    result.outcomes.push(StepOutcome {
                        index,
                        operation: step.operation,
                        attempts: effect.attempts,
                        mutated: effect.mutated,
                    });
                }
                Err(source) => {
                    error!("Step {index} ({}) failed for {}: {source}", step.operation, plan.resource);
                    result.error = Some(ReconcileError::StepFailed {
                        step: index,
                        operation: step.operation,
                        source,
                        last_known_good: Some(Box::new(before.clone())),
                    });
                    break;
                }
            }
        }

        result
    }

    async fn run_step(
        &self,
        resource: &ResourceId,
        step: &PlanStep,
        backend_id: Option<&str>,
        request: &CreateRequest,
    ) -> BackendResult<StepEffect> {
        if step.operation == Operation::Create {
            let id = self.backend.create(resource, request).await?;
            info!("Created {resource} (ID: {id})");
            return Ok(StepEffect {
                backend_id: Some(id),
                attempts: 1,
                mutated: true,
            });
        }

        let id = backend_id.ok_or_else(|| BackendError::not_found(resource.key()))?;

        let attempts = match step.operation {
            Operation::Start => {
                self.backend.start(id).await?;
                1
            }
            Operation::Update => {
                let patch: Map<String, Value> = step
                    .fields
                    .iter()
                    .filter_map(|f| request.fields.get(f).map(|v| (f.clone(), v.clone())))
                    .collect();
                self.backend.update(id, &patch).await?;
                1
            }
            Operation::Stop => {
                self.retrying("stop", || self.backend.stop(id, self.stop_timeout))
                    .await
                    .map_err(|(e, _)| e)?
                    .1
            }
            Operation::Remove => {
                match self
                    .retrying("remove", || self.backend.remove(id, self.force_remove))
                    .await
                {
                    Ok(((), attempts)) => attempts,
                    Err((e, attempts)) if e.is_not_found() => {
                        // A later attempt only sees NotFound if an earlier one went through.
                        let mutated = attempts > 1;
                        info!("{resource} was already removed (after {attempts} attempt(s))");
                        return Ok(StepEffect {
                            backend_id: None,
                            attempts,
                            mutated,
                        });
                    }
                    Err((e, _)) => return Err(e),
                }
            }
            Operation::Create => 1,
        };

        Ok(StepEffect {
            backend_id: None,
            attempts,
            mutated: true,
        })
    }

    /// Calls `call` until it succeeds, fails permanently, or the retry
    /// budget is spent. Both outcomes carry the number of attempts made.
    async fn retrying<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<(T, u32), (BackendError, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "{operation} failed (attempt {attempt}/{max_attempts}): {e}, retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("{operation} failed after {attempt} attempt(s): {e}");
                    return Err((e, attempt));
                }
            }
        }
    }
}

/// What a successful step did.
struct StepEffect {
    backend_id: Option<String>,
    attempts: u32,
    mutated: bool,
}

impl ExecutionResult {
    /// Returns true if every step ran and succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Executed {} step(s)", self.outcomes.len())?;
        if let Some(err) = &self.error {
            write!(f, ", stopped: {err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockResourceBackend;
    use crate::model::{Capabilities, TargetState};
    use crate::planner::diff::{Classification, DiffReport};
    use crate::planner::plan::RunMode;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 2,
        }
    }

    fn resource() -> ResourceId {
        ResourceId::new("container", "web")
    }

    fn plan(classification: Classification, current: Lifecycle, target: TargetState) -> ActionPlan {
        let diff = DiffReport {
            fields: Vec::new(),
            classification,
        };
        ActionPlan::from_diff(
            &resource(),
            &diff,
            current,
            target,
            RunMode::Normal,
            &Capabilities::default(),
        )
        .unwrap()
    }

    fn running() -> ObservedState {
        ObservedState::present(resource(), "c1", Lifecycle::Running, Map::new())
    }

    #[tokio::test]
    async fn test_create_is_never_retried() {
        let mut backend = MockResourceBackend::new();
        backend
            .expect_create()
            .times(1)
            .returning(|_, _| Err(BackendError::transient("create", "connection reset")));

        let executor = PlanExecutor::new(&backend).with_retry(fast_retry());
        let plan = plan(Classification::Identical, Lifecycle::Absent, TargetState::Running);
        let result = executor
            .execute(&plan, &ObservedState::absent(resource()), &CreateRequest::default())
            .await;

        assert!(!result.mutated);
        assert!(matches!(
            result.error,
            Some(ReconcileError::StepFailed {
                step: 0,
                operation: Operation::Create,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_stop_is_retried_on_transient_errors() {
        let mut backend = MockResourceBackend::new();
        let mut calls = 0;
        backend.expect_stop().times(3).returning(move |_, _| {
            calls += 1;
            if calls < 3 {
                Err(BackendError::transient("stop", "503"))
            } else {
                Ok(())
            }
        });

        let executor = PlanExecutor::new(&backend).with_retry(fast_retry());
        let plan = plan(Classification::Identical, Lifecycle::Running, TargetState::Stopped);
        let result = executor.execute(&plan, &running(), &CreateRequest::default()).await;

        assert!(result.is_success());
        assert_eq!(result.outcomes[0].attempts, 3);
        assert_eq!(result.lifecycle, Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mut backend = MockResourceBackend::new();
        backend
            .expect_stop()
            .times(3)
            .returning(|_, _| Err(BackendError::transient("stop", "503")));

        let executor = PlanExecutor::new(&backend).with_retry(fast_retry());
        let plan = plan(Classification::Identical, Lifecycle::Running, TargetState::Stopped);
        let result = executor.execute(&plan, &running(), &CreateRequest::default()).await;

        assert!(!result.is_success());
        assert!(!result.mutated);
    }

    #[tokio::test]
    async fn test_remove_of_missing_resource_succeeds() {
        let mut backend = MockResourceBackend::new();
        backend
            .expect_remove()
            .times(1)
            .returning(|id, _| Err(BackendError::not_found(id)));

        let executor = PlanExecutor::new(&backend);
        let stopped = ObservedState::present(resource(), "c1", Lifecycle::Stopped, Map::new());
        let plan = plan(Classification::Identical, Lifecycle::Stopped, TargetState::Absent);
        let result = executor.execute(&plan, &stopped, &CreateRequest::default()).await;

        assert!(result.is_success());
        assert!(!result.mutated);
        assert_eq!(result.lifecycle, Lifecycle::Absent);
        assert_eq!(result.backend_id, None);
    }

    #[tokio::test]
    async fn test_remove_vanishing_after_timeout_counts_as_mutation() {
        let mut backend = MockResourceBackend::new();
        let mut calls = 0;
        backend.expect_remove().times(2).returning(move |id, _| {
            calls += 1;
            if calls == 1 {
                Err(BackendError::Timeout {
                    operation: String::from("remove"),
                    secs: 5,
                })
            } else {
                Err(BackendError::not_found(id))
            }
        });

        let executor = PlanExecutor::new(&backend).with_retry(fast_retry());
        let stopped = ObservedState::present(resource(), "c1", Lifecycle::Stopped, Map::new());
        let plan = plan(Classification::Identical, Lifecycle::Stopped, TargetState::Absent);
        let result = executor.execute(&plan, &stopped, &CreateRequest::default()).await;

        assert!(result.is_success());
        assert!(result.mutated);
        assert_eq!(result.outcomes[0].attempts, 2);
        assert!(result.outcomes[0].mutated);
        assert_eq!(result.lifecycle, Lifecycle::Absent);
    }

    #[tokio::test]
    async fn test_permanent_failure_aborts_remaining_steps() {
        let mut backend = MockResourceBackend::new();
        backend.expect_stop().times(1).returning(|_, _| Ok(()));
        backend
            .expect_remove()
            .times(1)
            .returning(|_, _| Err(BackendError::permanent("remove", "device busy")));

        let executor = PlanExecutor::new(&backend);
        let plan = plan(Classification::MustRecreate, Lifecycle::Running, TargetState::Running);
        let result = executor.execute(&plan, &running(), &CreateRequest::default()).await;

        assert!(result.mutated);
        assert_eq!(result.outcomes.len(), 1);
        match result.error {
            Some(ReconcileError::StepFailed {
                step,
                last_known_good,
                ..
            }) => {
                assert_eq!(step, 1);
                assert_eq!(last_known_good.map(|s| s.lifecycle), Some(Lifecycle::Running));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_before_first_step() {
        let backend = MockResourceBackend::new();
        let token = CancellationToken::new();
        token.cancel();

        let executor = PlanExecutor::new(&backend).with_cancellation(token);
        let plan = plan(Classification::Identical, Lifecycle::Absent, TargetState::Running);
        let result = executor
            .execute(&plan, &ObservedState::absent(resource()), &CreateRequest::default())
            .await;

        assert!(result.outcomes.is_empty());
        assert!(matches!(result.error, Some(ReconcileError::Cancelled { step: 0, .. })));
    }

    #[tokio::test]
    async fn test_precondition_violation() {
        let backend = MockResourceBackend::new();
        let executor = PlanExecutor::new(&backend);
        let plan = plan(Classification::Identical, Lifecycle::Stopped, TargetState::Running);
        let result = executor
            .execute(&plan, &ObservedState::absent(resource()), &CreateRequest::default())
            .await;

        assert!(matches!(
            result.error,
            Some(ReconcileError::PreconditionFailed {
                operation: Operation::Start,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_update_sends_only_changed_fields() {
        let mut backend = MockResourceBackend::new();
        backend
            .expect_update()
            .times(1)
            .withf(|id, patch| id == "c1" && patch.len() == 1 && patch.contains_key("memory"))
            .returning(|_, _| Ok(()));

        let mut plan = plan(Classification::Identical, Lifecycle::Running, TargetState::Running);
        plan.steps.push(PlanStep {
            operation: Operation::Update,
            precondition: Operation::Update.precondition(),
            reason: String::from("Changed: memory"),
            retry_safe: false,
            fields: vec![String::from("memory")],
        });

        let mut fields = Map::new();
        fields.insert(String::from("memory"), Value::from("512m"));
        fields.insert(String::from("image"), Value::from("nginx"));
        let request = CreateRequest {
            fields,
            spec_hash: None,
        };

        let executor = PlanExecutor::new(&backend);
        let result = executor.execute(&plan, &running(), &request).await;
        assert!(result.is_success());
        assert!(result.mutated);
    }

    #[tokio::test]
    async fn test_fetch_retries_then_reports_absent() {
        let mut backend = MockResourceBackend::new();
        let mut calls = 0;
        backend.expect_fetch().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(BackendError::Timeout {
                    operation: String::from("fetch"),
                    secs: 5,
                })
            } else {
                Ok(None)
            }
        });

        let executor = PlanExecutor::new(&backend).with_retry(fast_retry());
        let observed = executor.fetch(&resource()).await.unwrap();
        assert!(!observed.exists());
    }
}
