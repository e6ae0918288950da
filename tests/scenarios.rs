//! End-to-end reconciliation scenarios over the in-memory and local backends.

use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use tempfile::TempDir;

use dockhand::backend::{BackendOp, LocalBackend, MemoryBackend, ResourceBackend};
use dockhand::config::{ConfigParser, ConfigValidator, RetryPolicy, Settings, TypeRegistry};
use dockhand::error::BackendError;
use dockhand::model::{DesiredSpec, Lifecycle, ResourceId, TargetState};
use dockhand::planner::{Classification, Operation, RunMode};
use dockhand::reconciler::{ReconcileRequest, Reconciler};

fn web() -> ResourceId {
    ResourceId::new("container", "web")
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn fast_settings() -> Settings {
    Settings {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            multiplier: 2,
        },
        ..Settings::default()
    }
}

fn operations(actions: &[dockhand::planner::PlanStep]) -> Vec<Operation> {
    actions.iter().map(|s| s.operation).collect()
}

#[tokio::test]
async fn test_extra_network_is_updated_in_place() {
    let backend = MemoryBackend::new();
    backend
        .insert(
            web(),
            Lifecycle::Running,
            fields(json!({"image": "nginx", "restart_policy": "no", "networks": ["net1", "bridge"]})),
        )
        .await;
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry);

    let request = ReconcileRequest::new(
        web(),
        DesiredSpec::new().with("networks", json!([{"name": "net1"}])),
    );
    let result = reconciler.reconcile(&request).await.unwrap();

    assert_eq!(result.classification, Classification::Updatable);
    assert_eq!(operations(&result.actions), vec![Operation::Update]);
    assert_eq!(result.diff.changed_fields(), vec![String::from("networks")]);
    assert!(result.changed);
    assert_eq!(backend.call_count(BackendOp::Create).await, 0);

    let again = reconciler.reconcile(&request).await.unwrap();
    assert!(!again.changed);
}

#[tokio::test]
async fn test_changed_mount_recreates_running_container() {
    let backend = MemoryBackend::new();
    backend
        .insert(
            web(),
            Lifecycle::Running,
            fields(json!({"restart_policy": "no", "mounts": [{"source": "/b", "target": "/x"}]})),
        )
        .await;
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry);

    let request = ReconcileRequest::new(
        web(),
        DesiredSpec::new().with("mounts", json!([{"source": "/a", "target": "/x"}])),
    )
    .with_target(TargetState::Running);
    let result = reconciler.reconcile(&request).await.unwrap();

    assert_eq!(result.classification, Classification::MustRecreate);
    assert_eq!(
        operations(&result.actions),
        vec![Operation::Stop, Operation::Remove, Operation::Create, Operation::Start]
    );
    let after = result.after.unwrap();
    assert_eq!(after.lifecycle, Lifecycle::Running);
    assert_eq!(after.field("mounts"), Some(&json!([{"source": "/a", "target": "/x"}])));
    assert_ne!(after.backend_id, result.before.backend_id);
}

#[tokio::test]
async fn test_absent_container_is_created_and_started() {
    let backend = MemoryBackend::new();
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry);

    let request = ReconcileRequest::new(
        web(),
        DesiredSpec::new()
            .with("image", json!("nginx"))
            .with_unset("published_ports"),
    );
    let result = reconciler.reconcile(&request).await.unwrap();

    assert_eq!(operations(&result.actions), vec![Operation::Create, Operation::Start]);
    assert!(result.diff.fields.iter().all(|f| f.field != "published_ports"));
    assert!(result.after.unwrap().field("published_ports").is_none());
}

#[tokio::test]
async fn test_changed_env_string_recreates_container() {
    let backend = MemoryBackend::new();
    backend
        .insert(
            web(),
            Lifecycle::Running,
            fields(json!({"image": "app", "restart_policy": "no", "env": {"APP_VERSION": "1.1"}})),
        )
        .await;
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry);

    let request = ReconcileRequest::new(
        web(),
        DesiredSpec::new()
            .with("image", json!("app"))
            .with("env", json!({"APP_VERSION": "1.10"})),
    );
    let result = reconciler.reconcile(&request).await.unwrap();

    assert_eq!(result.classification, Classification::MustRecreate);
    assert!(result.changed);
    assert_eq!(
        result.after.unwrap().field("env"),
        Some(&json!({"APP_VERSION": "1.10"}))
    );
}

#[tokio::test]
async fn test_second_pass_reports_no_change() {
    let backend = MemoryBackend::new();
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry);

    let request = ReconcileRequest::new(
        web(),
        DesiredSpec::new()
            .with("image", json!("nginx:1.27"))
            .with("env", json!({"LOG_LEVEL": "info"}))
            .with("published_ports", json!(["8080:80"]))
            .with("networks", json!(["front"]))
            .with("restart_policy", json!("Always"))
            .with_empty("command"),
    );

    let first = reconciler.reconcile(&request).await.unwrap();
    assert!(first.changed);
    assert!(first.error.is_none());

    backend.clear_calls().await;
    let second = reconciler.reconcile(&request).await.unwrap();
    assert!(!second.changed);
    assert_eq!(second.classification, Classification::Identical);
    assert!(!backend.mutated().await);
}

#[tokio::test]
async fn test_removing_absent_resource_is_not_an_error() {
    let backend = MemoryBackend::new();
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry);

    let request = ReconcileRequest::new(web(), DesiredSpec::new()).with_target(TargetState::Absent);
    let result = reconciler.reconcile(&request).await.unwrap();
    assert!(!result.changed);
    assert!(result.actions.is_empty());

    backend.insert(web(), Lifecycle::Stopped, Map::new()).await;
    backend
        .fail_next(BackendOp::Remove, BackendError::not_found("container/web"))
        .await;
    let result = reconciler.reconcile(&request).await.unwrap();
    assert_eq!(operations(&result.actions), vec![Operation::Remove]);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_empty_differs_from_unset() {
    let backend = MemoryBackend::new();
    backend
        .insert(
            web(),
            Lifecycle::Running,
            fields(json!({"restart_policy": "no", "published_ports": ["80:80"]})),
        )
        .await;
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry);

    let empty = ReconcileRequest::new(web(), DesiredSpec::new().with_empty("published_ports"))
        .with_mode(RunMode::Check);
    let result = reconciler.reconcile(&empty).await.unwrap();
    assert_eq!(result.classification, Classification::MustRecreate);
    assert!(result.changed);

    let unset = ReconcileRequest::new(web(), DesiredSpec::new().with_unset("published_ports"))
        .with_mode(RunMode::Check);
    let result = reconciler.reconcile(&unset).await.unwrap();
    assert_eq!(result.classification, Classification::Identical);
    assert!(!result.changed);

    assert!(!backend.mutated().await);
}

#[tokio::test]
async fn test_failed_start_is_resumed_on_next_pass() {
    let backend = MemoryBackend::new();
    backend
        .fail_next(BackendOp::Start, BackendError::permanent("start", "port already allocated"))
        .await;
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry);
    let request = ReconcileRequest::new(web(), DesiredSpec::new().with("image", json!("nginx")));

    let failed = reconciler.reconcile(&request).await.unwrap();
    assert!(failed.changed);
    let failure = failed.error.as_ref().unwrap();
    assert_eq!(failure.step, Some(1));
    assert_eq!(failure.operation, Some(Operation::Start));
    assert!(!failure.transient);
    assert_eq!(failed.after.as_ref().unwrap().lifecycle, Lifecycle::Created);

    let resumed = reconciler.reconcile(&request).await.unwrap();
    assert_eq!(operations(&resumed.actions), vec![Operation::Start]);
    assert!(resumed.error.is_none());
    assert_eq!(resumed.after.unwrap().lifecycle, Lifecycle::Running);
}

#[tokio::test]
async fn test_transient_stop_failure_is_retried() {
    let backend = MemoryBackend::new();
    backend
        .insert(web(), Lifecycle::Running, fields(json!({"restart_policy": "no"})))
        .await;
    backend
        .fail_next(BackendOp::Stop, BackendError::transient("stop", "connection reset"))
        .await;
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry).with_settings(fast_settings());

    let request = ReconcileRequest::new(web(), DesiredSpec::new()).with_target(TargetState::Stopped);
    let result = reconciler.reconcile(&request).await.unwrap();

    assert!(result.error.is_none());
    assert_eq!(operations(&result.actions), vec![Operation::Stop]);
    assert_eq!(result.executed.len(), 1);
    assert_eq!(result.executed[0].attempts, 2);
    assert_eq!(backend.call_count(BackendOp::Stop).await, 2);
}

#[tokio::test]
async fn test_transient_create_failure_is_not_retried() {
    let backend = MemoryBackend::new();
    backend
        .fail_next(BackendOp::Create, BackendError::transient("create", "timeout"))
        .await;
    let registry = TypeRegistry::builtin().unwrap();
    let reconciler = Reconciler::new(&backend, &registry).with_settings(fast_settings());

    let request = ReconcileRequest::new(web(), DesiredSpec::new().with("image", json!("nginx")));
    let result = reconciler.reconcile(&request).await.unwrap();

    assert!(result.error.unwrap().transient);
    assert_eq!(backend.call_count(BackendOp::Create).await, 1);
    assert_eq!(backend.call_count(BackendOp::Start).await, 0);
}

#[tokio::test]
async fn test_starter_config_converges_on_local_backend() {
    let dir = TempDir::new().unwrap();
    let config = ConfigParser::new()
        .parse_yaml(include_str!("../templates/dockhand.yaml"), None)
        .unwrap();
    let registry = TypeRegistry::with_overrides(&config.types).unwrap();
    let report = ConfigValidator::new().validate(&config, &registry).unwrap();
    assert!(report.is_valid());

    let backend = LocalBackend::new(dir.path().join(".dockhand"));
    let reconciler = Reconciler::new(&backend, &registry).with_settings(config.settings.clone());

    let summary = reconciler.reconcile_all(&config, RunMode::Normal, false).await;
    assert!(summary.is_success(), "{summary}");
    assert_eq!(summary.changed_count(), config.resources.len());

    let reopened = LocalBackend::new(dir.path().join(".dockhand"));
    let reconciler = Reconciler::new(&reopened, &registry).with_settings(config.settings.clone());
    let drift = reconciler.check_drift(&config).await.unwrap();
    assert!(drift.is_converged(), "{drift}");

    let listed = reopened.list().await.unwrap();
    assert_eq!(listed.len(), config.resources.len());
    assert!(
        listed
            .iter()
            .filter(|r| r.resource.kind == "container")
            .all(|r| r.lifecycle == Lifecycle::Running)
    );

    let destroyed = reconciler.destroy_all(&config, RunMode::Normal, false).await;
    assert!(destroyed.is_success());
    assert!(reopened.list().await.unwrap().is_empty());
}
