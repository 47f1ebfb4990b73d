//! Deploy and destroy orchestration.
//!
//! [`deploy`] materializes a declared [`Stack`] against a [`Platform`] in
//! topological order:
//!
//! 1. Order the graph (fails on cycles before any platform call)
//! 2. Materialize each resource: readiness gate, bucket, upload (joins the
//!    staging task), function, provider, grants, connection
//! 3. Deliver the trigger's lifecycle event through the provider, bounded by
//!    the executor's invocation timeout
//! 4. Return the [`DeployState`] for persistence
//!
//! The first deploy delivers a create event; a deploy with prior state
//! delivers an update. On failure, resources materialized by this run are
//! released again in reverse order, best effort.
//!
//! [`destroy`] walks a saved state's creation order in reverse, so the
//! trigger's delete event is delivered before anything it depends on is torn
//! down. There is no rollback on destroy; a partial destroy is surfaced and
//! can be retried.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::graph::GraphError;
use crate::lifecycle::{InvocationRequest, LifecycleError, LifecycleEvent, TriggerProperties, TriggerState};
use crate::platform::{Platform, PlatformError, ReadTarget};
use crate::resource::{BucketDef, FunctionDef, GrantTarget, LogicalId, RemovalPolicy, ResourceDef, TriggerDef};
use crate::seeder::Stack;
use crate::stage::{StageError, join_staging};
use crate::state::{DeployState, generate_state_id};
use crate::util::hash::{ContentHash, HashError, Hashable};

/// Errors that can occur during deploy or destroy.
#[derive(Debug, Error)]
pub enum DeployError {
  /// The declared graph could not be ordered.
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// Script staging failed; the whole run is aborted.
  #[error("staging failed: {0}")]
  Stage(#[from] StageError),

  /// A trigger was driven through an illegal transition.
  #[error(transparent)]
  Lifecycle(#[from] LifecycleError),

  /// The stack manifest could not be hashed for the state id.
  #[error("failed to hash stack manifest: {0}")]
  Hash(#[from] HashError),

  /// A platform call failed while materializing a resource.
  #[error("failed to materialize {id}: {source}")]
  Materialize {
    id: LogicalId,
    #[source]
    source: PlatformError,
  },

  /// A platform call failed while releasing a resource.
  #[error("failed to release {id}: {source}")]
  Release {
    id: LogicalId,
    #[source]
    source: PlatformError,
  },

  /// The ordering named a resource the manifest does not define.
  #[error("resource {id} missing from the manifest")]
  MissingDefinition { id: LogicalId },

  /// A resource reference resolved to a definition of the wrong kind.
  #[error("resource {id} is a {found}, expected {expected}")]
  KindMismatch {
    id: LogicalId,
    expected: &'static str,
    found: &'static str,
  },

  /// The upload's staging task was already consumed by an earlier deploy.
  #[error("upload {id} has no staging task; declare the stack again before deploying")]
  StagingConsumed { id: LogicalId },

  /// The saved state has no lifecycle record for a declared trigger.
  #[error("no recorded lifecycle state for trigger {id}")]
  MissingTriggerState { id: LogicalId },
}

/// Result of a destroy run.
#[derive(Debug)]
pub struct DestroyResult {
  /// Resources whose platform side effects were reverted.
  pub released: usize,

  /// Buckets left behind by their removal policy.
  pub retained: usize,

  /// Final lifecycle state of each trigger.
  pub triggers: BTreeMap<LogicalId, TriggerState>,
}

/// What was accumulated while materializing one run.
#[derive(Default)]
struct RunState {
  created: Vec<LogicalId>,
  triggers: BTreeMap<LogicalId, TriggerState>,
  scripts: BTreeMap<LogicalId, ContentHash>,
}

/// Materialize a declared stack against a platform.
///
/// Resources are created in dependency order; each upload joins its staging
/// task before shipping objects, and each trigger delivers its lifecycle
/// event last among the resources it depends on. Pass the previous
/// [`DeployState`] to deliver update events instead of create events.
///
/// On failure, resources newly materialized by this run are released again
/// in reverse order (best effort) and the original error is returned.
/// Resources already present in the prior state are left in place.
///
/// # Errors
///
/// Returns the first ordering, staging, lifecycle, or platform error
/// encountered. Script execution failures are suppressed per trigger when its
/// ignore-errors flag is set; invocation timeouts never are.
pub async fn deploy(
  stack: &mut Stack,
  platform: &dyn Platform,
  prior: Option<&DeployState>,
) -> Result<DeployState, DeployError> {
  let order = stack.graph().deploy_order()?;
  let manifest = stack.manifest();

  info!(
    resources = order.len(),
    update = prior.is_some(),
    "starting deploy"
  );

  let engine = Engine {
    platform,
    defs: &manifest.resources,
  };
  let preexisting: HashSet<&LogicalId> = prior.map(|p| p.resources.iter().collect()).unwrap_or_default();

  let mut run = RunState::default();
  for id in &order {
    let def = engine.def(id)?;
    if let Err(err) = engine.materialize(stack, id, def, prior, &mut run).await {
      error!(resource = %id, error = %err, "deploy failed");
      engine.rollback(&run.created, &preexisting).await;
      return Err(err);
    }
    run.created.push(id.clone());
    debug!(resource = %id, kind = def.kind(), "materialized");
  }

  let state_id = generate_state_id(&manifest.compute_hash()?);
  let state = DeployState::new(state_id, manifest, run.created, run.triggers, run.scripts);

  info!(
    state_id = %state.id,
    resources = state.resources.len(),
    "deploy complete"
  );
  Ok(state)
}

/// Tear down a previously deployed stack.
///
/// Walks the saved creation order in reverse: each trigger's delete event is
/// delivered first (its executor still has everything it needs), then grants
/// and connections are revoked, objects and functions deleted, and buckets
/// removed unless their policy retains them. External resources are left in
/// place.
///
/// # Errors
///
/// Returns the first failure and stops; resources released before it stay
/// released, so a destroy can be retried.
pub async fn destroy(state: &DeployState, platform: &dyn Platform) -> Result<DestroyResult, DeployError> {
  info!(state_id = %state.id, resources = state.resources.len(), "starting destroy");

  let engine = Engine {
    platform,
    defs: &state.manifest.resources,
  };

  let mut released = 0usize;
  let mut retained = 0usize;
  let mut triggers = state.triggers.clone();

  for id in state.resources.iter().rev() {
    let def = engine.def(id)?;

    if let ResourceDef::Trigger(trigger) = def {
      let current = triggers
        .get(id)
        .copied()
        .ok_or_else(|| DeployError::MissingTriggerState { id: id.clone() })?;
      let pending = current.begin(LifecycleEvent::Delete)?;

      let function = engine.executor_for(id, trigger)?;
      engine
        .deliver_event(id, function, trigger.properties, LifecycleEvent::Delete)
        .await
        .map_err(|source| DeployError::Release { id: id.clone(), source })?;

      triggers.insert(id.clone(), pending.complete()?);
      released += 1;
      continue;
    }

    match engine.release(id, def).await? {
      ReleaseOutcome::Released => released += 1,
      ReleaseOutcome::Retained => retained += 1,
      ReleaseOutcome::Nothing => {}
    }
  }

  info!(released, retained, "destroy complete");
  Ok(DestroyResult {
    released,
    retained,
    triggers,
  })
}

/// How one resource came out of a release pass.
enum ReleaseOutcome {
  Released,
  Retained,
  Nothing,
}

/// Walker over one manifest's definitions against one platform.
struct Engine<'a> {
  platform: &'a dyn Platform,
  defs: &'a BTreeMap<LogicalId, ResourceDef>,
}

impl Engine<'_> {
  fn def(&self, id: &LogicalId) -> Result<&ResourceDef, DeployError> {
    self
      .defs
      .get(id)
      .ok_or_else(|| DeployError::MissingDefinition { id: id.clone() })
  }

  fn bucket_def(&self, id: &LogicalId) -> Result<&BucketDef, DeployError> {
    match self.def(id)? {
      ResourceDef::Bucket(def) => Ok(def),
      other => Err(DeployError::KindMismatch {
        id: id.clone(),
        expected: "bucket",
        found: other.kind(),
      }),
    }
  }

  fn function_def(&self, id: &LogicalId) -> Result<&FunctionDef, DeployError> {
    match self.def(id)? {
      ResourceDef::Function(def) => Ok(def),
      other => Err(DeployError::KindMismatch {
        id: id.clone(),
        expected: "function",
        found: other.kind(),
      }),
    }
  }

  /// Resolve a trigger's executor through the provider indirection.
  fn executor_for(&self, trigger_id: &LogicalId, trigger: &TriggerDef) -> Result<&FunctionDef, DeployError> {
    match self.def(&trigger.provider)? {
      ResourceDef::Provider(provider) => self.function_def(&provider.function),
      other => Err(DeployError::KindMismatch {
        id: trigger_id.clone(),
        expected: "provider",
        found: other.kind(),
      }),
    }
  }

  /// Resolve a grant target to the physical name the platform speaks.
  fn read_target(&self, target: &GrantTarget) -> Result<ReadTarget, DeployError> {
    match target {
      GrantTarget::Bucket(id) => Ok(ReadTarget::Bucket(self.bucket_def(id)?.name.clone())),
      GrantTarget::Secret(secret_id) => Ok(ReadTarget::Secret(secret_id.clone())),
    }
  }

  async fn materialize(
    &self,
    stack: &mut Stack,
    id: &LogicalId,
    def: &ResourceDef,
    prior: Option<&DeployState>,
    run: &mut RunState,
  ) -> Result<(), DeployError> {
    let materialize_err = |source: PlatformError| DeployError::Materialize { id: id.clone(), source };

    match def {
      ResourceDef::External(external) => {
        self
          .platform
          .database_ready(&external.external_id)
          .await
          .map_err(materialize_err)?;
      }

      ResourceDef::Bucket(bucket) => {
        self.platform.create_bucket(bucket).await.map_err(materialize_err)?;
      }

      ResourceDef::Upload(upload) => {
        let task = stack
          .take_staging(id)
          .ok_or_else(|| DeployError::StagingConsumed { id: id.clone() })?;
        let artifact = join_staging(task).await?;

        let bucket = self.bucket_def(&upload.bucket)?;
        for key in &upload.keys {
          let body = artifact.read(key)?;
          self
            .platform
            .put_object(&bucket.name, key, &body)
            .await
            .map_err(materialize_err)?;
        }

        info!(
          upload = %id,
          bucket = %bucket.name,
          keys = upload.keys.len(),
          hash = %artifact.content_hash(),
          "scripts uploaded"
        );
        run.scripts.insert(id.clone(), artifact.content_hash().clone());
      }

      ResourceDef::Function(function) => {
        self.platform.create_function(function).await.map_err(materialize_err)?;
      }

      ResourceDef::Provider(provider) => {
        // Declarative indirection; resolve the reference so a bad graph
        // fails here rather than at the trigger.
        let function = self.function_def(&provider.function)?;
        debug!(provider = %id, function = %function.name, "provider bound");
      }

      ResourceDef::Trigger(trigger) => {
        let function = self.executor_for(id, trigger)?;

        let prior_state = prior.and_then(|p| p.triggers.get(id).copied());
        let (pending, event) = match prior_state {
          None => (TriggerState::PendingCreate, LifecycleEvent::Create),
          Some(settled) => (settled.begin(LifecycleEvent::Update)?, LifecycleEvent::Update),
        };

        self
          .deliver_event(id, function, trigger.properties, event)
          .await
          .map_err(materialize_err)?;

        run.triggers.insert(id.clone(), pending.complete()?);
      }

      ResourceDef::Grant(grant) => {
        let grantee = self.function_def(&grant.grantee)?;
        let target = self.read_target(&grant.target)?;
        self
          .platform
          .grant_read(&grantee.name, &target)
          .await
          .map_err(materialize_err)?;
      }

      ResourceDef::Connection(connection) => {
        let from = self.function_def(&connection.from)?;
        self
          .platform
          .allow_connection(&from.name, &connection.to_endpoint, connection.port)
          .await
          .map_err(materialize_err)?;
      }
    }

    Ok(())
  }

  /// Deliver one lifecycle event to a trigger's executor, bounded by the
  /// executor's invocation timeout.
  ///
  /// Script execution failures are suppressed and logged when the trigger
  /// carries the ignore-errors flag. A timeout is an infrastructure failure
  /// and is never suppressed.
  async fn deliver_event(
    &self,
    trigger: &LogicalId,
    function: &FunctionDef,
    properties: TriggerProperties,
    event: LifecycleEvent,
  ) -> Result<(), PlatformError> {
    let request = InvocationRequest { event, properties };
    info!(trigger = %trigger, function = %function.name, event = %event, "delivering lifecycle event");

    let invoked = timeout(
      Duration::from_secs(function.timeout_secs),
      self.platform.invoke(&function.name, &request),
    )
    .await;

    match invoked {
      Err(_) => Err(PlatformError::InvokeTimeout {
        timeout_secs: function.timeout_secs,
      }),
      Ok(Err(PlatformError::ExecutionFailed { message })) if properties.ignore_sql_errors => {
        warn!(trigger = %trigger, error = %message, "script execution failed, ignoring");
        Ok(())
      }
      Ok(result) => result,
    }
  }

  /// Revert the platform side effects of one materialized resource.
  ///
  /// Triggers are not handled here; delivering their delete event is the
  /// destroy path's job, and a failed run never rolls one back.
  async fn release(&self, id: &LogicalId, def: &ResourceDef) -> Result<ReleaseOutcome, DeployError> {
    let release_err = |source: PlatformError| DeployError::Release { id: id.clone(), source };

    match def {
      ResourceDef::External(_) | ResourceDef::Provider(_) | ResourceDef::Trigger(_) => Ok(ReleaseOutcome::Nothing),

      ResourceDef::Bucket(bucket) => {
        if bucket.removal_policy == RemovalPolicy::Retain {
          info!(bucket = %bucket.name, "bucket retained by removal policy");
          return Ok(ReleaseOutcome::Retained);
        }
        self.platform.delete_bucket(&bucket.name).await.map_err(release_err)?;
        Ok(ReleaseOutcome::Released)
      }

      ResourceDef::Upload(upload) => {
        let bucket = self.bucket_def(&upload.bucket)?;
        for key in &upload.keys {
          self.platform.delete_object(&bucket.name, key).await.map_err(release_err)?;
        }
        Ok(ReleaseOutcome::Released)
      }

      ResourceDef::Function(function) => {
        self.platform.delete_function(&function.name).await.map_err(release_err)?;
        Ok(ReleaseOutcome::Released)
      }

      ResourceDef::Grant(grant) => {
        let grantee = self.function_def(&grant.grantee)?;
        let target = self.read_target(&grant.target)?;
        self
          .platform
          .revoke_read(&grantee.name, &target)
          .await
          .map_err(release_err)?;
        Ok(ReleaseOutcome::Released)
      }

      ResourceDef::Connection(connection) => {
        let from = self.function_def(&connection.from)?;
        self
          .platform
          .revoke_connection(&from.name, &connection.to_endpoint, connection.port)
          .await
          .map_err(release_err)?;
        Ok(ReleaseOutcome::Released)
      }
    }
  }

  /// Best-effort release of resources a failed run materialized, newest
  /// first. Resources carried over from the prior state are left in place;
  /// individual release failures are logged and skipped.
  async fn rollback(&self, created: &[LogicalId], preexisting: &HashSet<&LogicalId>) {
    let fresh: Vec<&LogicalId> = created.iter().rev().filter(|id| !preexisting.contains(id)).collect();
    if fresh.is_empty() {
      return;
    }

    warn!(count = fresh.len(), "rolling back resources materialized by this run");

    for id in fresh {
      let Ok(def) = self.def(id) else {
        continue;
      };
      if let Err(err) = self.release(id, def).await {
        error!(resource = %id, error = %err, "rollback release failed");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{DatabaseRef, NetworkRef, SecretRef, SeederConfig};
  use crate::consts::{CREATE_SCRIPT_KEY, DELETE_SCRIPT_KEY, EXECUTOR_TIMEOUT_SECS};
  use crate::platform::{MemoryPlatform, PlatformOp};
  use crate::seeder::{SeederHandle, declare};
  use crate::stage::stage_scripts;
  use std::fs;
  use std::path::{Path, PathBuf};
  use tempfile::TempDir;
  use tracing_test::traced_test;

  fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
  }

  fn test_config(dir: &Path, with_delete: bool) -> SeederConfig {
    SeederConfig {
      network: NetworkRef {
        id: "vpc-1".to_string(),
        private_subnet_ids: vec!["subnet-a".to_string()],
      },
      database: DatabaseRef {
        id: "db-1".to_string(),
        endpoint_address: "db-1.internal".to_string(),
        secret: Some(SecretRef {
          id: "db-1-credentials".to_string(),
        }),
      },
      port: 1433,
      create_script: write_script(dir, "init.sql", "CREATE TABLE t (id INT);"),
      delete_script: with_delete.then(|| write_script(dir, "teardown.sql", "DROP TABLE t;")),
      memory_mb: None,
      executor_artifact: None,
      executor_handler: None,
      ignore_sql_errors: false,
    }
  }

  fn declared(config: &SeederConfig) -> (Stack, SeederHandle) {
    let mut stack = Stack::new();
    let handle = declare(&mut stack, "app", config).unwrap();
    (stack, handle)
  }

  fn op_position(journal: &[PlatformOp], pred: impl Fn(&PlatformOp) -> bool) -> usize {
    journal
      .iter()
      .position(pred)
      .unwrap_or_else(|| panic!("op not found in journal: {:?}", journal))
  }

  #[tokio::test]
  async fn deploy_materializes_in_dependency_order() {
    let temp = TempDir::new().unwrap();
    let (mut stack, _) = declared(&test_config(temp.path(), false));
    let platform = MemoryPlatform::new();

    deploy(&mut stack, &platform, None).await.unwrap();

    let journal = platform.journal();
    let pos = |pred: fn(&PlatformOp) -> bool| op_position(&journal, pred);

    let bucket = pos(|op| matches!(op, PlatformOp::CreateBucket { .. }));
    let upload = pos(|op| matches!(op, PlatformOp::PutObject { .. }));
    let function = pos(|op| matches!(op, PlatformOp::CreateFunction { .. }));
    let ready = pos(|op| matches!(op, PlatformOp::DatabaseReady { .. }));
    let grant = pos(|op| matches!(op, PlatformOp::GrantRead { .. }));
    let connection = pos(|op| matches!(op, PlatformOp::AllowConnection { .. }));
    let invoke = pos(|op| matches!(op, PlatformOp::Invoke { .. }));

    assert!(bucket < upload);
    assert!(upload < invoke);
    assert!(function < invoke);
    assert!(ready < invoke);
    assert!(grant < invoke);
    assert!(connection < invoke);
    assert_eq!(invoke, journal.len() - 1);
  }

  #[tokio::test]
  async fn first_deploy_delivers_create_event() {
    let temp = TempDir::new().unwrap();
    let (mut stack, handle) = declared(&test_config(temp.path(), false));
    let platform = MemoryPlatform::new();

    let state = deploy(&mut stack, &platform, None).await.unwrap();

    assert!(platform.journal().contains(&PlatformOp::Invoke {
      function: "app-executor".to_string(),
      event: LifecycleEvent::Create,
      ignore_sql_errors: false,
    }));
    assert_eq!(state.triggers.get(&handle.trigger), Some(&TriggerState::Created));
  }

  #[tokio::test]
  async fn deploy_records_creation_order_and_fingerprint() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), false);
    let (mut stack, handle) = declared(&config);
    let platform = MemoryPlatform::new();

    let state = deploy(&mut stack, &platform, None).await.unwrap();

    assert_eq!(state.resources.len(), 9);
    assert_eq!(state.resources.last(), Some(&handle.trigger));
    assert!(!state.id.is_empty());

    // Staging the same script again yields the same fingerprint
    let expected = stage_scripts(&config.create_script, None).unwrap();
    assert_eq!(state.scripts.get(&handle.upload), Some(expected.content_hash()));
  }

  #[tokio::test]
  async fn deploy_ships_objects_under_fixed_keys() {
    let temp = TempDir::new().unwrap();
    let (mut stack, _) = declared(&test_config(temp.path(), true));
    let platform = MemoryPlatform::new();

    deploy(&mut stack, &platform, None).await.unwrap();

    assert_eq!(platform.object_keys("app-scripts"), vec![
      CREATE_SCRIPT_KEY.to_string(),
      DELETE_SCRIPT_KEY.to_string()
    ]);
    assert_eq!(
      platform.object("app-scripts", CREATE_SCRIPT_KEY).unwrap(),
      b"CREATE TABLE t (id INT);".to_vec()
    );
  }

  #[tokio::test]
  async fn redeploy_with_prior_state_delivers_update() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), false);
    let platform = MemoryPlatform::new();

    let (mut stack, handle) = declared(&config);
    let first = deploy(&mut stack, &platform, None).await.unwrap();

    // A redeploy declares the stack afresh; staging was consumed.
    let (mut stack, _) = declared(&config);
    let second = deploy(&mut stack, &platform, Some(&first)).await.unwrap();

    let events: Vec<LifecycleEvent> = platform
      .journal()
      .into_iter()
      .filter_map(|op| match op {
        PlatformOp::Invoke { event, .. } => Some(event),
        _ => None,
      })
      .collect();
    assert_eq!(events, vec![LifecycleEvent::Create, LifecycleEvent::Update]);
    assert_eq!(second.triggers.get(&handle.trigger), Some(&TriggerState::Updated));
  }

  #[tokio::test]
  async fn second_deploy_without_redeclare_fails() {
    let temp = TempDir::new().unwrap();
    let (mut stack, _) = declared(&test_config(temp.path(), false));
    let platform = MemoryPlatform::new();

    let first = deploy(&mut stack, &platform, None).await.unwrap();
    let err = deploy(&mut stack, &platform, Some(&first)).await.unwrap_err();

    assert!(matches!(err, DeployError::StagingConsumed { .. }));
    // Rollback leaves resources from the prior deploy alone
    assert!(platform.has_bucket("app-scripts"));
    assert!(platform.function("app-executor").is_some());
  }

  #[tokio::test]
  #[traced_test]
  async fn ignored_execution_failure_is_logged_not_fatal() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path(), false);
    config.ignore_sql_errors = true;

    let (mut stack, handle) = declared(&config);
    let platform = MemoryPlatform::new();
    platform.fail_invoke("syntax error near SELECT");

    let state = deploy(&mut stack, &platform, None).await.unwrap();

    assert_eq!(state.triggers.get(&handle.trigger), Some(&TriggerState::Created));
    assert!(logs_contain("script execution failed, ignoring"));
  }

  #[tokio::test]
  async fn execution_failure_without_flag_rolls_back() {
    let temp = TempDir::new().unwrap();
    let (mut stack, handle) = declared(&test_config(temp.path(), false));
    let platform = MemoryPlatform::new();
    platform.fail_invoke("syntax error near SELECT");

    let err = deploy(&mut stack, &platform, None).await.unwrap_err();

    match err {
      DeployError::Materialize { id, source } => {
        assert_eq!(id, handle.trigger);
        assert!(matches!(source, PlatformError::ExecutionFailed { .. }));
      }
      other => panic!("unexpected error: {:?}", other),
    }

    // Rollback removed what the run created
    assert!(!platform.has_bucket("app-scripts"));
    assert!(platform.function("app-executor").is_none());
    let journal = platform.journal();
    let invoke = op_position(&journal, |op| matches!(op, PlatformOp::Invoke { .. }));
    let delete_bucket = op_position(&journal, |op| matches!(op, PlatformOp::DeleteBucket { .. }));
    assert!(invoke < delete_bucket);
  }

  #[tokio::test]
  async fn upload_failure_rolls_back_bucket() {
    let temp = TempDir::new().unwrap();
    let (mut stack, handle) = declared(&test_config(temp.path(), false));
    let platform = MemoryPlatform::new();
    platform.fail_put_object("quota exceeded");

    let err = deploy(&mut stack, &platform, None).await.unwrap_err();

    match err {
      DeployError::Materialize { id, .. } => assert_eq!(id, handle.upload),
      other => panic!("unexpected error: {:?}", other),
    }
    assert!(!platform.has_bucket("app-scripts"));
    // Nothing was ever invoked
    assert!(
      !platform
        .journal()
        .iter()
        .any(|op| matches!(op, PlatformOp::Invoke { .. }))
    );
  }

  #[tokio::test]
  async fn unavailable_database_fails_before_any_invoke() {
    let temp = TempDir::new().unwrap();
    let (mut stack, handle) = declared(&test_config(temp.path(), false));
    let platform = MemoryPlatform::new();
    platform.set_database_ready(false);

    let err = deploy(&mut stack, &platform, None).await.unwrap_err();

    match err {
      DeployError::Materialize { id, source } => {
        assert_eq!(id, handle.database);
        assert!(matches!(source, PlatformError::DatabaseUnavailable { .. }));
      }
      other => panic!("unexpected error: {:?}", other),
    }
    assert!(
      !platform
        .journal()
        .iter()
        .any(|op| matches!(op, PlatformOp::Invoke { .. }))
    );
  }

  #[tokio::test(start_paused = true)]
  async fn invocation_timeout_is_never_suppressed() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path(), false);
    config.ignore_sql_errors = true;

    let (mut stack, handle) = declared(&config);
    let platform = MemoryPlatform::new();
    platform.delay_invoke(Duration::from_secs(EXECUTOR_TIMEOUT_SECS + 1));

    let err = deploy(&mut stack, &platform, None).await.unwrap_err();

    match err {
      DeployError::Materialize { id, source } => {
        assert_eq!(id, handle.trigger);
        assert!(matches!(source, PlatformError::InvokeTimeout {
          timeout_secs: EXECUTOR_TIMEOUT_SECS
        }));
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[tokio::test]
  async fn empty_stack_deploys_to_empty_state() {
    let mut stack = Stack::new();
    let platform = MemoryPlatform::new();

    let state = deploy(&mut stack, &platform, None).await.unwrap();

    assert!(state.resources.is_empty());
    assert!(state.triggers.is_empty());
    assert!(platform.journal().is_empty());
  }

  #[tokio::test]
  async fn destroy_delivers_delete_first_and_reverses_creation() {
    let temp = TempDir::new().unwrap();
    let (mut stack, handle) = declared(&test_config(temp.path(), true));
    let platform = MemoryPlatform::new();

    let state = deploy(&mut stack, &platform, None).await.unwrap();
    let deploy_ops = platform.journal().len();

    let result = destroy(&state, &platform).await.unwrap();

    let journal = platform.journal();
    let destroy_ops = &journal[deploy_ops..];
    assert!(matches!(destroy_ops.first(), Some(PlatformOp::Invoke {
      event: LifecycleEvent::Delete,
      ..
    })));

    // Objects go before their bucket, mirroring upload-after-bucket creation
    let delete_object = op_position(destroy_ops, |op| matches!(op, PlatformOp::DeleteObject { .. }));
    let delete_bucket = op_position(destroy_ops, |op| matches!(op, PlatformOp::DeleteBucket { .. }));
    assert!(delete_object < delete_bucket);

    // trigger + connection + two grants + function + upload + bucket
    assert_eq!(result.released, 7);
    assert_eq!(result.retained, 0);
    assert_eq!(result.triggers.get(&handle.trigger), Some(&TriggerState::Deleted));

    assert!(!platform.has_bucket("app-scripts"));
    assert!(platform.function("app-executor").is_none());
  }

  #[tokio::test]
  async fn retain_policy_keeps_bucket_contents_gone() {
    let temp = TempDir::new().unwrap();
    let (mut stack, handle) = declared(&test_config(temp.path(), false));
    let platform = MemoryPlatform::new();

    let mut state = deploy(&mut stack, &platform, None).await.unwrap();
    if let Some(ResourceDef::Bucket(bucket)) = state.manifest.resources.get_mut(&handle.bucket) {
      bucket.removal_policy = RemovalPolicy::Retain;
    }

    let result = destroy(&state, &platform).await.unwrap();

    assert_eq!(result.retained, 1);
    assert!(platform.has_bucket("app-scripts"));
    assert!(platform.object("app-scripts", CREATE_SCRIPT_KEY).is_none());
    assert!(
      !platform
        .journal()
        .iter()
        .any(|op| matches!(op, PlatformOp::DeleteBucket { .. }))
    );
  }

  #[tokio::test]
  async fn destroy_failure_stops_before_teardown() {
    let temp = TempDir::new().unwrap();
    let (mut stack, handle) = declared(&test_config(temp.path(), false));
    let platform = MemoryPlatform::new();

    let state = deploy(&mut stack, &platform, None).await.unwrap();
    platform.fail_invoke("connection refused");

    let err = destroy(&state, &platform).await.unwrap_err();

    match err {
      DeployError::Release { id, .. } => assert_eq!(id, handle.trigger),
      other => panic!("unexpected error: {:?}", other),
    }
    // The trigger fires first on destroy, so nothing else was torn down
    assert!(platform.has_bucket("app-scripts"));
    assert!(platform.function("app-executor").is_some());
  }

  #[tokio::test]
  #[traced_test]
  async fn ignored_execution_failure_applies_to_delete_event() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path(), true);
    config.ignore_sql_errors = true;

    let (mut stack, handle) = declared(&config);
    let platform = MemoryPlatform::new();

    let state = deploy(&mut stack, &platform, None).await.unwrap();
    platform.fail_invoke("table does not exist");

    let result = destroy(&state, &platform).await.unwrap();

    assert_eq!(result.triggers.get(&handle.trigger), Some(&TriggerState::Deleted));
    assert!(logs_contain("script execution failed, ignoring"));
  }

  #[tokio::test]
  async fn destroy_without_trigger_record_is_an_error() {
    let temp = TempDir::new().unwrap();
    let (mut stack, handle) = declared(&test_config(temp.path(), false));
    let platform = MemoryPlatform::new();

    let mut state = deploy(&mut stack, &platform, None).await.unwrap();
    state.triggers.clear();

    let err = destroy(&state, &platform).await.unwrap_err();
    match err {
      DeployError::MissingTriggerState { id } => assert_eq!(id, handle.trigger),
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[tokio::test]
  async fn deleted_trigger_cannot_be_updated() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), false);
    let platform = MemoryPlatform::new();

    let (mut stack, _) = declared(&config);
    let state = deploy(&mut stack, &platform, None).await.unwrap();
    let result = destroy(&state, &platform).await.unwrap();

    // Feed the post-destroy trigger states back in as prior state
    let mut prior = state.clone();
    prior.triggers = result.triggers;

    let (mut stack, _) = declared(&config);
    let err = deploy(&mut stack, &platform, Some(&prior)).await.unwrap_err();
    assert!(matches!(err, DeployError::Lifecycle(_)));
  }
}
