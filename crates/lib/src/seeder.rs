//! Seeder declaration.
//!
//! [`declare`] is the construct entry point. It validates a [`SeederConfig`],
//! spawns the script staging task, and declares every resource the seeding
//! mechanism needs into a [`Stack`]: the scripts bucket, the upload carrying
//! the staging task, the executor function, the provider indirection, the
//! lifecycle trigger, the read grants, and the network connection to the
//! database. Resources are wired with explicit dependency edges; nothing is
//! materialized here.
//!
//! Deploy ordering comes entirely from those edges. The trigger sits at the
//! top of the graph, so its create event cannot fire until the database is
//! ready, the scripts are uploaded, and the executor can reach everything it
//! needs.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::config::{ConfigError, SecretRef, SeederConfig};
use crate::consts::{
  CREATE_SCRIPT_KEY, DELETE_SCRIPT_KEY, ENV_DB_ENDPOINT, ENV_DB_SECRET_ID, ENV_RUN_ON_DELETE, ENV_SCRIPTS_BUCKET,
  EXECUTOR_TIMEOUT_SECS,
};
use crate::graph::{GraphError, ResourceGraph, StackManifest};
use crate::lifecycle::TriggerProperties;
use crate::resource::{
  BucketDef, ConnectionDef, ExternalDef, FunctionDef, GrantDef, GrantTarget, LogicalId, NetworkPlacement, ProviderDef,
  RemovalPolicy, ResourceDef, TriggerDef, UploadDef,
};
use crate::stage::{StagingTask, spawn_staging};

/// Error raised while declaring a seeder.
#[derive(Debug, thiserror::Error)]
pub enum SeederError {
  /// Precondition validation failed.
  #[error(transparent)]
  Config(#[from] ConfigError),

  /// The declaration collided with resources already in the stack.
  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// Declared resources plus the staging tasks they carry.
///
/// One stack can hold any number of seeders; logical ids are namespaced by
/// seeder name. The stack is pure data until handed to the deploy engine.
#[derive(Default)]
pub struct Stack {
  graph: ResourceGraph,
  stagings: HashMap<LogicalId, StagingTask>,
}

impl Stack {
  pub fn new() -> Self {
    Self::default()
  }

  /// Dependency graph of everything declared so far.
  pub fn graph(&self) -> &ResourceGraph {
    &self.graph
  }

  /// Synthesize the serializable manifest of the declared stack.
  pub fn manifest(&self) -> StackManifest {
    self.graph.manifest()
  }

  /// Detach the staging task carried by an upload resource.
  ///
  /// Each task can be taken once; the deploy engine consumes it when the
  /// upload materializes.
  pub fn take_staging(&mut self, id: &LogicalId) -> Option<StagingTask> {
    self.stagings.remove(id)
  }

  /// Whether an upload resource still carries its staging task.
  pub fn has_staging(&self, id: &LogicalId) -> bool {
    self.stagings.contains_key(id)
  }
}

/// Logical ids of the resources one [`declare`] call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeederHandle {
  pub database: LogicalId,
  pub bucket: LogicalId,
  pub upload: LogicalId,
  pub function: LogicalId,
  pub provider: LogicalId,
  pub trigger: LogicalId,
  pub bucket_grant: LogicalId,
  pub secret_grant: LogicalId,
  pub connection: LogicalId,
}

/// Declare the seeding resources for one database into a stack.
///
/// Validation runs first and fails fast: on error, nothing is declared and
/// no staging task is spawned. On success the stack gains nine resources
/// namespaced under `name`, and the upload resource carries the in-flight
/// staging task.
///
/// Staging is spawned on the blocking pool, so this must be called from
/// within a runtime.
///
/// # Arguments
///
/// * `stack` - Stack the resources are declared into
/// * `name` - Seeder name; prefixes every logical id and derived physical name
/// * `config` - Validated against its preconditions before anything else
///
/// # Errors
///
/// Returns [`SeederError::Config`] when validation fails, or
/// [`SeederError::Graph`] when `name` collides with an earlier declaration.
pub fn declare(stack: &mut Stack, name: &str, config: &SeederConfig) -> Result<SeederHandle, SeederError> {
  config.validate()?;

  // validate() has already established the secret is present.
  let secret = config.database.secret.as_ref().ok_or_else(|| ConfigError::MissingSecret {
    database: config.database.id.clone(),
  })?;

  let handle = SeederHandle {
    database: child_id(name, "database"),
    bucket: child_id(name, "bucket"),
    upload: child_id(name, "upload"),
    function: child_id(name, "function"),
    provider: child_id(name, "provider"),
    trigger: child_id(name, "trigger"),
    bucket_grant: child_id(name, "grant/bucket"),
    secret_grant: child_id(name, "grant/secret"),
    connection: child_id(name, "connection"),
  };

  let bucket_name = format!("{}-scripts", name);
  let function_name = format!("{}-executor", name);

  declare_resources(stack, &handle, config, secret, &bucket_name, &function_name)?;
  wire_edges(stack, &handle)?;

  // Spawned last: a failed declaration must not leave a task behind.
  let task = spawn_staging(config);
  stack.stagings.insert(handle.upload.clone(), task);
  debug!(upload = %handle.upload, "staging task spawned");

  info!(
    seeder = name,
    database = %config.database.id,
    resources = stack.graph.len(),
    run_on_delete = config.run_on_delete(),
    "declared seeder"
  );

  Ok(handle)
}

fn declare_resources(
  stack: &mut Stack,
  handle: &SeederHandle,
  config: &SeederConfig,
  secret: &SecretRef,
  bucket_name: &str,
  function_name: &str,
) -> Result<(), SeederError> {
  stack.graph.insert(
    handle.database.clone(),
    ResourceDef::External(ExternalDef {
      external_id: config.database.id.clone(),
    }),
  )?;

  stack.graph.insert(
    handle.bucket.clone(),
    ResourceDef::Bucket(BucketDef {
      name: bucket_name.to_string(),
      removal_policy: RemovalPolicy::Destroy,
    }),
  )?;

  let mut keys = vec![CREATE_SCRIPT_KEY.to_string()];
  if config.run_on_delete() {
    keys.push(DELETE_SCRIPT_KEY.to_string());
  }
  stack.graph.insert(
    handle.upload.clone(),
    ResourceDef::Upload(UploadDef {
      bucket: handle.bucket.clone(),
      keys,
    }),
  )?;

  let environment = BTreeMap::from([
    (ENV_DB_ENDPOINT.to_string(), config.database.endpoint_address.clone()),
    (ENV_DB_SECRET_ID.to_string(), secret.id.clone()),
    (ENV_SCRIPTS_BUCKET.to_string(), bucket_name.to_string()),
    (ENV_RUN_ON_DELETE.to_string(), config.run_on_delete().to_string()),
  ]);
  stack.graph.insert(
    handle.function.clone(),
    ResourceDef::Function(FunctionDef {
      name: function_name.to_string(),
      artifact: config.artifact().to_string(),
      handler: config.handler().to_string(),
      timeout_secs: EXECUTOR_TIMEOUT_SECS,
      memory_mb: config.memory(),
      placement: NetworkPlacement {
        network_id: config.network.id.clone(),
        subnet_ids: config.network.private_subnet_ids.clone(),
      },
      environment,
    }),
  )?;

  stack.graph.insert(
    handle.provider.clone(),
    ResourceDef::Provider(ProviderDef {
      function: handle.function.clone(),
    }),
  )?;

  stack.graph.insert(
    handle.trigger.clone(),
    ResourceDef::Trigger(TriggerDef {
      provider: handle.provider.clone(),
      properties: TriggerProperties {
        ignore_sql_errors: config.ignore_sql_errors,
      },
    }),
  )?;

  stack.graph.insert(
    handle.bucket_grant.clone(),
    ResourceDef::Grant(GrantDef {
      grantee: handle.function.clone(),
      target: GrantTarget::Bucket(handle.bucket.clone()),
    }),
  )?;

  stack.graph.insert(
    handle.secret_grant.clone(),
    ResourceDef::Grant(GrantDef {
      grantee: handle.function.clone(),
      target: GrantTarget::Secret(secret.id.clone()),
    }),
  )?;

  stack.graph.insert(
    handle.connection.clone(),
    ResourceDef::Connection(ConnectionDef {
      from: handle.function.clone(),
      to_endpoint: config.database.endpoint_address.clone(),
      port: config.port,
    }),
  )?;

  Ok(())
}

/// Wire the ordering edges between the declared resources.
///
/// The trigger depends on everything the executor's first invocation needs:
/// the provider chain, the database, the uploaded scripts, both grants, and
/// the network path.
fn wire_edges(stack: &mut Stack, handle: &SeederHandle) -> Result<(), SeederError> {
  let graph = &mut stack.graph;

  graph.depends_on(&handle.upload, &handle.bucket)?;
  graph.depends_on(&handle.provider, &handle.function)?;
  graph.depends_on(&handle.bucket_grant, &handle.function)?;
  graph.depends_on(&handle.bucket_grant, &handle.bucket)?;
  graph.depends_on(&handle.secret_grant, &handle.function)?;
  graph.depends_on(&handle.connection, &handle.function)?;

  graph.depends_on(&handle.trigger, &handle.provider)?;
  graph.depends_on(&handle.trigger, &handle.database)?;
  graph.depends_on(&handle.trigger, &handle.upload)?;
  graph.depends_on(&handle.trigger, &handle.bucket_grant)?;
  graph.depends_on(&handle.trigger, &handle.secret_grant)?;
  graph.depends_on(&handle.trigger, &handle.connection)?;

  Ok(())
}

fn child_id(name: &str, part: &str) -> LogicalId {
  LogicalId(format!("{}/{}", name, part))
}
