//! In-memory platform for tests and dry runs.
//!
//! [`MemoryPlatform`] implements [`Platform`] entirely in memory and records
//! every side effect in an ordered journal, so tests can assert not just what
//! was created but in which order. Failure injection knobs simulate script
//! failures, upload failures, slow executors, and an unready database.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Platform, PlatformError, ReadTarget};
use crate::lifecycle::{InvocationRequest, LifecycleEvent};
use crate::resource::{BucketDef, FunctionDef};
use crate::util::hash::{ContentHash, hash_bytes};

/// One side effect recorded by [`MemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOp {
  CreateBucket {
    name: String,
  },
  DeleteBucket {
    name: String,
  },
  PutObject {
    bucket: String,
    key: String,
    content: ContentHash,
  },
  DeleteObject {
    bucket: String,
    key: String,
  },
  CreateFunction {
    name: String,
  },
  DeleteFunction {
    name: String,
  },
  GrantRead {
    grantee: String,
    target: ReadTarget,
  },
  RevokeRead {
    grantee: String,
    target: ReadTarget,
  },
  AllowConnection {
    from: String,
    endpoint: String,
    port: u16,
  },
  RevokeConnection {
    from: String,
    endpoint: String,
    port: u16,
  },
  DatabaseReady {
    id: String,
  },
  Invoke {
    function: String,
    event: LifecycleEvent,
    ignore_sql_errors: bool,
  },
}

#[derive(Default)]
struct MemoryState {
  journal: Vec<PlatformOp>,
  buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
  functions: BTreeMap<String, FunctionDef>,
  grants: BTreeSet<(String, ReadTarget)>,
  connections: BTreeSet<(String, String, u16)>,
  database_available: bool,
  invoke_failure: Option<String>,
  put_failure: Option<String>,
  invoke_delay: Option<Duration>,
}

/// Platform that records every side effect in memory.
pub struct MemoryPlatform {
  state: Mutex<MemoryState>,
}

impl MemoryPlatform {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(MemoryState {
        database_available: true,
        ..MemoryState::default()
      }),
    }
  }

  fn state(&self) -> MutexGuard<'_, MemoryState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Ordered journal of every operation performed so far.
  pub fn journal(&self) -> Vec<PlatformOp> {
    self.state().journal.clone()
  }

  /// Body of one stored object, if present.
  pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
    self.state().buckets.get(bucket)?.get(key).cloned()
  }

  /// Object keys currently stored in a bucket.
  pub fn object_keys(&self, bucket: &str) -> Vec<String> {
    self
      .state()
      .buckets
      .get(bucket)
      .map(|objects| objects.keys().cloned().collect())
      .unwrap_or_default()
  }

  pub fn has_bucket(&self, name: &str) -> bool {
    self.state().buckets.contains_key(name)
  }

  /// Definition of a deployed function, if present.
  pub fn function(&self, name: &str) -> Option<FunctionDef> {
    self.state().functions.get(name).cloned()
  }

  pub fn has_grant(&self, grantee: &str, target: &ReadTarget) -> bool {
    self.state().grants.contains(&(grantee.to_string(), target.clone()))
  }

  pub fn has_connection(&self, from: &str, endpoint: &str, port: u16) -> bool {
    self
      .state()
      .connections
      .contains(&(from.to_string(), endpoint.to_string(), port))
  }

  /// Make every subsequent invocation fail as a script execution error.
  pub fn fail_invoke(&self, message: &str) {
    self.state().invoke_failure = Some(message.to_string());
  }

  /// Make every subsequent object upload fail.
  pub fn fail_put_object(&self, message: &str) {
    self.state().put_failure = Some(message.to_string());
  }

  /// Delay every subsequent invocation, simulating a slow executor.
  pub fn delay_invoke(&self, delay: Duration) {
    self.state().invoke_delay = Some(delay);
  }

  /// Open or close the database readiness gate.
  pub fn set_database_ready(&self, ready: bool) {
    self.state().database_available = ready;
  }
}

impl Default for MemoryPlatform {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Platform for MemoryPlatform {
  async fn create_bucket(&self, def: &BucketDef) -> Result<(), PlatformError> {
    let mut state = self.state();
    state.buckets.entry(def.name.clone()).or_default();
    state.journal.push(PlatformOp::CreateBucket { name: def.name.clone() });
    debug!(bucket = %def.name, "created bucket");
    Ok(())
  }

  async fn delete_bucket(&self, name: &str) -> Result<(), PlatformError> {
    let mut state = self.state();
    if state.buckets.remove(name).is_none() {
      return Err(PlatformError::BucketNotFound { name: name.to_string() });
    }
    state.journal.push(PlatformOp::DeleteBucket { name: name.to_string() });
    debug!(bucket = %name, "deleted bucket");
    Ok(())
  }

  async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), PlatformError> {
    let mut state = self.state();
    if let Some(message) = &state.put_failure {
      return Err(PlatformError::Request {
        message: message.clone(),
      });
    }
    let Some(objects) = state.buckets.get_mut(bucket) else {
      return Err(PlatformError::BucketNotFound {
        name: bucket.to_string(),
      });
    };
    objects.insert(key.to_string(), body.to_vec());
    state.journal.push(PlatformOp::PutObject {
      bucket: bucket.to_string(),
      key: key.to_string(),
      content: hash_bytes(body),
    });
    Ok(())
  }

  async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), PlatformError> {
    let mut state = self.state();
    let Some(objects) = state.buckets.get_mut(bucket) else {
      return Err(PlatformError::BucketNotFound {
        name: bucket.to_string(),
      });
    };
    objects.remove(key);
    state.journal.push(PlatformOp::DeleteObject {
      bucket: bucket.to_string(),
      key: key.to_string(),
    });
    Ok(())
  }

  async fn create_function(&self, def: &FunctionDef) -> Result<(), PlatformError> {
    let mut state = self.state();
    state.functions.insert(def.name.clone(), def.clone());
    state.journal.push(PlatformOp::CreateFunction { name: def.name.clone() });
    debug!(function = %def.name, "created function");
    Ok(())
  }

  async fn delete_function(&self, name: &str) -> Result<(), PlatformError> {
    let mut state = self.state();
    if state.functions.remove(name).is_none() {
      return Err(PlatformError::FunctionNotFound { name: name.to_string() });
    }
    state.journal.push(PlatformOp::DeleteFunction { name: name.to_string() });
    debug!(function = %name, "deleted function");
    Ok(())
  }

  async fn grant_read(&self, grantee: &str, target: &ReadTarget) -> Result<(), PlatformError> {
    let mut state = self.state();
    state.grants.insert((grantee.to_string(), target.clone()));
    state.journal.push(PlatformOp::GrantRead {
      grantee: grantee.to_string(),
      target: target.clone(),
    });
    Ok(())
  }

  async fn revoke_read(&self, grantee: &str, target: &ReadTarget) -> Result<(), PlatformError> {
    let mut state = self.state();
    state.grants.remove(&(grantee.to_string(), target.clone()));
    state.journal.push(PlatformOp::RevokeRead {
      grantee: grantee.to_string(),
      target: target.clone(),
    });
    Ok(())
  }

  async fn allow_connection(&self, from: &str, endpoint: &str, port: u16) -> Result<(), PlatformError> {
    let mut state = self.state();
    state.connections.insert((from.to_string(), endpoint.to_string(), port));
    state.journal.push(PlatformOp::AllowConnection {
      from: from.to_string(),
      endpoint: endpoint.to_string(),
      port,
    });
    Ok(())
  }

  async fn revoke_connection(&self, from: &str, endpoint: &str, port: u16) -> Result<(), PlatformError> {
    let mut state = self.state();
    state.connections.remove(&(from.to_string(), endpoint.to_string(), port));
    state.journal.push(PlatformOp::RevokeConnection {
      from: from.to_string(),
      endpoint: endpoint.to_string(),
      port,
    });
    Ok(())
  }

  async fn database_ready(&self, external_id: &str) -> Result<(), PlatformError> {
    let mut state = self.state();
    if !state.database_available {
      return Err(PlatformError::DatabaseUnavailable {
        id: external_id.to_string(),
      });
    }
    state.journal.push(PlatformOp::DatabaseReady {
      id: external_id.to_string(),
    });
    Ok(())
  }

  async fn invoke(&self, function: &str, request: &InvocationRequest) -> Result<(), PlatformError> {
    let delay = self.state().invoke_delay;
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let mut state = self.state();
    if !state.functions.contains_key(function) {
      return Err(PlatformError::FunctionNotFound {
        name: function.to_string(),
      });
    }
    state.journal.push(PlatformOp::Invoke {
      function: function.to_string(),
      event: request.event,
      ignore_sql_errors: request.properties.ignore_sql_errors,
    });
    if let Some(message) = &state.invoke_failure {
      return Err(PlatformError::ExecutionFailed {
        message: message.clone(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lifecycle::TriggerProperties;
  use crate::resource::{NetworkPlacement, RemovalPolicy};

  fn bucket_def(name: &str) -> BucketDef {
    BucketDef {
      name: name.to_string(),
      removal_policy: RemovalPolicy::Destroy,
    }
  }

  fn function_def(name: &str) -> FunctionDef {
    FunctionDef {
      name: name.to_string(),
      artifact: "executor/handler.zip".to_string(),
      handler: "index.handler".to_string(),
      timeout_secs: 300,
      memory_mb: 512,
      placement: NetworkPlacement {
        network_id: "vpc-1".to_string(),
        subnet_ids: vec!["subnet-a".to_string()],
      },
      environment: BTreeMap::new(),
    }
  }

  #[tokio::test]
  async fn stores_and_deletes_objects() {
    let platform = MemoryPlatform::new();
    platform.create_bucket(&bucket_def("scripts")).await.unwrap();
    platform.put_object("scripts", "create.sql", b"SELECT 1;").await.unwrap();

    assert_eq!(platform.object("scripts", "create.sql").unwrap(), b"SELECT 1;");
    assert_eq!(platform.object_keys("scripts"), vec!["create.sql".to_string()]);

    platform.delete_object("scripts", "create.sql").await.unwrap();
    assert!(platform.object("scripts", "create.sql").is_none());
  }

  #[tokio::test]
  async fn put_object_requires_bucket() {
    let platform = MemoryPlatform::new();
    let err = platform.put_object("missing", "create.sql", b"x").await.unwrap_err();
    assert!(matches!(err, PlatformError::BucketNotFound { .. }));
  }

  #[tokio::test]
  async fn delete_bucket_removes_contents() {
    let platform = MemoryPlatform::new();
    platform.create_bucket(&bucket_def("scripts")).await.unwrap();
    platform.put_object("scripts", "create.sql", b"SELECT 1;").await.unwrap();

    platform.delete_bucket("scripts").await.unwrap();
    assert!(!platform.has_bucket("scripts"));
    assert!(platform.object("scripts", "create.sql").is_none());
  }

  #[tokio::test]
  async fn journal_preserves_operation_order() {
    let platform = MemoryPlatform::new();
    platform.create_bucket(&bucket_def("scripts")).await.unwrap();
    platform.create_function(&function_def("executor")).await.unwrap();
    platform
      .grant_read("executor", &ReadTarget::Bucket("scripts".to_string()))
      .await
      .unwrap();

    let journal = platform.journal();
    assert_eq!(journal, vec![
      PlatformOp::CreateBucket {
        name: "scripts".to_string()
      },
      PlatformOp::CreateFunction {
        name: "executor".to_string()
      },
      PlatformOp::GrantRead {
        grantee: "executor".to_string(),
        target: ReadTarget::Bucket("scripts".to_string()),
      },
    ]);
  }

  #[tokio::test]
  async fn invoke_records_event_and_properties() {
    let platform = MemoryPlatform::new();
    platform.create_function(&function_def("executor")).await.unwrap();

    let request = InvocationRequest {
      event: LifecycleEvent::Create,
      properties: TriggerProperties {
        ignore_sql_errors: true,
      },
    };
    platform.invoke("executor", &request).await.unwrap();

    assert!(platform.journal().contains(&PlatformOp::Invoke {
      function: "executor".to_string(),
      event: LifecycleEvent::Create,
      ignore_sql_errors: true,
    }));
  }

  #[tokio::test]
  async fn invoke_failure_injection() {
    let platform = MemoryPlatform::new();
    platform.create_function(&function_def("executor")).await.unwrap();
    platform.fail_invoke("syntax error near SELECT");

    let request = InvocationRequest {
      event: LifecycleEvent::Create,
      properties: TriggerProperties::default(),
    };
    let err = platform.invoke("executor", &request).await.unwrap_err();
    assert!(matches!(err, PlatformError::ExecutionFailed { .. }));
    assert!(err.to_string().contains("syntax error"));
  }

  #[tokio::test]
  async fn invoke_requires_function() {
    let platform = MemoryPlatform::new();
    let request = InvocationRequest {
      event: LifecycleEvent::Create,
      properties: TriggerProperties::default(),
    };
    let err = platform.invoke("missing", &request).await.unwrap_err();
    assert!(matches!(err, PlatformError::FunctionNotFound { .. }));
  }

  #[tokio::test]
  async fn database_gate_can_be_closed() {
    let platform = MemoryPlatform::new();
    platform.database_ready("db-1").await.unwrap();

    platform.set_database_ready(false);
    let err = platform.database_ready("db-1").await.unwrap_err();
    assert!(matches!(err, PlatformError::DatabaseUnavailable { .. }));
  }

  #[tokio::test]
  async fn grants_and_connections_roundtrip() {
    let platform = MemoryPlatform::new();
    let target = ReadTarget::Secret("secret-1".to_string());

    platform.grant_read("executor", &target).await.unwrap();
    assert!(platform.has_grant("executor", &target));

    platform.revoke_read("executor", &target).await.unwrap();
    assert!(!platform.has_grant("executor", &target));

    platform.allow_connection("executor", "db-1.internal", 1433).await.unwrap();
    assert!(platform.has_connection("executor", "db-1.internal", 1433));

    platform.revoke_connection("executor", "db-1.internal", 1433).await.unwrap();
    assert!(!platform.has_connection("executor", "db-1.internal", 1433));
  }
}
