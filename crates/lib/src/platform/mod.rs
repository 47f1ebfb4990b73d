//! Contracts of the external services the seeder materializes against.
//!
//! Every side effect flows through the [`Platform`] trait: object storage,
//! compute functions, read grants, network rules, the database readiness
//! gate, and executor invocation. Production deployments implement it against
//! real services; [`MemoryPlatform`] keeps everything in memory for tests and
//! local dry runs.
//!
//! The trait speaks in physical names. Resolving logical ids to names is the
//! deploy engine's job.

pub mod memory;

pub use memory::{MemoryPlatform, PlatformOp};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::lifecycle::InvocationRequest;
use crate::resource::{BucketDef, FunctionDef};

/// Error raised by a platform operation.
///
/// `ExecutionFailed` is the one variant the ignore-errors policy may
/// suppress; everything else is an infrastructure failure and always
/// surfaces.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
  #[error("bucket {name} not found")]
  BucketNotFound { name: String },

  #[error("function {name} not found")]
  FunctionNotFound { name: String },

  #[error("database {id} is not ready")]
  DatabaseUnavailable { id: String },

  #[error("script execution failed: {message}")]
  ExecutionFailed { message: String },

  #[error("executor invocation exceeded {timeout_secs}s")]
  InvokeTimeout { timeout_secs: u64 },

  #[error("platform request failed: {message}")]
  Request { message: String },
}

/// Physical target of a read grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadTarget {
  Bucket(String),
  Secret(String),
}

/// External service surface the deploy engine drives.
///
/// Creation calls are upserts: re-applying an unchanged definition must
/// succeed without duplicating the resource.
#[async_trait]
pub trait Platform: Send + Sync {
  /// Create or update the storage bucket.
  async fn create_bucket(&self, def: &BucketDef) -> Result<(), PlatformError>;

  /// Delete a bucket together with any remaining contents.
  async fn delete_bucket(&self, name: &str) -> Result<(), PlatformError>;

  /// Write one object into a bucket.
  async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), PlatformError>;

  /// Remove one object from a bucket.
  async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), PlatformError>;

  /// Create or update the executor function.
  async fn create_function(&self, def: &FunctionDef) -> Result<(), PlatformError>;

  /// Delete the executor function.
  async fn delete_function(&self, name: &str) -> Result<(), PlatformError>;

  /// Grant a function read access to a target.
  async fn grant_read(&self, grantee: &str, target: &ReadTarget) -> Result<(), PlatformError>;

  /// Revoke a previously granted read.
  async fn revoke_read(&self, grantee: &str, target: &ReadTarget) -> Result<(), PlatformError>;

  /// Allow a function to open connections to an endpoint and port.
  async fn allow_connection(&self, from: &str, endpoint: &str, port: u16) -> Result<(), PlatformError>;

  /// Revoke a previously allowed connection.
  async fn revoke_connection(&self, from: &str, endpoint: &str, port: u16) -> Result<(), PlatformError>;

  /// Gate on an externally owned database being provisioned and reachable.
  async fn database_ready(&self, external_id: &str) -> Result<(), PlatformError>;

  /// Invoke a function with one lifecycle payload.
  ///
  /// # Errors
  ///
  /// Returns `ExecutionFailed` when the script itself fails; any other
  /// variant signals an infrastructure problem.
  async fn invoke(&self, function: &str, request: &InvocationRequest) -> Result<(), PlatformError>;
}
