//! Declarative resource definitions.
//!
//! Declaring a seeder produces a set of [`ResourceDef`]s keyed by
//! [`LogicalId`] in a dependency graph; nothing here talks to a platform.
//! The deploy engine materializes the definitions later, in graph order.
//!
//! Definitions are plain serializable data so the synthesized stack can be
//! inspected, hashed, and persisted in deploy state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::lifecycle::TriggerProperties;
use crate::util::hash::Hashable;

/// Identifier of a declared resource within one stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalId(pub String);

impl std::fmt::Display for LogicalId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// What happens to a resource (and its contents) when the stack is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
  /// Delete the resource, including any remaining contents.
  Destroy,
  /// Leave the resource behind.
  Retain,
}

/// A resource owned by some other stack, present only for ordering.
///
/// The seeder declares the database this way: it never creates or deletes
/// the instance, but the trigger's create event must be ordered after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDef {
  pub external_id: String,
}

/// Object storage location for the staged scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDef {
  pub name: String,
  pub removal_policy: RemovalPolicy,
}

/// Upload of the staged script files into a bucket.
///
/// Materializing this resource joins the staging task and ships each staged
/// file under its fixed key. Its position in the graph is what guarantees
/// scripts are in place before the trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDef {
  pub bucket: LogicalId,
  /// Object keys expected in the staged directory.
  pub keys: Vec<String>,
}

/// Subnets the executor function is placed across.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlacement {
  pub network_id: String,
  pub subnet_ids: Vec<String>,
}

/// The executor compute function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
  pub name: String,
  /// Opaque code artifact shipped to the platform.
  pub artifact: String,
  /// Entry point inside the artifact.
  pub handler: String,
  pub timeout_secs: u64,
  pub memory_mb: u32,
  pub placement: NetworkPlacement,
  pub environment: BTreeMap<String, String>,
}

/// Indirection between the trigger and the executor function.
///
/// The trigger never references the function directly; events go to the
/// provider, which forwards them as invocations of its function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDef {
  pub function: LogicalId,
}

/// The lifecycle trigger resource.
///
/// Creation, update, and deletion of this resource are the events that drive
/// executor invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDef {
  pub provider: LogicalId,
  pub properties: TriggerProperties,
}

/// Target of a read grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantTarget {
  /// A bucket declared in this stack.
  Bucket(LogicalId),
  /// A secret owned elsewhere, named by its identifier.
  Secret(String),
}

/// Read-only access grant from a declared function to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantDef {
  pub grantee: LogicalId,
  pub target: GrantTarget,
}

/// Network permission for a function to open connections to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDef {
  pub from: LogicalId,
  pub to_endpoint: String,
  pub port: u16,
}

/// A declared resource of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceDef {
  External(ExternalDef),
  Bucket(BucketDef),
  Upload(UploadDef),
  Function(FunctionDef),
  Provider(ProviderDef),
  Trigger(TriggerDef),
  Grant(GrantDef),
  Connection(ConnectionDef),
}

impl ResourceDef {
  /// Short kind name for logs and summaries.
  pub fn kind(&self) -> &'static str {
    match self {
      ResourceDef::External(_) => "external",
      ResourceDef::Bucket(_) => "bucket",
      ResourceDef::Upload(_) => "upload",
      ResourceDef::Function(_) => "function",
      ResourceDef::Provider(_) => "provider",
      ResourceDef::Trigger(_) => "trigger",
      ResourceDef::Grant(_) => "grant",
      ResourceDef::Connection(_) => "connection",
    }
  }
}

impl Hashable for ResourceDef {}
