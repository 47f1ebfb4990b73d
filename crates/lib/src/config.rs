//! Seeder configuration and precondition validation.
//!
//! [`SeederConfig`] is the construct input: references to the network and
//! database the seeder attaches to, the script paths to ship, and the
//! executor tuning knobs. [`SeederConfig::validate`] is the fail-fast gate
//! that runs before any resource is declared.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_EXECUTOR_ARTIFACT, DEFAULT_EXECUTOR_HANDLER, DEFAULT_MEMORY_MB};

/// Reference to a credential secret holding the database login.
///
/// The seeder never reads the secret material; the executor resolves it at
/// runtime from the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
  pub id: String,
}

/// Reference to the network the executor is placed into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRef {
  pub id: String,
  /// Subnets of the private class; the executor is placed across these.
  pub private_subnet_ids: Vec<String>,
}

/// Reference to the managed database instance being seeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRef {
  pub id: String,
  pub endpoint_address: String,
  /// Credential secret attached to the instance. Required by validation;
  /// optional here because upstream references may lack one.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub secret: Option<SecretRef>,
}

/// Construct input for a SQL seeder.
///
/// # Validation
///
/// [`validate`](Self::validate) must pass before the configuration is used to
/// declare resources:
/// - the database reference must carry a secret
/// - `create_script` must exist on the local filesystem
/// - `delete_script`, when given, must exist as well
///
/// # Defaults
///
/// `memory_mb` falls back to 512, `ignore_sql_errors` to `false`, and the
/// executor code reference to the bundled artifact when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeederConfig {
  pub network: NetworkRef,
  pub database: DatabaseRef,
  /// Port the executor connects to the database on.
  pub port: u16,
  /// SQL run when the trigger is created or updated.
  pub create_script: PathBuf,
  /// SQL run when the trigger is deleted. Teardown is a no-op without it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub delete_script: Option<PathBuf>,
  /// Executor memory allocation in MB.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub memory_mb: Option<u32>,
  /// Code artifact shipped with the executor function.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub executor_artifact: Option<String>,
  /// Entry point inside the executor artifact.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub executor_handler: Option<String>,
  /// Suppress (and log) script execution failures instead of failing the
  /// lifecycle transition.
  #[serde(default)]
  pub ignore_sql_errors: bool,
}

/// Error raised by precondition validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("database {database} has no associated credential secret")]
  MissingSecret { database: String },

  #[error("create script not found: {}", path.display())]
  CreateScriptMissing { path: PathBuf },

  #[error("delete script not found: {}", path.display())]
  DeleteScriptMissing { path: PathBuf },
}

impl SeederConfig {
  /// Check the preconditions for declaring a seeder.
  ///
  /// Fails synchronously, before any resource is declared, when the database
  /// reference has no secret or a configured script path does not exist.
  /// No side effects on failure.
  ///
  /// # Errors
  ///
  /// Returns a [`ConfigError`] naming the offending reference or path.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.database.secret.is_none() {
      return Err(ConfigError::MissingSecret {
        database: self.database.id.clone(),
      });
    }

    if !self.create_script.exists() {
      return Err(ConfigError::CreateScriptMissing {
        path: self.create_script.clone(),
      });
    }

    if let Some(delete_script) = &self.delete_script
      && !delete_script.exists()
    {
      return Err(ConfigError::DeleteScriptMissing {
        path: delete_script.clone(),
      });
    }

    Ok(())
  }

  /// Whether the executor should run a delete script at teardown.
  pub fn run_on_delete(&self) -> bool {
    self.delete_script.is_some()
  }

  /// Executor memory allocation with the default applied.
  pub fn memory(&self) -> u32 {
    self.memory_mb.unwrap_or(DEFAULT_MEMORY_MB)
  }

  /// Executor code artifact with the default applied.
  pub fn artifact(&self) -> &str {
    self.executor_artifact.as_deref().unwrap_or(DEFAULT_EXECUTOR_ARTIFACT)
  }

  /// Executor entry point with the default applied.
  pub fn handler(&self) -> &str {
    self.executor_handler.as_deref().unwrap_or(DEFAULT_EXECUTOR_HANDLER)
  }
}
