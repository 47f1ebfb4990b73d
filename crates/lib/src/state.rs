//! Deploy state persistence.
//!
//! A successful deploy saves one [`DeployState`] record: the synthesized
//! manifest, the creation order, every trigger's settled state, and the
//! staged scripts fingerprints. A later run consults the record to decide
//! between create and update events; destroy walks its creation order in
//! reverse.
//!
//! Writes are atomic (write to a temp file, then rename) so a crash never
//! leaves a half-written state file behind.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::StackManifest;
use crate::lifecycle::TriggerState;
use crate::resource::LogicalId;
use crate::util::hash::{ContentHash, ObjectHash};

/// Format version written into every state file.
pub const STATE_VERSION: u32 = 1;

/// State file name inside the store directory.
const STATE_FILENAME: &str = "state.json";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
  #[error("failed to create state directory: {0}")]
  CreateDir(io::Error),

  #[error("failed to read state file: {0}")]
  Read(io::Error),

  #[error("failed to write state file: {0}")]
  Write(io::Error),

  #[error("failed to parse state file: {0}")]
  Parse(serde_json::Error),

  #[error("failed to serialize state: {0}")]
  Serialize(serde_json::Error),

  #[error("unsupported state version: {0}")]
  UnsupportedVersion(u32),
}

/// Record of the last successful deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployState {
  pub version: u32,
  /// Identifier of the deploy run.
  pub id: String,
  /// Seconds since the epoch at save time.
  pub created_at: u64,
  /// Everything that was declared.
  pub manifest: StackManifest,
  /// Resources in the order they were materialized.
  pub resources: Vec<LogicalId>,
  /// Settled lifecycle state of each trigger.
  pub triggers: BTreeMap<LogicalId, TriggerState>,
  /// Fingerprint of the staged scripts each upload shipped.
  pub scripts: BTreeMap<LogicalId, ContentHash>,
}

impl DeployState {
  pub fn new(
    id: String,
    manifest: StackManifest,
    resources: Vec<LogicalId>,
    triggers: BTreeMap<LogicalId, TriggerState>,
    scripts: BTreeMap<LogicalId, ContentHash>,
  ) -> Self {
    Self {
      version: STATE_VERSION,
      id,
      created_at: now_epoch_secs(),
      manifest,
      resources,
      triggers,
      scripts,
    }
  }
}

/// Generate a deploy state id from the manifest hash and the current time.
pub fn generate_state_id(manifest_hash: &ObjectHash) -> String {
  let millis = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis())
    .unwrap_or(0);
  format!("{}-{}", millis, &manifest_hash.0[..8])
}

/// Seconds since the Unix epoch; zero if the clock reads before it.
fn now_epoch_secs() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}

/// Stores at most one current deploy state on disk.
#[derive(Debug, Clone)]
pub struct StateStore {
  base_path: PathBuf,
}

impl StateStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  fn state_path(&self) -> PathBuf {
    self.base_path.join(STATE_FILENAME)
  }

  fn ensure_dir(&self) -> Result<(), StateError> {
    fs::create_dir_all(&self.base_path).map_err(StateError::CreateDir)
  }

  /// Save the deploy state, replacing any previous one.
  ///
  /// Uses atomic write (write to temp, then rename) to prevent corruption.
  pub fn save(&self, state: &DeployState) -> Result<(), StateError> {
    self.ensure_dir()?;

    let path = self.state_path();
    let temp_path = self.base_path.join(format!("{}.tmp", STATE_FILENAME));

    let content = serde_json::to_string_pretty(state).map_err(StateError::Serialize)?;
    fs::write(&temp_path, &content).map_err(StateError::Write)?;
    fs::rename(&temp_path, &path).map_err(StateError::Write)?;

    debug!(id = %state.id, path = %path.display(), "saved deploy state");
    Ok(())
  }

  /// Load the current deploy state.
  ///
  /// Returns `Ok(None)` if nothing has been deployed yet.
  pub fn load(&self) -> Result<Option<DeployState>, StateError> {
    let path = self.state_path();

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(StateError::Read(e)),
    };

    let state: DeployState = serde_json::from_str(&content).map_err(StateError::Parse)?;

    if state.version != STATE_VERSION {
      return Err(StateError::UnsupportedVersion(state.version));
    }

    Ok(Some(state))
  }

  /// Remove the deploy state, if any.
  pub fn clear(&self) -> Result<(), StateError> {
    match fs::remove_file(self.state_path()) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(StateError::Write(e)),
    }
  }
}
