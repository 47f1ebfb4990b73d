//! Script staging.
//!
//! Staging copies the configured SQL files into a fresh temporary directory
//! under their fixed object keys. The directory is owned by the returned
//! [`StagingArtifact`] and removed when it drops; cleanup never relies on
//! process-exit hooks.
//!
//! Declaration spawns the copy on the blocking pool via [`spawn_staging`] and
//! continues immediately. The upload resource joins the task when it
//! materializes, which makes staging completion an ordering edge in the
//! deploy graph rather than a blocking call at declaration time.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::SeederConfig;
use crate::consts::{CREATE_SCRIPT_KEY, DELETE_SCRIPT_KEY};
use crate::util::hash::{ContentHash, DirHashError, hash_directory};

/// Error raised while staging scripts.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
  #[error("failed to allocate staging directory: {message}")]
  CreateDir { message: String },

  #[error("failed to copy {} to staged {key}: {message}", src.display())]
  CopyScript {
    src: PathBuf,
    key: String,
    message: String,
  },

  #[error("failed to read staged {key}: {message}")]
  ReadStaged { key: String, message: String },

  #[error(transparent)]
  Fingerprint(#[from] DirHashError),

  #[error("staging task was cancelled before completion")]
  TaskCancelled,
}

/// Staged scripts awaiting upload.
///
/// Owns the temporary staging directory; the directory and its contents are
/// removed when the artifact drops.
#[derive(Debug)]
pub struct StagingArtifact {
  dir: TempDir,
  keys: Vec<String>,
  content_hash: ContentHash,
}

impl StagingArtifact {
  /// Location of the staged files.
  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  /// Object keys present in the staging directory, in upload order.
  pub fn keys(&self) -> &[String] {
    &self.keys
  }

  /// Fingerprint of the staged contents.
  pub fn content_hash(&self) -> &ContentHash {
    &self.content_hash
  }

  /// Read one staged file back for upload.
  ///
  /// # Errors
  ///
  /// Returns `ReadStaged` if the key cannot be read from the staging
  /// directory.
  pub fn read(&self, key: &str) -> Result<Vec<u8>, StageError> {
    fs::read(self.dir.path().join(key)).map_err(|e| StageError::ReadStaged {
      key: key.to_string(),
      message: e.to_string(),
    })
  }
}

/// Stage the configured scripts into a fresh temporary directory.
///
/// The create script is always copied under [`CREATE_SCRIPT_KEY`]; the delete
/// script, when given, under [`DELETE_SCRIPT_KEY`]. Nothing else ends up in
/// the directory.
///
/// # Errors
///
/// Any directory allocation or copy failure is fatal to the run; there is no
/// partial artifact to recover.
pub fn stage_scripts(create_script: &Path, delete_script: Option<&Path>) -> Result<StagingArtifact, StageError> {
  let dir = TempDir::new().map_err(|e| StageError::CreateDir { message: e.to_string() })?;

  let mut keys = Vec::new();
  copy_into(create_script, dir.path(), CREATE_SCRIPT_KEY)?;
  keys.push(CREATE_SCRIPT_KEY.to_string());

  if let Some(delete_script) = delete_script {
    copy_into(delete_script, dir.path(), DELETE_SCRIPT_KEY)?;
    keys.push(DELETE_SCRIPT_KEY.to_string());
  }

  let content_hash = hash_directory(dir.path())?;
  debug!(dir = %dir.path().display(), hash = %content_hash, "staged scripts");

  Ok(StagingArtifact {
    dir,
    keys,
    content_hash,
  })
}

/// Handle to an in-flight staging task.
pub type StagingTask = JoinHandle<Result<StagingArtifact, StageError>>;

/// Spawn the staging copy on the blocking pool.
///
/// Returns immediately; the caller's declaration flow never waits on the
/// copy. Join the handle with [`join_staging`] when the upload resource
/// materializes.
pub fn spawn_staging(config: &SeederConfig) -> StagingTask {
  let create = config.create_script.clone();
  let delete = config.delete_script.clone();
  tokio::task::spawn_blocking(move || stage_scripts(&create, delete.as_deref()))
}

/// Wait for a staging task and surface its result.
///
/// # Errors
///
/// Returns the task's own [`StageError`], or `TaskCancelled` if the task was
/// aborted or panicked before producing one.
pub async fn join_staging(task: StagingTask) -> Result<StagingArtifact, StageError> {
  task.await.map_err(|_| StageError::TaskCancelled)?
}

fn copy_into(src: &Path, dir: &Path, key: &str) -> Result<(), StageError> {
  fs::copy(src, dir.join(key)).map_err(|e| StageError::CopyScript {
    src: src.to_path_buf(),
    key: key.to_string(),
    message: e.to_string(),
  })?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{DatabaseRef, NetworkRef, SecretRef};
  use tempfile::tempdir;

  fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
  }

  #[test]
  fn stages_create_script_only() {
    let temp = tempdir().unwrap();
    let create = write_script(temp.path(), "init.sql", "CREATE TABLE t (id INT);");

    let artifact = stage_scripts(&create, None).unwrap();

    assert_eq!(artifact.keys(), &[CREATE_SCRIPT_KEY.to_string()]);
    assert!(artifact.path().join(CREATE_SCRIPT_KEY).exists());
    assert!(!artifact.path().join(DELETE_SCRIPT_KEY).exists());

    // Exactly one entry in the staging directory
    let count = fs::read_dir(artifact.path()).unwrap().count();
    assert_eq!(count, 1);
  }

  #[test]
  fn stages_both_scripts_under_fixed_keys() {
    let temp = tempdir().unwrap();
    let create = write_script(temp.path(), "init.sql", "CREATE TABLE t (id INT);");
    let delete = write_script(temp.path(), "teardown.sql", "DROP TABLE t;");

    let artifact = stage_scripts(&create, Some(&delete)).unwrap();

    assert_eq!(artifact.keys(), &[
      CREATE_SCRIPT_KEY.to_string(),
      DELETE_SCRIPT_KEY.to_string()
    ]);
    assert_eq!(
      fs::read_to_string(artifact.path().join(CREATE_SCRIPT_KEY)).unwrap(),
      "CREATE TABLE t (id INT);"
    );
    assert_eq!(
      fs::read_to_string(artifact.path().join(DELETE_SCRIPT_KEY)).unwrap(),
      "DROP TABLE t;"
    );

    let count = fs::read_dir(artifact.path()).unwrap().count();
    assert_eq!(count, 2);
  }

  #[test]
  fn staging_dir_removed_on_drop() {
    let temp = tempdir().unwrap();
    let create = write_script(temp.path(), "init.sql", "SELECT 1;");

    let artifact = stage_scripts(&create, None).unwrap();
    let staged_path = artifact.path().to_path_buf();
    assert!(staged_path.exists());

    drop(artifact);
    assert!(!staged_path.exists());
  }

  #[test]
  fn missing_source_is_fatal() {
    let temp = tempdir().unwrap();
    let missing = temp.path().join("nope.sql");

    let err = stage_scripts(&missing, None).unwrap_err();
    assert!(matches!(err, StageError::CopyScript { .. }));
    assert!(err.to_string().contains("nope.sql"));
  }

  #[test]
  fn fingerprint_tracks_script_content() {
    let temp = tempdir().unwrap();
    let create = write_script(temp.path(), "init.sql", "SELECT 1;");

    let first = stage_scripts(&create, None).unwrap();
    let second = stage_scripts(&create, None).unwrap();
    assert_eq!(first.content_hash(), second.content_hash());

    fs::write(&create, "SELECT 2;").unwrap();
    let changed = stage_scripts(&create, None).unwrap();
    assert_ne!(first.content_hash(), changed.content_hash());
  }

  #[test]
  fn read_returns_staged_bytes() {
    let temp = tempdir().unwrap();
    let create = write_script(temp.path(), "init.sql", "SELECT 1;");

    let artifact = stage_scripts(&create, None).unwrap();
    assert_eq!(artifact.read(CREATE_SCRIPT_KEY).unwrap(), b"SELECT 1;");

    let err = artifact.read(DELETE_SCRIPT_KEY).unwrap_err();
    assert!(matches!(err, StageError::ReadStaged { .. }));
  }

  #[tokio::test]
  async fn spawned_staging_joins_with_artifact() {
    let temp = tempdir().unwrap();
    let create = write_script(temp.path(), "init.sql", "SELECT 1;");
    let delete = write_script(temp.path(), "teardown.sql", "SELECT 2;");

    let config = SeederConfig {
      network: NetworkRef {
        id: "vpc-1".to_string(),
        private_subnet_ids: vec!["subnet-a".to_string()],
      },
      database: DatabaseRef {
        id: "db-1".to_string(),
        endpoint_address: "db-1.example.internal".to_string(),
        secret: Some(SecretRef {
          id: "secret-1".to_string(),
        }),
      },
      port: 1433,
      create_script: create,
      delete_script: Some(delete),
      memory_mb: None,
      executor_artifact: None,
      executor_handler: None,
      ignore_sql_errors: false,
    };

    let task = spawn_staging(&config);
    let artifact = join_staging(task).await.unwrap();
    assert_eq!(artifact.keys().len(), 2);
  }

  #[tokio::test]
  async fn spawned_staging_surfaces_copy_failure() {
    let temp = tempdir().unwrap();
    let config = SeederConfig {
      network: NetworkRef {
        id: "vpc-1".to_string(),
        private_subnet_ids: vec!["subnet-a".to_string()],
      },
      database: DatabaseRef {
        id: "db-1".to_string(),
        endpoint_address: "db-1.example.internal".to_string(),
        secret: Some(SecretRef {
          id: "secret-1".to_string(),
        }),
      },
      port: 1433,
      create_script: temp.path().join("missing.sql"),
      delete_script: None,
      memory_mb: None,
      executor_artifact: None,
      executor_handler: None,
      ignore_sql_errors: false,
    };

    let task = spawn_staging(&config);
    let err = join_staging(task).await.unwrap_err();
    assert!(matches!(err, StageError::CopyScript { .. }));
  }

  #[tokio::test]
  async fn aborted_staging_reports_cancellation() {
    let temp = tempdir().unwrap();
    let create = write_script(temp.path(), "init.sql", "SELECT 1;");

    // A plain spawn (not spawn_blocking) can be aborted before it runs
    let task: StagingTask = tokio::task::spawn(async move {
      tokio::time::sleep(std::time::Duration::from_secs(60)).await;
      stage_scripts(&create, None)
    });
    task.abort();

    let err = join_staging(task).await.unwrap_err();
    assert!(matches!(err, StageError::TaskCancelled));
  }
}
