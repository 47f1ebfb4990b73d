//! Stack file loading.
//!
//! A stack file is a TOML document declaring one or more seeders by name:
//!
//! ```toml
//! [seeder.app]
//! port = 1433
//! create_script = "scripts/create.sql"
//!
//! [seeder.app.network]
//! id = "vpc-1"
//! private_subnet_ids = ["subnet-a", "subnet-b"]
//!
//! [seeder.app.database]
//! id = "app-db"
//! endpoint_address = "app-db.example.internal"
//! secret = { id = "app-db-credentials" }
//! ```
//!
//! Script paths are resolved relative to the stack file, so a stack checkout
//! works from any working directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use dbseed_lib::config::SeederConfig;

/// Parsed stack file.
#[derive(Debug, Deserialize)]
pub struct StackFile {
  /// Seeders keyed by name. Iteration order is lexical, so declaration is
  /// deterministic regardless of file order.
  #[serde(default)]
  pub seeder: BTreeMap<String, SeederConfig>,
}

/// Load a stack file and resolve relative script paths against its directory.
pub fn load(path: &Path) -> Result<StackFile> {
  let raw = fs::read_to_string(path).with_context(|| format!("failed to read stack file: {}", path.display()))?;
  let mut file: StackFile =
    toml::from_str(&raw).with_context(|| format!("failed to parse stack file: {}", path.display()))?;

  let base = path.parent().unwrap_or(Path::new("."));
  for config in file.seeder.values_mut() {
    config.create_script = resolve(base, &config.create_script);
    config.delete_script = config.delete_script.take().map(|script| resolve(base, &script));
  }

  Ok(file)
}

fn resolve(base: &Path, script: &Path) -> PathBuf {
  if script.is_absolute() {
    script.to_path_buf()
  } else {
    base.join(script)
  }
}
