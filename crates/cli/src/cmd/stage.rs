//! Implementation of the `dbseed stage` command.
//!
//! Runs the script stager for every seeder and reports the content
//! fingerprint each upload would ship. With `--keep`, the staged layout is
//! copied into a directory for inspection instead of being discarded.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use dbseed_lib::stage::stage_scripts;

use crate::output::{self, print_info, print_stat, print_success, truncate_hash};
use crate::stackfile;

/// Execute the stage command.
///
/// For each seeder the stager copies the scripts into a scratch directory
/// under their fixed object keys and fingerprints the result, exactly as a
/// deploy would. The scratch directory is discarded afterwards unless
/// `--keep` names a directory to copy the layout into.
pub fn cmd_stage(config: &Path, keep: Option<&Path>) -> Result<()> {
  let stack_file = stackfile::load(config)?;

  if stack_file.seeder.is_empty() {
    print_info("Stack file declares no seeders.");
    return Ok(());
  }

  for (name, seeder) in &stack_file.seeder {
    seeder
      .validate()
      .with_context(|| format!("seeder {} failed validation", name))?;

    let artifact = stage_scripts(&seeder.create_script, seeder.delete_script.as_deref())
      .with_context(|| format!("staging failed for seeder: {}", name))?;

    print_success(&format!("{}: staged {}", name, truncate_hash(&artifact.content_hash().0)));

    match keep {
      Some(keep) => {
        let dest = keep.join(name);
        fs::create_dir_all(&dest).with_context(|| format!("failed to create {}", dest.display()))?;
        for key in artifact.keys() {
          let body = artifact
            .read(key)
            .with_context(|| format!("failed to read staged {}", key))?;
          let target = dest.join(key);
          fs::write(&target, body).with_context(|| format!("failed to write {}", target.display()))?;
          output::print_item(output::symbols::ARROW, &target.display().to_string());
        }
      }
      None => {
        for key in artifact.keys() {
          output::print_item(output::symbols::INFO, key);
        }
      }
    }
  }

  if let Some(keep) = keep {
    println!();
    print_stat("Kept under", &keep.display().to_string());
  }

  Ok(())
}
