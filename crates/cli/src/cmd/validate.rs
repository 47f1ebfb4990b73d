//! Implementation of the `dbseed validate` command.
//!
//! Runs the precondition checks for every seeder in a stack file without
//! declaring any resources.

use std::path::Path;

use anyhow::{Result, bail};

use crate::output::{print_error, print_info, print_success, print_warning};
use crate::stackfile;

/// Execute the validate command.
///
/// Loads the stack file, resolves script paths, and validates each seeder.
/// Every seeder is checked even after one fails, so a single run reports all
/// problems at once.
pub fn cmd_validate(config: &Path) -> Result<()> {
  let stack_file = stackfile::load(config)?;

  if stack_file.seeder.is_empty() {
    print_info("Stack file declares no seeders.");
    return Ok(());
  }

  let mut failures = 0;
  for (name, seeder) in &stack_file.seeder {
    match seeder.validate() {
      Ok(()) => {
        print_success(&format!("{}: preconditions hold", name));
        if !seeder.run_on_delete() {
          print_warning(&format!("{}: no delete script declared, teardown will run no SQL", name));
        }
      }
      Err(e) => {
        print_error(&format!("{}: {}", name, e));
        failures += 1;
      }
    }
  }

  if failures > 0 {
    bail!("{} of {} seeder(s) failed validation", failures, stack_file.seeder.len());
  }

  Ok(())
}
