//! Implementation of the `dbseed synth` command.
//!
//! Declares every seeder in a stack file and emits the synthesized manifest:
//! resources, dependency edges, and the manifest hash. Staging tasks are
//! joined so script problems surface here rather than at deploy time.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use dbseed_lib::graph::StackManifest;
use dbseed_lib::resource::LogicalId;
use dbseed_lib::seeder::{Stack, declare};
use dbseed_lib::stage::join_staging;
use dbseed_lib::util::hash::{ContentHash, Hashable};

use crate::output::{self, OutputFormat, print_json, print_stat, print_success, truncate_hash};
use crate::stackfile::{self, StackFile};

struct Synthesis {
  manifest: StackManifest,
  order: Vec<LogicalId>,
  /// Staged-scripts fingerprint per upload resource.
  scripts: BTreeMap<LogicalId, ContentHash>,
}

/// Execute the synth command.
///
/// Declares the stack from the given file and prints a summary of what a
/// deploy would materialize:
/// - Declares each seeder (running its precondition checks)
/// - Joins the staging tasks and records the script fingerprints
/// - Computes the deploy order and the manifest hash
///
/// With `--out`, the manifest JSON is also written to disk.
pub fn cmd_synth(config: &Path, out: Option<&Path>, format: OutputFormat, verbose: bool) -> Result<()> {
  let stack_file = stackfile::load(config)?;

  let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
  let synthesis = rt.block_on(synthesize(&stack_file))?;

  let hash = synthesis
    .manifest
    .compute_hash()
    .context("failed to hash stack manifest")?;

  if let Some(out) = out {
    let json = serde_json::to_string_pretty(&synthesis.manifest).context("failed to serialize manifest")?;
    fs::write(out, json).with_context(|| format!("failed to write manifest: {}", out.display()))?;
  }

  if format.is_json() {
    let scripts: BTreeMap<String, String> = synthesis
      .scripts
      .iter()
      .map(|(id, fingerprint)| (id.to_string(), fingerprint.0.clone()))
      .collect();
    let summary = serde_json::json!({
      "manifest_hash": hash.0,
      "seeders": stack_file.seeder.keys().collect::<Vec<_>>(),
      "resources": synthesis.manifest.resources.len(),
      "edges": synthesis.manifest.edges.len(),
      "deploy_order": synthesis.order.iter().map(ToString::to_string).collect::<Vec<_>>(),
      "scripts": scripts,
    });
    return print_json(&summary);
  }

  print_success(&format!("Synthesized stack {}", truncate_hash(&hash.0)));
  print_stat("Seeders", &stack_file.seeder.len().to_string());
  print_stat("Resources", &synthesis.manifest.resources.len().to_string());
  print_stat("Edges", &synthesis.manifest.edges.len().to_string());
  for (id, fingerprint) in &synthesis.scripts {
    print_stat(&format!("Scripts {}", id), truncate_hash(&fingerprint.0));
  }
  if let Some(out) = out {
    print_stat("Manifest", &out.display().to_string());
  }

  if verbose {
    println!();
    println!("Deploy order:");
    for id in &synthesis.order {
      let kind = synthesis.manifest.resources.get(id).map(|def| def.kind()).unwrap_or("?");
      output::print_item(output::symbols::INFO, &format!("{} ({})", id, kind));
    }
  }

  Ok(())
}

async fn synthesize(stack_file: &StackFile) -> Result<Synthesis> {
  let mut stack = Stack::new();
  let mut uploads = Vec::new();

  for (name, config) in &stack_file.seeder {
    let handle = declare(&mut stack, name, config).with_context(|| format!("failed to declare seeder: {}", name))?;
    uploads.push(handle.upload);
  }

  let order = stack.graph().deploy_order().context("stack has no valid deploy order")?;

  let mut scripts = BTreeMap::new();
  for upload in uploads {
    if let Some(task) = stack.take_staging(&upload) {
      let artifact = join_staging(task)
        .await
        .with_context(|| format!("staging failed for {}", upload))?;
      scripts.insert(upload, artifact.content_hash().clone());
    }
  }

  Ok(Synthesis {
    manifest: stack.manifest(),
    order,
    scripts,
  })
}
