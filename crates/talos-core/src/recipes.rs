//! `just` recipes across add-ons, and per-add-on test commands.

use std::path::Path;
use std::process::Command;

use anyhow::Context;
use tracing::{info, warn};

use crate::manifest::{Addon, AddonTable};

const JUSTFILE_NAMES: [&str; 2] = ["Justfile", "justfile"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeStatus {
    Succeeded,
    /// No Justfile in the add-on directory.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeResult {
    pub key: String,
    pub status: RecipeStatus,
}

#[derive(Debug, Default)]
pub struct RecipeSummary {
    pub results: Vec<RecipeResult>,
}

impl RecipeSummary {
    pub fn keys_with(&self, pred: impl Fn(&RecipeStatus) -> bool) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| pred(&r.status))
            .map(|r| r.key.as_str())
            .collect()
    }

    pub fn any_failed(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.status, RecipeStatus::Failed(_)))
    }
}

pub fn has_justfile(dir: &Path) -> bool {
    JUSTFILE_NAMES.iter().any(|name| dir.join(name).is_file())
}

/// Run `just <recipe>` in each selected add-on (all when `keys` is empty),
/// in discovery order. Unknown keys are reported as failures.
pub fn run_recipe(addons: &AddonTable, recipe: &str, keys: &[String]) -> RecipeSummary {
    let mut summary = RecipeSummary::default();

    for key in keys.iter().filter(|k| !addons.contains_key(k.as_str())) {
        summary.results.push(RecipeResult {
            key: key.clone(),
            status: RecipeStatus::Failed(format!("Add-on '{key}' not found")),
        });
    }

    let selected = addons
        .values()
        .filter(|a| keys.is_empty() || keys.iter().any(|k| *k == a.key));
    for addon in selected {
        let status = run_one_recipe(addon, recipe);
        summary.results.push(RecipeResult {
            key: addon.key.clone(),
            status,
        });
    }
    summary
}

fn run_one_recipe(addon: &Addon, recipe: &str) -> RecipeStatus {
    if !has_justfile(&addon.dir) {
        info!(addon = %addon.key, "No Justfile, skipping");
        return RecipeStatus::Skipped;
    }
    if which::which("just").is_err() {
        return RecipeStatus::Failed("`just` is not installed".to_string());
    }

    info!(addon = %addon.key, recipe, "Running recipe");
    match Command::new("just").arg(recipe).current_dir(&addon.dir).status() {
        Ok(status) if status.success() => RecipeStatus::Succeeded,
        Ok(status) => RecipeStatus::Failed(match status.code() {
            Some(code) => format!("just {recipe} exited with code {code}"),
            None => format!("just {recipe} was terminated by a signal"),
        }),
        Err(e) => RecipeStatus::Failed(format!("Failed to run just: {e}")),
    }
}

/// Run each `tests` entry through `sh -c` in the add-on's source
/// directory, stopping at the first failure. Returns how many ran.
pub fn run_addon_tests(addon: &Addon) -> anyhow::Result<usize> {
    let tests = &addon.manifest.tests;
    if tests.is_empty() {
        warn!(addon = %addon.key, "No tests declared");
        return Ok(0);
    }

    for (i, test) in tests.iter().enumerate() {
        info!(addon = %addon.key, test = %test, "Running test {}/{}", i + 1, tests.len());
        let status = Command::new("sh")
            .arg("-c")
            .arg(test)
            .current_dir(&addon.source_dir)
            .status()
            .with_context(|| format!("Failed to run test: {test}"))?;
        if !status.success() {
            anyhow::bail!(
                "Test failed for {}: {test} (exit code {})",
                addon.key,
                status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string())
            );
        }
    }
    Ok(tests.len())
}
