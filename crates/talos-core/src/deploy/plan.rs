//! Dry-run deployment plan.

use std::fmt;
use std::path::PathBuf;

use super::DeployTarget;
use super::script::ScriptParams;

#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub key: String,
    pub slug: String,
    pub version: String,
    pub target: DeployTarget,
    pub tarball: PathBuf,
    pub remote_tarball: String,
    pub steps: Vec<String>,
}

impl DeployPlan {
    pub fn new(key: &str, version: &str, target: &DeployTarget, tarball: PathBuf, params: &ScriptParams) -> Self {
        let id = params.addon_id();
        let remote_tarball = params.remote_tarball();
        let file_name = format!("{}.tar.gz", params.slug);

        let steps = vec![
            format!("Build artifact {}", tarball.display()),
            format!("Upload {file_name} to {remote_tarball}"),
            format!("Stop {id} if it is running"),
            format!("Replace /addons/{} with the uploaded artifact", params.slug),
            "Reload the add-on store (ha addons reload)".to_string(),
            format!("Rebuild {id}, falling back to install when rebuild fails or it is not installed"),
            "Apply add-on options when SUPERVISOR_TOKEN is available".to_string(),
            format!("Start {id} and verify its state is \"started\""),
        ];

        Self {
            key: key.to_string(),
            slug: params.slug.clone(),
            version: version.to_string(),
            target: target.clone(),
            tarball,
            remote_tarball,
            steps,
        }
    }
}

impl fmt::Display for DeployPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deployment plan (dry run)")?;
        writeln!(f, "Add-on: {}", self.key)?;
        writeln!(f, "Slug: {}", self.slug)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Target: {}", self.target)?;
        writeln!(f)?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "  {}. {step}", i + 1)?;
        }
        write!(f, "\nNo changes were made.")
    }
}
