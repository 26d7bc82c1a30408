//! Sequential multi-add-on deploys.

use tracing::{error, info};

use super::{DeployOutcome, Deployer, RemoteShell};
use crate::error::DeploymentError;
use crate::manifest::AddonTable;

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, DeploymentError)>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deploy `keys` (every discovered add-on when empty) one at a time in
/// discovery order. A failure is recorded and the batch moves on.
pub fn deploy_batch<S: RemoteShell>(
    deployer: &Deployer<S>,
    addons: &AddonTable,
    keys: &[String],
) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for key in keys.iter().filter(|k| !addons.contains_key(k.as_str())) {
        summary.failed.push((
            key.clone(),
            DeploymentError::invalid_parameter("addon", format!("Add-on '{key}' not found")),
        ));
    }

    let selected = addons
        .keys()
        .filter(|k| keys.is_empty() || keys.iter().any(|want| want == *k));

    for key in selected {
        info!(addon = %key, "Deploying");
        match deployer.deploy(addons, key, false) {
            Ok(DeployOutcome::Deployed(_)) | Ok(DeployOutcome::DryRun(_)) => {
                summary.succeeded.push(key.clone());
            }
            Err(e) => {
                error!(addon = %key, error_type = %e.error_type, "Deployment failed");
                summary.failed.push((key.clone(), e));
            }
        }
    }
    summary
}
