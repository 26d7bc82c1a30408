//! Deployment prerequisite checks.

use tracing::{info, warn};

use super::DeployTarget;
use super::transport::RemoteShell;
use crate::error::{DeploymentError, ErrorType};

pub const SSH_CANARY: &str = "echo talos-ssh-ok";
pub const CORE_INFO: &str = "ha core info --raw-json";
pub const DISK_PROBE: &str = "df -h / | tail -1 | awk '{print $4}'";

/// What the checks learned about the remote host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFacts {
    pub core_version: Option<String>,
    /// Free space on `/` as reported by `df -h`.
    pub free_space: Option<String>,
}

/// Reject empty host or user and out-of-range ports.
pub fn validate_target(target: &DeployTarget) -> Result<(), DeploymentError> {
    let invalid = |parameter: &str, message: &str| {
        DeploymentError::invalid_parameter(parameter, message)
            .with_context("host", &target.host)
            .with_context("port", target.port)
    };
    if target.host.trim().is_empty() {
        return Err(invalid("ha_host", "Home Assistant host must not be empty"));
    }
    if target.user.trim().is_empty() {
        return Err(invalid("ha_user", "SSH user must not be empty"));
    }
    if !(1..=65535).contains(&target.port) {
        return Err(invalid("ha_port", "SSH port must be between 1 and 65535"));
    }
    Ok(())
}

/// SSH canary, supervisor health and a free-space probe.
pub fn check_remote<S: RemoteShell>(
    shell: &S,
    target: &DeployTarget,
) -> Result<RemoteFacts, DeploymentError> {
    let base = |error_type: ErrorType, message: String| {
        DeploymentError::new(error_type, message)
            .with_context("host", &target.host)
            .with_context("port", target.port)
            .with_context("user", &target.user)
    };

    let canary = shell.run(SSH_CANARY).map_err(|e| {
        base(ErrorType::SshConnectionFailed, format!("Could not run ssh: {e:#}"))
    })?;
    if !canary.success() {
        return Err(base(
            ErrorType::SshConnectionFailed,
            format!("Cannot connect to {target}"),
        )
        .with_context("exit_code", canary.exit_code())
        .with_context("stderr", canary.stderr.trim()));
    }
    info!(host = %target.host, "SSH connection ok");

    let core = shell
        .run(CORE_INFO)
        .map_err(|e| base(ErrorType::UnexpectedError, format!("Could not run ssh: {e:#}")))?;
    let parsed: Option<serde_json::Value> = serde_json::from_str(core.stdout.trim()).ok();
    let healthy = core.success()
        && parsed
            .as_ref()
            .and_then(|v| v.get("result"))
            .and_then(|r| r.as_str())
            == Some("ok");
    if !healthy {
        return Err(base(
            ErrorType::HaCoreNotRunning,
            "Home Assistant Core is not running or not healthy".to_string(),
        )
        .with_context("exit_code", core.exit_code())
        .with_context("output", core.tail(20)));
    }
    let core_version = parsed
        .as_ref()
        .and_then(|v| v.pointer("/data/version"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    info!(version = core_version.as_deref().unwrap_or("unknown"), "Home Assistant Core is running");

    let free_space = match shell.run(DISK_PROBE) {
        Ok(out) if out.success() && !out.stdout.trim().is_empty() => {
            let free = out.stdout.trim().to_string();
            info!(free = %free, "Free space on remote /");
            Some(free)
        }
        Ok(out) => {
            warn!(exit_code = out.exit_code(), "Could not determine free disk space");
            None
        }
        Err(e) => {
            warn!(error = %e, "Could not determine free disk space");
            None
        }
    };

    Ok(RemoteFacts {
        core_version,
        free_space,
    })
}
