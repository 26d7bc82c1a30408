//! Remote deployment to a Home Assistant supervisor.
//!
//! A deploy validates the target, builds the artifact, uploads it and runs
//! one install script over a single SSH session. Every failure is returned
//! as a [`DeploymentError`].

pub mod batch;
pub mod plan;
pub mod prereq;
pub mod script;
pub mod transport;

use std::fmt;

use tracing::{info, warn};

use crate::build::{ArtifactBuilder, BuildReport};
use crate::context::build_context;
use crate::error::{DeploymentError, ErrorType};
use crate::manifest::{AddonTable, ManifestError};
use crate::paths::RepoPaths;

pub use batch::{BatchSummary, deploy_batch};
pub use plan::DeployPlan;
pub use prereq::RemoteFacts;
pub use script::{ScriptParams, remote_script};
pub use transport::{CommandOutput, RemoteShell, SshTransport};

pub const DEFAULT_HA_HOST: &str = "homeassistant.local";
pub const DEFAULT_HA_PORT: u32 = 22;
pub const DEFAULT_HA_USER: &str = "root";
const LOG_TAIL_LINES: usize = 20;

/// SSH coordinates of the supervisor host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub host: String,
    pub port: u32,
    pub user: String,
}

impl DeployTarget {
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl Default for DeployTarget {
    fn default() -> Self {
        Self {
            host: DEFAULT_HA_HOST.to_string(),
            port: DEFAULT_HA_PORT,
            user: DEFAULT_HA_USER.to_string(),
        }
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub key: String,
    pub slug: String,
    pub target: DeployTarget,
    pub build: BuildReport,
    pub remote: RemoteFacts,
    /// Version the supervisor reports for the installed add-on.
    pub installed_version: Option<String>,
    pub script_output: String,
}

#[derive(Debug, Clone)]
pub enum DeployOutcome {
    DryRun(DeployPlan),
    Deployed(DeployReport),
}

/// Drives one add-on deployment through a [`RemoteShell`].
pub struct Deployer<S: RemoteShell> {
    builder: ArtifactBuilder,
    target: DeployTarget,
    shell: S,
}

impl Deployer<SshTransport> {
    pub fn over_ssh(paths: RepoPaths, target: DeployTarget) -> Self {
        let shell = SshTransport::new(target.clone());
        Self::new(paths, target, shell)
    }
}

impl<S: RemoteShell> Deployer<S> {
    pub fn new(paths: RepoPaths, target: DeployTarget, shell: S) -> Self {
        Self {
            builder: ArtifactBuilder::new(paths),
            target,
            shell,
        }
    }

    pub fn target(&self) -> &DeployTarget {
        &self.target
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    /// Deploy `key`, or only describe the deployment when `dry_run` is set.
    ///
    /// Dry runs perform no validation, build or network I/O.
    pub fn deploy(
        &self,
        addons: &AddonTable,
        key: &str,
        dry_run: bool,
    ) -> Result<DeployOutcome, DeploymentError> {
        let ctx = build_context(self.builder.paths(), addons, key)
            .map_err(|e| self.manifest_error(key, e))?;
        let params = ScriptParams::from_context(&ctx);

        if dry_run {
            let tarball = self.builder.paths().tarball_path(&ctx.slug);
            return Ok(DeployOutcome::DryRun(DeployPlan::new(
                key,
                &ctx.version,
                &self.target,
                tarball,
                &params,
            )));
        }

        prereq::validate_target(&self.target)
            .map_err(|e| e.with_context("addon", key))?;
        let remote = prereq::check_remote(&self.shell, &self.target)
            .map_err(|e| e.with_context("addon", key))?;

        let build = self.builder.build(&ctx).map_err(|e| {
            self.error(ErrorType::DeploymentError, key, format!("Build failed: {e:#}"))
        })?;

        let remote_tarball = params.remote_tarball();
        info!(addon = %key, host = %self.target.host, remote = %remote_tarball, "Uploading artifact");
        let upload = self
            .shell
            .upload(&build.tarball, &remote_tarball)
            .map_err(|e| self.error(ErrorType::UploadFailed, key, format!("Could not run scp: {e:#}")))?;
        if !upload.success() {
            return Err(self
                .error(
                    ErrorType::UploadFailed,
                    key,
                    format!("Upload of {} failed", build.tarball.display()),
                )
                .with_context("exit_code", upload.exit_code())
                .with_context("stderr", upload.stderr.trim()));
        }

        info!(addon = %key, host = %self.target.host, "Running remote install script");
        let script = remote_script(&params);
        let run = self.shell.run_script(&script).map_err(|e| {
            self.error(ErrorType::UnexpectedError, key, format!("Could not run ssh: {e:#}"))
        })?;
        if !run.success() {
            return Err(self
                .error(
                    ErrorType::RemoteDeploymentFailed,
                    key,
                    format!("Remote deployment of {} failed", params.addon_id()),
                )
                .with_context("exit_code", run.exit_code())
                .with_context("script_output", run.tail(LOG_TAIL_LINES))
                .with_context("addon_logs", self.collect_logs(&params)));
        }

        let installed_version = self.verify_started(key, &params)?;
        info!(addon = %key, slug = %params.slug, "Deployment complete");

        Ok(DeployOutcome::Deployed(DeployReport {
            key: key.to_string(),
            slug: params.slug.clone(),
            target: self.target.clone(),
            build,
            remote,
            installed_version,
            script_output: run.stdout,
        }))
    }

    /// `ha addons info` must report the add-on as started.
    fn verify_started(&self, key: &str, params: &ScriptParams) -> Result<Option<String>, DeploymentError> {
        let info = self
            .shell
            .run(&format!("ha addons info {} --raw-json", params.addon_id()))
            .map_err(|e| self.error(ErrorType::UnexpectedError, key, format!("Could not run ssh: {e:#}")))?;
        let parsed: Option<serde_json::Value> = serde_json::from_str(info.stdout.trim()).ok();
        let field = |ptr: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.pointer(ptr))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let state = field("/data/state");
        if info.success() && state.as_deref() == Some("started") {
            return Ok(field("/data/version"));
        }
        Err(self
            .error(
                ErrorType::RemoteDeploymentFailed,
                key,
                format!("{} is not running after deployment", params.addon_id()),
            )
            .with_context("state", state.unwrap_or_else(|| "unknown".to_string()))
            .with_context("exit_code", info.exit_code())
            .with_context("addon_logs", self.collect_logs(params)))
    }

    fn collect_logs(&self, params: &ScriptParams) -> String {
        let command = format!(
            "ha addons logs {} 2>&1 | tail -n {LOG_TAIL_LINES}",
            params.addon_id()
        );
        match self.shell.run(&command) {
            Ok(out) if !out.stdout.trim().is_empty() => out.stdout.trim_end().to_string(),
            Ok(_) => "(no log output)".to_string(),
            Err(e) => {
                warn!(error = %e, "Failed to collect add-on logs");
                format!("(failed to collect logs: {e})")
            }
        }
    }

    fn error(&self, error_type: ErrorType, key: &str, message: String) -> DeploymentError {
        DeploymentError::new(error_type, message)
            .with_context("addon", key)
            .with_context("host", &self.target.host)
            .with_context("port", self.target.port)
    }

    fn manifest_error(&self, key: &str, err: ManifestError) -> DeploymentError {
        match err {
            ManifestError::NotFound(_) => {
                DeploymentError::invalid_parameter("addon", err.to_string()).with_context("addon", key)
            }
            other => self.error(ErrorType::DeploymentError, key, other.to_string()),
        }
    }
}
