//! Structured deployment errors.
//!
//! Every fatal deploy path ends in a [`DeploymentError`]: a type tag, a
//! one-line summary, a diagnostic context map and numbered remediations.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    InvalidParameter,
    SshConnectionFailed,
    HaCoreNotRunning,
    UploadFailed,
    RemoteDeploymentFailed,
    UnexpectedError,
    /// Catch-all.
    DeploymentError,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::InvalidParameter => "INVALID_PARAMETER",
            ErrorType::SshConnectionFailed => "SSH_CONNECTION_FAILED",
            ErrorType::HaCoreNotRunning => "HA_CORE_NOT_RUNNING",
            ErrorType::UploadFailed => "UPLOAD_FAILED",
            ErrorType::RemoteDeploymentFailed => "REMOTE_DEPLOYMENT_FAILED",
            ErrorType::UnexpectedError => "UNEXPECTED_ERROR",
            ErrorType::DeploymentError => "DEPLOYMENT_ERROR",
        }
    }

    /// Remediations shown when the caller supplies none.
    pub fn default_troubleshooting(self) -> Vec<String> {
        let steps: &[&str] = match self {
            ErrorType::InvalidParameter => &[
                "Check the --ha-host, --ha-port and --ha-user flags",
                "Check the HA_HOST, HA_PORT and HA_USER environment variables",
            ],
            ErrorType::SshConnectionFailed => &[
                "Try connecting manually: ssh -p <port> <user>@<host>",
                "Make sure the SSH add-on is installed and running on Home Assistant",
                "Check that your SSH key is authorized on the host",
                "Verify the host name resolves and the port is reachable",
            ],
            ErrorType::HaCoreNotRunning => &[
                "Start Home Assistant Core: ha core start",
                "Inspect core logs: ha core logs",
                "Check supervisor health: ha supervisor info",
            ],
            ErrorType::UploadFailed => &[
                "Check free disk space on the host: df -h",
                "Verify SSH key authentication works for scp",
                "Make sure /root is writable on the host",
            ],
            ErrorType::RemoteDeploymentFailed => &[
                "Inspect add-on logs: ha addons logs <addon id>",
                "Reload the add-on store: ha addons reload",
                "Re-run the deployment once the cause is fixed",
            ],
            ErrorType::UnexpectedError => &[
                "Re-run with RUST_LOG=talos=debug for more detail",
                "Report the issue with the output above",
            ],
            ErrorType::DeploymentError => &[
                "Review the context above",
                "Re-run with RUST_LOG=talos=debug for more detail",
            ],
        };
        steps.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentError {
    pub error_type: ErrorType,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub troubleshooting_steps: Vec<String>,
    pub timestamp: DateTime<Local>,
}

impl DeploymentError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            context: BTreeMap::new(),
            troubleshooting_steps: error_type.default_troubleshooting(),
            timestamp: Local::now(),
        }
    }

    pub fn invalid_parameter(parameter: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorType::InvalidParameter, message).with_context("parameter", parameter)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

const RULE: &str = "============================================================";

impl fmt::Display for DeploymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "DEPLOYMENT FAILED: {}", self.error_type)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "{}", self.message)?;
        writeln!(f, "Time: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"))?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (key, value) in &self.context {
                if value.contains('\n') {
                    writeln!(f, "  {key}:")?;
                    for line in value.lines() {
                        writeln!(f, "    {line}")?;
                    }
                } else {
                    writeln!(f, "  {key}: {value}")?;
                }
            }
        }

        if !self.troubleshooting_steps.is_empty() {
            writeln!(f)?;
            writeln!(f, "Troubleshooting:")?;
            for (i, step) in self.troubleshooting_steps.iter().enumerate() {
                writeln!(f, "  {}. {step}", i + 1)?;
            }
        }
        write!(f, "{RULE}")
    }
}

impl std::error::Error for DeploymentError {}
