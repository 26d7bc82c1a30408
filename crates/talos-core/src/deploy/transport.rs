//! Remote command transport.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::Context;
use tracing::debug;

use super::DeployTarget;

pub const SSH_CONNECT_TIMEOUT_SECS: u32 = 10;

/// Captured result of one remote invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Exit code for reports; `-1` stands for "terminated by signal".
    pub fn exit_code(&self) -> i32 {
        self.status.unwrap_or(-1)
    }

    /// Last `n` non-empty lines of stdout followed by stderr.
    pub fn tail(&self, n: usize) -> String {
        let lines: Vec<&str> = self
            .stdout
            .lines()
            .chain(self.stderr.lines())
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// The narrow vocabulary the deployer needs from a remote host.
///
/// `Err` means the local side could not run the transport at all;
/// a remote failure is an `Ok` with a non-zero status.
pub trait RemoteShell {
    /// Run a single command line.
    fn run(&self, command: &str) -> anyhow::Result<CommandOutput>;

    /// Feed a whole script to `bash -s` in one session.
    fn run_script(&self, script: &str) -> anyhow::Result<CommandOutput>;

    /// Copy a local file to an absolute remote path.
    fn upload(&self, local: &Path, remote: &str) -> anyhow::Result<CommandOutput>;
}

/// `ssh`/`scp` subprocess transport.
#[derive(Debug, Clone)]
pub struct SshTransport {
    target: DeployTarget,
}

impl SshTransport {
    pub fn new(target: DeployTarget) -> Self {
        Self { target }
    }

    fn common_options() -> Vec<String> {
        [
            format!("ConnectTimeout={SSH_CONNECT_TIMEOUT_SECS}"),
            "BatchMode=yes".to_string(),
            "StrictHostKeyChecking=no".to_string(),
        ]
        .into_iter()
        .flat_map(|opt| ["-o".to_string(), opt])
        .collect()
    }

    fn ssh_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-p")
            .arg(self.target.port.to_string())
            .args(Self::common_options())
            .arg(self.target.destination());
        cmd
    }
}

impl RemoteShell for SshTransport {
    fn run(&self, command: &str) -> anyhow::Result<CommandOutput> {
        debug!(host = %self.target.host, command, "ssh");
        let output = self
            .ssh_command()
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .context("Failed to run ssh")?;
        Ok(output.into())
    }

    fn run_script(&self, script: &str) -> anyhow::Result<CommandOutput> {
        debug!(host = %self.target.host, bytes = script.len(), "ssh bash -s");
        let mut child = self
            .ssh_command()
            .args(["bash", "-s"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to run ssh")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .context("Failed to send script to ssh")?;
        }
        let output = child.wait_with_output().context("Failed to wait for ssh")?;
        Ok(output.into())
    }

    fn upload(&self, local: &Path, remote: &str) -> anyhow::Result<CommandOutput> {
        debug!(host = %self.target.host, local = %local.display(), remote, "scp");
        let output = Command::new("scp")
            .arg("-P")
            .arg(self.target.port.to_string())
            .args(Self::common_options())
            .arg(local)
            .arg(format!("{}:{remote}", self.target.destination()))
            .stdin(Stdio::null())
            .output()
            .context("Failed to run scp")?;
        Ok(output.into())
    }
}
