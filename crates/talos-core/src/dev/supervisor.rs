//! Child process supervision for the dev orchestrator.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::logs::{LogPrefix, LogSink, spawn_reader};
use super::service::RunnerSpec;

const LOG_DRAIN: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub struct RunningService {
    pub key: String,
    pub pid: Option<u32>,
    child: Child,
    log_tasks: Vec<JoinHandle<()>>,
}

/// Owns every spawned service process, in start order.
#[derive(Debug)]
pub struct Supervisor {
    sink: LogSink,
    running: Vec<RunningService>,
}

impl Supervisor {
    pub fn new(sink: LogSink) -> Self {
        Self {
            sink,
            running: Vec::new(),
        }
    }

    /// Spawn a service in its own process group with stdout and stderr
    /// routed through the log sink.
    pub fn spawn(
        &mut self,
        key: &str,
        index: usize,
        runner: &RunnerSpec,
        working_dir: &Path,
        env: &BTreeMap<String, String>,
    ) -> std::io::Result<Option<u32>> {
        let mut cmd = Command::new(&runner.command);
        cmd.args(&runner.args)
            .current_dir(working_dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        info!(service = key, pid, command = %runner, "Started service");

        let prefix = LogPrefix::new(key, index);
        let mut log_tasks = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            log_tasks.push(spawn_reader(stdout, "stdout", prefix.clone(), self.sink.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            log_tasks.push(spawn_reader(stderr, "stderr", prefix, self.sink.clone()));
        }

        self.running.push(RunningService {
            key: key.to_string(),
            pid,
            child,
            log_tasks,
        });
        Ok(pid)
    }

    pub fn running(&self) -> &[RunningService] {
        &self.running
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// True when every spawned process has exited.
    pub fn all_exited(&mut self) -> bool {
        self.running
            .iter_mut()
            .all(|svc| !matches!(svc.child.try_wait(), Ok(None)))
    }

    /// Stop services in reverse start order: terminate, wait up to `grace`,
    /// then kill. Log readers are drained briefly and then cancelled.
    pub async fn shutdown(&mut self, grace: Duration) {
        while let Some(mut svc) = self.running.pop() {
            stop_one(&mut svc, grace).await;
            for mut task in svc.log_tasks.drain(..) {
                if timeout(LOG_DRAIN, &mut task).await.is_err() {
                    task.abort();
                }
            }
        }
    }
}

async fn stop_one(svc: &mut RunningService, grace: Duration) {
    if let Ok(Some(status)) = svc.child.try_wait() {
        debug!(service = %svc.key, %status, "Already exited");
        return;
    }

    if let Some(pid) = svc.pid {
        signal_group(pid, libc::SIGTERM);
    }
    match timeout(grace, svc.child.wait()).await {
        Ok(Ok(status)) => info!(service = %svc.key, %status, "Stopped service"),
        Ok(Err(e)) => warn!(service = %svc.key, error = %e, "Failed to wait for service"),
        Err(_) => {
            warn!(service = %svc.key, grace_secs = grace.as_secs_f32(), "Service ignored SIGTERM, killing");
            if let Some(pid) = svc.pid {
                signal_group(pid, libc::SIGKILL);
            }
            if let Err(e) = svc.child.kill().await {
                warn!(service = %svc.key, error = %e, "Failed to kill service");
            }
        }
    }
}

/// Signal the process group led by `pid`.
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pid_t) = libc::pid_t::try_from(pid) else {
        return;
    };
    if pid_t <= 0 {
        return;
    }
    // SAFETY: a negative pid targets only the group this supervisor created.
    let rc = unsafe { libc::kill(-pid_t, signal) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            debug!(pid, signal, error = %err, "Failed to signal process group");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::process::is_alive;

    fn sink() -> LogSink {
        LogSink::new(std::io::sink())
    }

    #[tokio::test]
    async fn shutdown_stops_every_child() {
        let mut sup = Supervisor::new(sink());
        let env = BTreeMap::new();
        let sleep = RunnerSpec::new("sleep", &["30"]);
        let a = sup.spawn("a", 0, &sleep, Path::new("."), &env).unwrap().unwrap();
        let b = sup.spawn("b", 1, &sleep, Path::new("."), &env).unwrap().unwrap();
        assert!(!sup.all_exited());

        sup.shutdown(Duration::from_secs(5)).await;
        assert!(sup.is_empty());
        assert!(!is_alive(a));
        assert!(!is_alive(b));
    }

    #[tokio::test]
    async fn stubborn_child_is_killed_after_grace() {
        let mut sup = Supervisor::new(sink());
        let stubborn = RunnerSpec::new("sh", &["-c", "trap '' TERM; while true; do sleep 1; done"]);
        let pid = sup
            .spawn("stubborn", 0, &stubborn, Path::new("."), &BTreeMap::new())
            .unwrap()
            .unwrap();
        // let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        sup.shutdown(Duration::from_millis(300)).await;
        assert!(!is_alive(pid));
    }

    #[tokio::test]
    async fn exited_children_are_detected() {
        let mut sup = Supervisor::new(sink());
        sup.spawn("quick", 0, &RunnerSpec::new("true", &[]), Path::new("."), &BTreeMap::new())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(sup.all_exited());
        sup.shutdown(Duration::from_secs(1)).await;
    }
}
