//! Local development orchestrator.
//!
//! Runs every discovered add-on as a child process on the developer's host:
//!
//! 1. Build a [`Service`] per add-on and order them by inferred dependencies.
//! 2. Refuse to start anything while any declared primary port is taken.
//! 3. Start services one by one (prerequisites, `pre_start` hook, port
//!    re-check, environment, spawn) with a pause between starts.
//! 4. Multiplex their output until a shutdown is triggered, then stop them
//!    in reverse order.

pub mod env;
pub mod graph;
pub mod logs;
pub mod port_gate;
pub mod prereq;
pub mod service;
pub mod shutdown;
pub mod supervisor;

use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::hooks::{self, HookOutcome, PRE_START};
use crate::manifest::{AddonTable, ManifestError};
use crate::paths::RepoPaths;

pub use graph::topo_sort;
pub use logs::LogSink;
pub use port_gate::{PortConflict, find_conflicts, format_conflicts};
pub use service::{RunnerSpec, Service};
pub use shutdown::{Shutdown, ShutdownReason, listen_for_signals};
pub use supervisor::Supervisor;

const EXIT_POLL: Duration = Duration::from_millis(500);

/// Timings for the dev run.
#[derive(Debug, Clone)]
pub struct DevConfig {
    /// Pause between successive starts.
    pub startup_delay: Duration,
    /// How long a service gets to exit after SIGTERM.
    pub shutdown_grace: Duration,
    /// Connect timeout for each port probe.
    pub probe_timeout: Duration,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(250),
        }
    }
}

#[derive(Error, Debug)]
pub enum DevError {
    #[error("Dependency cycle detected at '{0}'")]
    DependencyCycle(String),
    #[error("{}", format_conflicts(.0))]
    PortConflicts(Vec<PortConflict>),
    #[error("No add-ons found under {}", .0.display())]
    NoServices(PathBuf),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Started { pid: Option<u32> },
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ServiceResult {
    pub key: String,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone)]
pub struct DevOutcome {
    /// Start order.
    pub services: Vec<ServiceResult>,
    pub reason: ShutdownReason,
}

impl DevOutcome {
    pub fn all_started(&self) -> bool {
        self.services
            .iter()
            .all(|s| matches!(s.status, ServiceStatus::Started { .. }))
    }

    /// 0 only when everything started and the run ended on a signal.
    pub fn exit_code(&self) -> i32 {
        if self.all_started() && self.reason.is_signal() {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("Dev summary:\n");
        for s in &self.services {
            let _ = match &s.status {
                ServiceStatus::Started { pid: Some(pid) } => {
                    writeln!(out, "  started  {} (pid {pid})", s.key)
                }
                ServiceStatus::Started { pid: None } => writeln!(out, "  started  {}", s.key),
                ServiceStatus::Skipped(reason) => writeln!(out, "  skipped  {}: {reason}", s.key),
                ServiceStatus::Failed(reason) => writeln!(out, "  failed   {}: {reason}", s.key),
            };
        }
        let _ = write!(out, "Stopped: {}", self.reason);
        out
    }
}

pub struct DevOrchestrator {
    paths: RepoPaths,
    config: DevConfig,
    shutdown: Shutdown,
    sink: LogSink,
}

impl DevOrchestrator {
    pub fn new(paths: RepoPaths, config: DevConfig) -> Self {
        Self {
            paths,
            config,
            shutdown: Shutdown::new(),
            sink: LogSink::stdout(),
        }
    }

    /// Route service output somewhere other than stdout.
    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    /// Handle for triggering shutdown from outside (signals, tests).
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Services for `addons` in start order.
    pub fn plan(&self, addons: &AddonTable) -> Result<Vec<Service>, DevError> {
        let services: Vec<Service> = addons
            .values()
            .map(|a| Service::from_addon(a, addons, &self.paths))
            .collect();
        let order = topo_sort(&services)?;
        Ok(order.into_iter().cloned().collect())
    }

    /// Run until shutdown. Port conflicts and cycles abort before any spawn.
    pub async fn run(&self, addons: &AddonTable) -> Result<DevOutcome, DevError> {
        if addons.is_empty() {
            return Err(DevError::NoServices(self.paths.repo_root().to_path_buf()));
        }
        let services = self.plan(addons)?;
        info!(
            order = %services.iter().map(|s| s.key.as_str()).collect::<Vec<_>>().join(" → "),
            "Start order"
        );

        let conflicts = find_conflicts(&services, self.config.probe_timeout).await;
        if !conflicts.is_empty() {
            return Err(DevError::PortConflicts(conflicts));
        }

        let mut supervisor = Supervisor::new(self.sink.clone());
        let mut results = Vec::with_capacity(services.len());

        for (index, service) in services.iter().enumerate() {
            if self.shutdown.is_triggered() {
                break;
            }
            let status = self.start_service(&mut supervisor, index, service).await;
            match &status {
                ServiceStatus::Started { .. } => {}
                ServiceStatus::Skipped(reason) => warn!(service = %service.key, %reason, "Skipped"),
                ServiceStatus::Failed(reason) => warn!(service = %service.key, %reason, "Failed to start"),
            }
            let started = matches!(status, ServiceStatus::Started { .. });
            results.push(ServiceResult {
                key: service.key.clone(),
                status,
            });

            if started && index + 1 < services.len() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.startup_delay) => {}
                    _ = self.shutdown.wait() => break,
                }
            }
        }
        for service in services.iter().skip(results.len()) {
            results.push(ServiceResult {
                key: service.key.clone(),
                status: ServiceStatus::Skipped("shutdown before start".to_string()),
            });
        }

        if supervisor.is_empty() {
            self.shutdown
                .trigger(ShutdownReason::StartupFailure("no service could be started".to_string()));
        }

        let reason = loop {
            tokio::select! {
                reason = self.shutdown.wait() => break reason,
                _ = tokio::time::sleep(EXIT_POLL) => {
                    if supervisor.all_exited() {
                        self.shutdown.trigger(ShutdownReason::ServicesExited);
                    }
                }
            }
        };

        info!(%reason, "Stopping services");
        supervisor.shutdown(self.config.shutdown_grace).await;

        Ok(DevOutcome {
            services: results,
            reason,
        })
    }

    async fn start_service(&self, supervisor: &mut Supervisor, index: usize, service: &Service) -> ServiceStatus {
        if let Err(reason) = prereq::check(service) {
            return ServiceStatus::Skipped(reason);
        }

        let repo_root = self.paths.repo_root().to_path_buf();
        let addon_dir = service.addon_dir.clone();
        let hook = tokio::task::spawn_blocking(move || {
            hooks::run_hook(&repo_root, &addon_dir, PRE_START, true)
        })
        .await;
        match hook {
            Ok(Ok(HookOutcome::Ran(path))) => info!(service = %service.key, hook = %path.display(), "pre_start done"),
            Ok(Ok(HookOutcome::Missing)) => {}
            Ok(Err(e)) => return ServiceStatus::Failed(e.to_string()),
            Err(e) => return ServiceStatus::Failed(format!("pre_start hook task failed: {e}")),
        }

        if let Some(port) = service.primary_port
            && port_gate::is_port_in_use(port, self.config.probe_timeout).await
        {
            return ServiceStatus::Failed(format!("port {port} is already in use"));
        }

        let runner = match &service.start_cmd {
            Ok(runner) => runner,
            Err(reason) => return ServiceStatus::Failed(reason.clone()),
        };

        let parent_dyld = std::env::var("DYLD_LIBRARY_PATH").ok();
        let brew = env::homebrew_prefix();
        let vars = env::service_env(service, brew.as_deref(), parent_dyld.as_deref());

        match supervisor.spawn(&service.key, index, runner, &service.working_dir, &vars) {
            Ok(pid) => ServiceStatus::Started { pid },
            Err(e) => ServiceStatus::Failed(format!("Failed to run `{runner}`: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(statuses: Vec<ServiceStatus>, reason: ShutdownReason) -> DevOutcome {
        DevOutcome {
            services: statuses
                .into_iter()
                .enumerate()
                .map(|(i, status)| ServiceResult {
                    key: format!("s{i}"),
                    status,
                })
                .collect(),
            reason,
        }
    }

    #[test]
    fn exit_code_requires_all_started_and_a_signal() {
        let started = ServiceStatus::Started { pid: Some(1) };
        assert_eq!(
            outcome(vec![started.clone()], ShutdownReason::Signal("SIGINT")).exit_code(),
            0
        );
        assert_eq!(
            outcome(
                vec![started.clone(), ServiceStatus::Failed("x".into())],
                ShutdownReason::Signal("SIGINT")
            )
            .exit_code(),
            1
        );
        assert_eq!(
            outcome(vec![started], ShutdownReason::ServicesExited).exit_code(),
            1
        );
    }

    #[test]
    fn summary_lists_each_service() {
        let text = outcome(
            vec![
                ServiceStatus::Started { pid: Some(42) },
                ServiceStatus::Skipped("node_modules missing".into()),
            ],
            ShutdownReason::Signal("SIGTERM"),
        )
        .summary();
        assert!(text.contains("started  s0 (pid 42)"));
        assert!(text.contains("skipped  s1: node_modules missing"));
        assert!(text.contains("received SIGTERM"));
    }
}
