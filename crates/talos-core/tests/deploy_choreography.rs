//! Deployer choreography against a recording fake shell.

mod support;

use std::cell::RefCell;
use std::path::Path;

use talos_core::deploy::prereq::{CORE_INFO, DISK_PROBE, SSH_CANARY};
use talos_core::deploy::{
    CommandOutput, DeployOutcome, DeployTarget, Deployer, RemoteShell, deploy_batch,
};
use talos_core::error::ErrorType;
use talos_core::manifest::discover;

use support::foo_bar;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Run(String),
    Script(String),
    Upload(String),
}

/// Answers like a healthy supervisor unless told otherwise.
#[derive(Default)]
struct FakeShell {
    calls: RefCell<Vec<Call>>,
    canary_fails: bool,
    script_fails: bool,
    final_state: Option<&'static str>,
}

impl FakeShell {
    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl RemoteShell for FakeShell {
    fn run(&self, command: &str) -> anyhow::Result<CommandOutput> {
        self.calls.borrow_mut().push(Call::Run(command.to_string()));
        let out = match command {
            SSH_CANARY if self.canary_fails => CommandOutput::failed(255, "Connection refused"),
            SSH_CANARY => CommandOutput::ok("talos-ssh-ok\n"),
            CORE_INFO => CommandOutput::ok(r#"{"result":"ok","data":{"version":"2024.10.1"}}"#),
            DISK_PROBE => CommandOutput::ok("12G\n"),
            c if c.starts_with("ha addons info") => CommandOutput::ok(format!(
                r#"{{"result":"ok","data":{{"state":"{}","version":"0.0.0"}}}}"#,
                self.final_state.unwrap_or("started")
            )),
            c if c.starts_with("ha addons logs") => CommandOutput::ok("boom: missing module\n"),
            _ => CommandOutput::failed(127, "unexpected command"),
        };
        Ok(out)
    }

    fn run_script(&self, script: &str) -> anyhow::Result<CommandOutput> {
        self.calls.borrow_mut().push(Call::Script(script.to_string()));
        if self.script_fails {
            Ok(CommandOutput::failed(1, "install failed"))
        } else {
            Ok(CommandOutput::ok("State: started\n"))
        }
    }

    fn upload(&self, local: &Path, remote: &str) -> anyhow::Result<CommandOutput> {
        assert!(local.is_file(), "tarball must exist before upload");
        self.calls.borrow_mut().push(Call::Upload(remote.to_string()));
        Ok(CommandOutput::ok(""))
    }
}

fn target(host: &str) -> DeployTarget {
    DeployTarget {
        host: host.to_string(),
        port: 2222,
        user: "u".to_string(),
    }
}

#[test]
fn dry_run_prints_plan_without_remote_calls() {
    let fx = foo_bar();
    let addons = discover(fx.root()).unwrap();
    let deployer = Deployer::new(fx.paths(), target("h"), FakeShell::default());

    let outcome = deployer.deploy(&addons, "foo", true).unwrap();
    let DeployOutcome::DryRun(plan) = outcome else {
        panic!("expected a dry run");
    };
    let text = plan.to_string();
    assert!(text.contains("Add-on: foo"), "{text}");
    assert!(text.contains("Target: u@h:2222"), "{text}");
    assert!(text.contains("1. "), "{text}");
    assert!(deployer.shell().calls().is_empty());
    assert!(!fx.paths().tarball_path("foo").exists());
}

#[test]
fn empty_host_is_an_invalid_parameter() {
    let fx = foo_bar();
    let addons = discover(fx.root()).unwrap();
    let deployer = Deployer::new(fx.paths(), target(""), FakeShell::default());

    let err = deployer.deploy(&addons, "foo", false).unwrap_err();
    assert_eq!(err.error_type, ErrorType::InvalidParameter);
    assert_eq!(err.context_value("parameter"), Some("ha_host"));
    assert!(err.to_string().contains("INVALID_PARAMETER"));
    assert!(deployer.shell().calls().is_empty());
}

#[test]
fn unknown_addon_is_an_invalid_parameter() {
    let fx = foo_bar();
    let addons = discover(fx.root()).unwrap();
    let deployer = Deployer::new(fx.paths(), target("h"), FakeShell::default());

    let err = deployer.deploy(&addons, "nope", false).unwrap_err();
    assert_eq!(err.error_type, ErrorType::InvalidParameter);
    assert_eq!(err.context_value("parameter"), Some("addon"));
}

#[test]
fn successful_deploy_follows_the_choreography() {
    let fx = foo_bar();
    let addons = discover(fx.root()).unwrap();
    let deployer = Deployer::new(fx.paths(), target("h"), FakeShell::default());

    let outcome = deployer.deploy(&addons, "foo", false).unwrap();
    let DeployOutcome::Deployed(report) = outcome else {
        panic!("expected a deployment");
    };
    assert_eq!(report.slug, "foo");
    assert_eq!(report.installed_version.as_deref(), Some("0.0.0"));
    assert_eq!(report.remote.core_version.as_deref(), Some("2024.10.1"));
    assert_eq!(report.remote.free_space.as_deref(), Some("12G"));
    assert!(report.build.tarball.is_file());

    let calls = deployer.shell().calls();
    assert_eq!(calls[0], Call::Run(SSH_CANARY.to_string()));
    assert_eq!(calls[1], Call::Run(CORE_INFO.to_string()));
    assert_eq!(calls[2], Call::Run(DISK_PROBE.to_string()));
    assert_eq!(calls[3], Call::Upload("/root/foo.tar.gz".to_string()));
    let Call::Script(script) = &calls[4] else {
        panic!("expected the install script, got {:?}", calls[4]);
    };
    assert!(script.contains("tar -xzf"));
    assert!(script.contains("/root/foo.tar.gz"));
    assert!(script.contains("local_foo"));
    assert_eq!(
        calls[5],
        Call::Run("ha addons info local_foo --raw-json".to_string())
    );
    assert_eq!(calls.len(), 6);
}

#[test]
fn unreachable_host_stops_before_upload() {
    let fx = foo_bar();
    let addons = discover(fx.root()).unwrap();
    let shell = FakeShell {
        canary_fails: true,
        ..FakeShell::default()
    };
    let deployer = Deployer::new(fx.paths(), target("h"), shell);

    let err = deployer.deploy(&addons, "foo", false).unwrap_err();
    assert_eq!(err.error_type, ErrorType::SshConnectionFailed);
    assert_eq!(err.context_value("host"), Some("h"));
    assert_eq!(deployer.shell().calls().len(), 1);
}

#[test]
fn failed_script_reports_remote_logs() {
    let fx = foo_bar();
    let addons = discover(fx.root()).unwrap();
    let shell = FakeShell {
        script_fails: true,
        ..FakeShell::default()
    };
    let deployer = Deployer::new(fx.paths(), target("h"), shell);

    let err = deployer.deploy(&addons, "foo", false).unwrap_err();
    assert_eq!(err.error_type, ErrorType::RemoteDeploymentFailed);
    assert_eq!(err.context_value("addon"), Some("foo"));
    assert!(err.context_value("addon_logs").unwrap().contains("boom"));
    assert!(!err.troubleshooting_steps.is_empty());
}

#[test]
fn addon_not_started_after_script_is_an_error() {
    let fx = foo_bar();
    let addons = discover(fx.root()).unwrap();
    let shell = FakeShell {
        final_state: Some("error"),
        ..FakeShell::default()
    };
    let deployer = Deployer::new(fx.paths(), target("h"), shell);

    let err = deployer.deploy(&addons, "foo", false).unwrap_err();
    assert_eq!(err.error_type, ErrorType::RemoteDeploymentFailed);
    assert_eq!(err.context_value("state"), Some("error"));
}

#[test]
fn batch_continues_past_failures() {
    let fx = foo_bar();
    let addons = discover(fx.root()).unwrap();
    let deployer = Deployer::new(fx.paths(), target("h"), FakeShell::default());

    let keys = vec!["foo".to_string(), "missing".to_string()];
    let summary = deploy_batch(&deployer, &addons, &keys);
    assert_eq!(summary.succeeded, vec!["foo".to_string()]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "missing");
    assert!(!summary.is_success());
}
