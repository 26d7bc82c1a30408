//! Dev orchestrator planning and gating against fixture repositories.

mod support;

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use talos_core::dev::{
    DevConfig, DevError, DevOrchestrator, LogSink, ServiceStatus, ShutdownReason,
};
use talos_core::manifest::discover;
use talos_core::ports::process::is_alive;

use support::Fixture;

fn fast_config() -> DevConfig {
    DevConfig {
        startup_delay: Duration::from_millis(10),
        shutdown_grace: Duration::from_millis(500),
        probe_timeout: Duration::from_millis(100),
    }
}

fn orchestrator(fx: &Fixture) -> DevOrchestrator {
    DevOrchestrator::new(fx.paths(), fast_config()).with_sink(LogSink::new(std::io::sink()))
}

fn executable(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn peer_manifest(slug: &str, urls: &[&str]) -> String {
    let mut yaml = format!("slug: {slug}\nrun_env:\n");
    for (i, url) in urls.iter().enumerate() {
        yaml.push_str(&format!(
            "  - env: PEER_{i}\n    from_option: peer_{i}\n    default: \"{url}\"\n"
        ));
    }
    yaml
}

#[test]
fn dependencies_start_first() {
    let fx = Fixture::new();
    fx.addon("C", &peer_manifest("c", &["http://local-A:1", "http://local-B:2"]));
    fx.addon("A", "slug: a\n");
    fx.addon("B", "slug: b\n");
    let addons = discover(fx.root()).unwrap();

    let plan = orchestrator(&fx).plan(&addons).unwrap();
    let order: Vec<&str> = plan.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(order.len(), 3);
    assert_eq!(order[2], "C", "{order:?}");

    let c = &plan[2];
    assert!(c.dependencies.contains(&"A".to_string()));
    assert!(c.dependencies.contains(&"B".to_string()));
}

#[test]
fn mutual_references_are_a_cycle() {
    let fx = Fixture::new();
    fx.addon("A", &peer_manifest("a", &["http://local-B:2"]));
    fx.addon("B", &peer_manifest("b", &["http://local-A:1"]));
    let addons = discover(fx.root()).unwrap();

    match orchestrator(&fx).plan(&addons) {
        Err(DevError::DependencyCycle(node)) => assert!(node == "A" || node == "B", "{node}"),
        other => panic!("expected a cycle, got {:?}", other.map(|p| p.len())),
    }
}

#[tokio::test]
async fn cycle_aborts_run_before_spawning() {
    let fx = Fixture::new();
    fx.addon("A", &peer_manifest("a", &["http://local-B:2"]));
    fx.addon("B", &peer_manifest("b", &["http://local-A:1"]));
    let addons = discover(fx.root()).unwrap();

    let result = orchestrator(&fx).run(&addons).await;
    assert!(matches!(result, Err(DevError::DependencyCycle(_))));
}

#[tokio::test]
async fn occupied_port_vetoes_the_run() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let fx = Fixture::new();
    fx.addon("foo", &format!("slug: foo\nports:\n  {port}: {port}\n"));
    fx.addon("bar", "slug: bar\nports: {}\n");
    let addons = discover(fx.root()).unwrap();

    let err = orchestrator(&fx).run(&addons).await.unwrap_err();
    let DevError::PortConflicts(conflicts) = &err else {
        panic!("expected port conflicts, got {err}");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].key, "foo");
    assert_eq!(conflicts[0].port, port);

    let text = err.to_string();
    assert!(text.contains(&format!("foo → {port}")), "{text}");
    assert!(text.contains("ports kill"), "{text}");
}

#[tokio::test]
async fn nothing_startable_ends_with_startup_failure() {
    let fx = Fixture::new();
    fx.addon("web", "slug: web\n");
    fx.file("web/package.json", r#"{"scripts": {"dev": "node ."}}"#);
    let addons = discover(fx.root()).unwrap();

    let outcome = orchestrator(&fx).run(&addons).await.unwrap();
    assert_eq!(outcome.services.len(), 1);
    match &outcome.services[0].status {
        ServiceStatus::Skipped(reason) => assert!(reason.contains("node_modules"), "{reason}"),
        other => panic!("expected a skip, got {other:?}"),
    }
    assert!(matches!(outcome.reason, ShutdownReason::StartupFailure(_)));
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome.summary().contains("skipped  web"));
}

#[tokio::test]
async fn empty_repository_has_no_services() {
    let fx = Fixture::new();
    let addons = discover(fx.root()).unwrap();
    let result = orchestrator(&fx).run(&addons).await;
    assert!(matches!(result, Err(DevError::NoServices(_))));
}

/// A python service whose interpreter is a shell stand-in found through the
/// service's own `PATH`. It records its arguments and environment, then idles.
#[tokio::test]
async fn signal_after_clean_start_exits_zero() {
    let fx = Fixture::new();
    let bin = fx.root().join("bin");
    let out = fx.root().join("svc-env");
    executable(
        &bin.join("python"),
        "#!/bin/sh\n\
         printf '%s' \"$*\" > \"$SVC_OUT.args\"\n\
         printf '%s' \"$PEER_URL\" > \"$SVC_OUT.tmp\"\n\
         mv \"$SVC_OUT.tmp\" \"$SVC_OUT\"\n\
         exec sleep 30\n",
    );
    fx.addon(
        "svc",
        &format!(
            "slug: svc\npython: true\npython_module: svc_main\nrun_env:\n\
             \x20 - env: PATH\n    value: \"{}:/usr/bin:/bin\"\n\
             \x20 - env: SVC_OUT\n    value: \"{}\"\n\
             \x20 - env: PEER_URL\n    from_option: peer\n    default: \"http://local-x:5/\"\n",
            bin.display(),
            out.display()
        ),
    );
    executable(
        &fx.root().join("svc/local-dev/hooks/pre_start.sh"),
        "#!/bin/sh\ntouch \"$REPO_ROOT/pre-start-ran\"\n",
    );
    let addons = discover(fx.root()).unwrap();

    let orch = orchestrator(&fx);
    let shutdown = orch.shutdown();
    let stop_when_ready = async {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !out.is_file() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        shutdown.trigger(ShutdownReason::Signal("SIGINT"));
    };
    let (outcome, ()) = tokio::join!(orch.run(&addons), stop_when_ready);
    let outcome = outcome.unwrap();

    assert_eq!(outcome.services.len(), 1);
    let ServiceStatus::Started { pid: Some(pid) } = outcome.services[0].status else {
        panic!("expected a start, got {:?}", outcome.services[0].status);
    };
    assert_eq!(outcome.reason, ShutdownReason::Signal("SIGINT"));
    assert_eq!(outcome.exit_code(), 0);
    assert!(fx.root().join("pre-start-ran").is_file());
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "http://localhost:5/");
    assert_eq!(
        std::fs::read_to_string(fx.root().join("svc-env.args")).unwrap(),
        "-m svc_main"
    );
    assert!(!is_alive(pid));
}
