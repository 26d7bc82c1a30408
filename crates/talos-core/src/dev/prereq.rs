//! Per-service checks that decide whether a service can be started.

use super::service::Service;

/// `Err(reason)` marks the service as skipped.
pub fn check(service: &Service) -> Result<(), String> {
    if service.is_python {
        check_python(service)
    } else {
        check_node(service)
    }
}

fn check_node(service: &Service) -> Result<(), String> {
    if !service.working_dir.is_dir() {
        // A missing upstream checkout is reported when the start command is resolved.
        return Ok(());
    }
    if !service.working_dir.join("node_modules").is_dir() {
        return Err(format!(
            "node_modules missing in {} (run npm install)",
            service.working_dir.display()
        ));
    }
    if which::which("npm").is_err() {
        return Err("npm not found on PATH".to_string());
    }
    Ok(())
}

fn check_python(service: &Service) -> Result<(), String> {
    let pyproject = service.working_dir.join("pyproject.toml");
    if !pyproject.is_file() {
        return Ok(());
    }
    if !service.working_dir.join("uv.lock").is_file() {
        return Err(format!(
            "uv.lock missing next to {} (run uv sync)",
            pyproject.display()
        ));
    }
    if which::which("uv").is_err() {
        return Err("uv not found on PATH".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn node_requires_node_modules() {
        let tmp = TempDir::new().unwrap();
        let mut svc = Service::for_test("web", &[]);
        svc.working_dir = tmp.path().to_path_buf();
        let reason = check(&svc).unwrap_err();
        assert!(reason.contains("node_modules"));
    }

    #[test]
    fn python_requires_lockfile_next_to_pyproject() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("pyproject.toml"), "[project]\nname = \"x\"\n").unwrap();
        let mut svc = Service::for_test("py", &[]);
        svc.is_python = true;
        svc.working_dir = tmp.path().to_path_buf();
        assert!(check(&svc).unwrap_err().contains("uv.lock"));
    }
}
