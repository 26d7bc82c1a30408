//! Per-add-on lifecycle hooks under `<addon>/local-dev/hooks/`.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

pub const HOOKS_DIR: &str = "local-dev/hooks";
pub const PRE_START: &str = "pre_start";

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Hook '{hook}' not found in {}", .dir.display())]
    Missing { hook: String, dir: PathBuf },
    #[error("Hook {} is not executable", .0.display())]
    NotExecutable(PathBuf),
    #[error("Failed to run hook {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Hook {} exited with {}", .path.display(), describe_exit(.code))]
    Failed { path: PathBuf, code: Option<i32> },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

/// What happened when a hook was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Ran(PathBuf),
    /// No hook file and the caller allowed that.
    Missing,
}

/// First existing file among `<hook>`, `<hook>.sh`, `<hook>.py`.
pub fn resolve_hook(addon_dir: &Path, hook: &str) -> Option<PathBuf> {
    let dir = addon_dir.join(HOOKS_DIR);
    [hook.to_string(), format!("{hook}.sh"), format!("{hook}.py")]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Run `hook` for the add-on in `addon_dir` with `REPO_ROOT` exported and
/// the add-on directory as working directory.
pub fn run_hook(
    repo_root: &Path,
    addon_dir: &Path,
    hook: &str,
    missing_ok: bool,
) -> Result<HookOutcome, HookError> {
    let Some(path) = resolve_hook(addon_dir, hook) else {
        if missing_ok {
            debug!(hook, dir = %addon_dir.display(), "No hook, skipping");
            return Ok(HookOutcome::Missing);
        }
        return Err(HookError::Missing {
            hook: hook.to_string(),
            dir: addon_dir.join(HOOKS_DIR),
        });
    };

    if !is_executable(&path) {
        return Err(HookError::NotExecutable(path));
    }

    info!(hook, path = %path.display(), "Running hook");
    let status = Command::new(&path)
        .current_dir(addon_dir)
        .env("REPO_ROOT", repo_root)
        .status()
        .map_err(|source| HookError::Spawn {
            path: path.clone(),
            source,
        })?;

    if status.success() {
        Ok(HookOutcome::Ran(path))
    } else {
        Err(HookError::Failed {
            path,
            code: status.code(),
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prefers_bare_name_over_extensions() {
        let tmp = TempDir::new().unwrap();
        let hooks = tmp.path().join(HOOKS_DIR);
        std::fs::create_dir_all(&hooks).unwrap();
        std::fs::write(hooks.join("pre_start.sh"), "").unwrap();
        assert_eq!(
            resolve_hook(tmp.path(), "pre_start"),
            Some(hooks.join("pre_start.sh"))
        );

        std::fs::write(hooks.join("pre_start"), "").unwrap();
        assert_eq!(
            resolve_hook(tmp.path(), "pre_start"),
            Some(hooks.join("pre_start"))
        );
    }

    #[test]
    fn missing_hook_respects_missing_ok() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            run_hook(tmp.path(), tmp.path(), "pre_start", true).unwrap(),
            HookOutcome::Missing
        );
        assert!(matches!(
            run_hook(tmp.path(), tmp.path(), "pre_start", false),
            Err(HookError::Missing { .. })
        ));
    }

    #[cfg(unix)]
    fn write_hook(addon_dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let hooks = addon_dir.join(HOOKS_DIR);
        std::fs::create_dir_all(&hooks).unwrap();
        let path = hooks.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_hook_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_hook(tmp.path(), "pre_start.sh", "#!/bin/sh\nexit 0\n", 0o644);
        match run_hook(tmp.path(), tmp.path(), "pre_start", true) {
            Err(HookError::NotExecutable(p)) => assert_eq!(p, path),
            other => panic!("expected NotExecutable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn failing_hook_reports_exit_code() {
        let tmp = TempDir::new().unwrap();
        let path = write_hook(tmp.path(), "pre_start", "#!/bin/sh\nexit 3\n", 0o755);
        let err = run_hook(tmp.path(), tmp.path(), "pre_start", false).unwrap_err();
        match &err {
            HookError::Failed { path: p, code } => {
                assert_eq!(p, &path);
                assert_eq!(*code, Some(3));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(err.to_string().contains("exited with code 3"), "{err}");
    }
}
