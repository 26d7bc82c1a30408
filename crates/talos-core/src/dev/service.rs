//! Dev service records derived from manifests.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::manifest::{Addon, AddonTable, EnvSpec};
use crate::paths::RepoPaths;

/// Services that run from an upstream checkout instead of their own tree.
const UPSTREAM_CHECKOUTS: &[(&str, &str, &str)] = &[(
    "node-sonos-http-api",
    "vendor/node-sonos-http-api",
    "https://github.com/jishi/node-sonos-http-api.git",
)];

static LOCAL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"local-([A-Za-z0-9][A-Za-z0-9_-]*)").expect("Invalid local host regex")
});

/// Program plus arguments for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSpec {
    pub command: String,
    pub args: Vec<String>,
}

impl RunnerSpec {
    pub fn new(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl std::fmt::Display for RunnerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Service {
    pub key: String,
    pub slug: String,
    pub name: String,
    pub primary_port: Option<u16>,
    pub is_python: bool,
    pub run_env: Vec<EnvSpec>,
    /// Manifest directory; hooks live under it.
    pub addon_dir: PathBuf,
    pub working_dir: PathBuf,
    /// Resolved start command, or why there is none.
    pub start_cmd: Result<RunnerSpec, String>,
    /// Keys of services this one talks to.
    pub dependencies: Vec<String>,
}

impl Service {
    pub fn from_addon(addon: &Addon, addons: &AddonTable, paths: &RepoPaths) -> Self {
        let m = &addon.manifest;
        let slug = m.slug.clone().unwrap_or_else(|| addon.key.clone());

        let upstream = UPSTREAM_CHECKOUTS
            .iter()
            .find(|(name, _, _)| *name == addon.key || *name == slug);
        let (working_dir, start_cmd) = match upstream {
            Some((_, rel, url)) => {
                let dir = paths.repo_root().join(rel);
                let cmd = if dir.is_dir() {
                    Ok(node_start_command(&dir))
                } else {
                    Err(format!(
                        "Upstream checkout missing at {}. Run: git clone {url} {}",
                        dir.display(),
                        dir.display()
                    ))
                };
                (dir, cmd)
            }
            None if m.python => {
                let module = m
                    .python_module
                    .clone()
                    .unwrap_or_else(|| slug.replace('-', "_"));
                (
                    addon.source_dir.clone(),
                    Ok(python_start_command(&addon.source_dir, &module)),
                )
            }
            None => (
                addon.source_dir.clone(),
                Ok(node_start_command(&addon.source_dir)),
            ),
        };

        Self {
            key: addon.key.clone(),
            name: addon.display_name().to_string(),
            primary_port: m.primary_port(),
            is_python: m.python,
            run_env: m.run_env.clone(),
            addon_dir: addon.dir.clone(),
            working_dir,
            start_cmd,
            dependencies: infer_dependencies(&addon.key, &m.run_env, addons),
            slug,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(key: &str, deps: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            slug: key.to_string(),
            name: key.to_string(),
            primary_port: None,
            is_python: false,
            run_env: Vec::new(),
            addon_dir: PathBuf::from("."),
            working_dir: PathBuf::from("."),
            start_cmd: Ok(RunnerSpec::new("true", &[])),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Peers referenced as `local-<name>` hosts in `from_option` defaults.
///
/// A name matches an add-on by key or slug (underscores read as hyphens,
/// case-insensitive). Unknown names and self references are ignored.
pub fn infer_dependencies(own_key: &str, run_env: &[EnvSpec], addons: &AddonTable) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    for spec in run_env {
        let EnvSpec::FromOption { default, .. } = spec else {
            continue;
        };
        for cap in LOCAL_HOST.captures_iter(default) {
            let host = &cap[1];
            let Some(addon) = addons.values().find(|a| host_matches(host, a)) else {
                continue;
            };
            if addon.key != own_key && !deps.contains(&addon.key) {
                deps.push(addon.key.clone());
            }
        }
    }
    deps
}

fn host_matches(host: &str, addon: &Addon) -> bool {
    let norm = |s: &str| s.replace('_', "-").to_ascii_lowercase();
    let host = norm(host);
    host == norm(&addon.key) || addon.manifest.slug.as_deref().is_some_and(|s| host == norm(s))
}

/// `npm run dev`, then `npm run start:dev`, then `npm start`.
fn node_start_command(dir: &Path) -> RunnerSpec {
    let scripts = std::fs::read_to_string(dir.join("package.json"))
        .ok()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|json| json.get("scripts").cloned());
    let has = |name: &str| scripts.as_ref().and_then(|s| s.get(name)).is_some();

    if has("dev") {
        RunnerSpec::new("npm", &["run", "dev"])
    } else if has("start:dev") {
        RunnerSpec::new("npm", &["run", "start:dev"])
    } else {
        RunnerSpec::new("npm", &["start"])
    }
}

/// First `[project.scripts]` entry through `uv run`, else `python -m`.
fn python_start_command(dir: &Path, module: &str) -> RunnerSpec {
    let script = std::fs::read_to_string(dir.join("pyproject.toml"))
        .ok()
        .and_then(|raw| toml::from_str::<toml::Table>(&raw).ok())
        .and_then(|doc| {
            doc.get("project")?
                .get("scripts")?
                .as_table()?
                .keys()
                .next()
                .cloned()
        });
    match script {
        Some(script) => RunnerSpec::new("uv", &["run", &script]),
        None => RunnerSpec::new("python", &["-m", module]),
    }
}
