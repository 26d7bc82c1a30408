//! Environment materialization for dev services.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::service::Service;
use crate::manifest::EnvSpec;

static LOCAL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"http://local-[A-Za-z0-9_-]+:(\d+)").expect("Invalid local URL regex")
});

/// Fixed path rewrites from supervisor paths to host paths.
const PATH_SUBSTITUTIONS: &[(&str, &str)] = &[("/share/printer-labels", "/tmp/printer-labels")];

/// Rewrite `http://local-<peer>:<port>` to localhost and apply the fixed
/// path substitutions.
pub fn localize(value: &str) -> String {
    let mut out = LOCAL_URL
        .replace_all(value, "http://localhost:$1")
        .into_owned();
    for (from, to) in PATH_SUBSTITUTIONS {
        out = out.replace(from, to);
    }
    out
}

/// Variables layered over the inherited parent environment.
///
/// Static values are used as declared; `from_option` specs take their
/// localized default. Optional specs with an empty default are left out.
pub fn service_env(service: &Service, dyld_prefix: Option<&Path>, parent_dyld: Option<&str>) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for spec in &service.run_env {
        match spec {
            EnvSpec::Static { name, value } => {
                env.insert(name.clone(), value.clone());
            }
            EnvSpec::FromOption {
                name,
                default,
                optional,
                ..
            } => {
                if *optional && default.is_empty() {
                    continue;
                }
                env.insert(name.clone(), localize(default));
            }
        }
    }

    if service.is_python
        && let Some(prefix) = dyld_prefix
    {
        let lib = prefix.join("lib").to_string_lossy().into_owned();
        let value = match parent_dyld.filter(|v| !v.is_empty()) {
            Some(existing) => format!("{lib}:{existing}"),
            None => lib,
        };
        env.insert("DYLD_LIBRARY_PATH".to_string(), value);
    }
    env
}

/// Homebrew prefix on macOS, when Homebrew is installed.
pub fn homebrew_prefix() -> Option<PathBuf> {
    if !cfg!(target_os = "macos") {
        return None;
    }
    let brew = which::which("brew").ok()?;
    let prefix = brew.parent()?.parent()?.to_path_buf();
    prefix.join("lib").is_dir().then_some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(run_env: Vec<EnvSpec>, is_python: bool) -> Service {
        let mut s = Service::for_test("svc", &[]);
        s.run_env = run_env;
        s.is_python = is_python;
        s
    }

    fn opt(name: &str, default: &str, optional: bool) -> EnvSpec {
        EnvSpec::FromOption {
            name: name.to_string(),
            option: name.to_lowercase(),
            default: default.to_string(),
            optional,
        }
    }

    #[test]
    fn localize_rewrites_peer_hosts_and_paths() {
        assert_eq!(
            localize("http://local-sonos-api:5006/zones"),
            "http://localhost:5006/zones"
        );
        assert_eq!(localize("/share/printer-labels/out"), "/tmp/printer-labels/out");
        assert_eq!(localize("http://example.com:80"), "http://example.com:80");
    }

    #[test]
    fn optional_empty_defaults_are_omitted() {
        let svc = service(
            vec![
                EnvSpec::Static {
                    name: "MODE".to_string(),
                    value: "dev".to_string(),
                },
                opt("TOKEN", "", true),
                opt("REQUIRED", "", false),
                opt("API", "http://local-grid-dashboard:8080", false),
            ],
            false,
        );
        let env = service_env(&svc, None, None);
        assert_eq!(env.get("MODE").map(String::as_str), Some("dev"));
        assert!(!env.contains_key("TOKEN"));
        assert_eq!(env.get("REQUIRED").map(String::as_str), Some(""));
        assert_eq!(env.get("API").map(String::as_str), Some("http://localhost:8080"));
    }

    #[test]
    fn dyld_path_is_prepended_for_python() {
        let svc = service(Vec::new(), true);
        let env = service_env(&svc, Some(Path::new("/opt/homebrew")), Some("/usr/lib"));
        assert_eq!(
            env.get("DYLD_LIBRARY_PATH").map(String::as_str),
            Some("/opt/homebrew/lib:/usr/lib")
        );

        let node = service(Vec::new(), false);
        assert!(service_env(&node, Some(Path::new("/opt/homebrew")), None).is_empty());
    }

    #[test]
    fn local_url_regex_compiles() {
        assert!(LOCAL_URL.is_match("http://local-sonos_api:5006"));
        assert!(!LOCAL_URL.is_match("http://localhost:5006"));
    }
}
