//! Render context assembly.
//!
//! Normalizes a manifest plus version files and runtime pins into the
//! frozen record every template is rendered from.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::manifest::{self, AddonTable, EnvSpec, GitClone, ManifestError};
use crate::paths::RepoPaths;

pub const DEFAULT_VERSION: &str = "0.0.0";
pub const DEFAULT_NODE_VERSION: &str = "20.18.2";
pub const DEFAULT_PYTHON_VERSION: &str = "3.9.0";
pub const DEFAULT_HOMEASSISTANT_MIN: &str = "2024.6.0";

/// Fixed paths inside the produced image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerPaths {
    pub venv: &'static str,
    pub tmp_overlay: &'static str,
    pub ha_options: &'static str,
    pub ha_config: &'static str,
    pub ha_data: &'static str,
}

pub const CONTAINER_PATHS: ContainerPaths = ContainerPaths {
    venv: "/opt/venv",
    tmp_overlay: "/tmp/app-overlay",
    ha_options: "/data/options.json",
    ha_config: "/config",
    ha_data: "/data",
};

/// Fixed paths on the remote supervisor host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployPaths {
    pub remote_home: &'static str,
    pub remote_addons: &'static str,
}

pub const DEPLOY_PATHS: DeployPaths = DeployPaths {
    remote_home: "/root",
    remote_addons: "/addons",
};

/// Node and Python pins read from the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeVersions {
    pub node_version: String,
    pub node_major: String,
    pub python_version: String,
    pub python_minor: String,
}

impl RuntimeVersions {
    /// Read `.nvmrc` and `.python-version`, substituting defaults when absent.
    pub fn load(paths: &RepoPaths) -> Self {
        let node_version = read_pin(&paths.nvmrc())
            .map(|v| v.trim_start_matches('v').to_string())
            .unwrap_or_else(|| DEFAULT_NODE_VERSION.to_string());
        let python_version = read_pin(&paths.python_version_file())
            .unwrap_or_else(|| DEFAULT_PYTHON_VERSION.to_string());

        let node_major = node_version
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();
        let python_minor = python_version
            .split('.')
            .take(2)
            .collect::<Vec<_>>()
            .join(".");

        Self {
            node_version,
            node_major,
            python_version,
            python_minor,
        }
    }
}

/// Block-style YAML for the opaque manifest mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YamlBlobs {
    pub ports: String,
    pub ports_description: String,
    pub environment: String,
    pub options: String,
    pub schema: String,
    pub translations: String,
    pub map: String,
}

/// Everything a template may reference for one add-on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderContext {
    pub key: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub url: Option<String>,
    pub version: String,
    pub runtime: RuntimeVersions,

    pub container_workdir: String,
    pub homeassistant_min: String,
    pub ingress: bool,
    pub ingress_entry: Option<String>,
    pub panel_icon: Option<String>,
    pub panel_title: Option<String>,
    pub homeassistant_api: bool,
    pub auth_api: bool,
    pub host_network: bool,
    pub usb: bool,
    pub audio: bool,
    pub gpio: bool,

    pub primary_port: Option<u16>,
    pub ports: Vec<u16>,

    pub python: bool,
    pub python_module: Option<String>,
    pub npm_build: bool,
    pub custom_dockerfile: bool,
    pub run_env: Vec<EnvSpec>,
    pub git_clone: Option<GitClone>,
    pub copy: Vec<String>,
    pub docs: Mapping,

    pub source_dir: PathBuf,
    pub container_paths: ContainerPaths,
    pub deploy_paths: DeployPaths,
    pub yaml: YamlBlobs,
}

impl RenderContext {
    /// Remote supervisor identifier.
    pub fn addon_id(&self) -> String {
        format!("local_{}", self.slug)
    }
}

/// Build the render context for `key`.
pub fn build_context(
    paths: &RepoPaths,
    addons: &AddonTable,
    key: &str,
) -> Result<RenderContext, ManifestError> {
    let addon = manifest::find(addons, key)?;
    let slug = addon.slug()?.to_string();
    let m = &addon.manifest;

    let version = if m.python {
        read_pyproject_version(&addon.source_dir.join("pyproject.toml"))
    } else {
        read_package_json_version(&addon.source_dir.join("package.json"))
    }
    .unwrap_or_else(|| DEFAULT_VERSION.to_string());
    debug!(addon = %key, %version, "Resolved add-on version");

    let yaml = YamlBlobs {
        ports: yaml_block(&Value::Mapping(normalize_port_keys(&m.ports))),
        ports_description: yaml_block(&Value::Mapping(normalize_port_keys(
            &m.ports_description,
        ))),
        environment: yaml_block(&Value::Mapping(m.environment.clone())),
        options: yaml_block(&Value::Mapping(m.options.clone())),
        schema: yaml_block(&Value::Mapping(m.schema.clone())),
        translations: yaml_block(&Value::Mapping(m.translations.clone())),
        map: yaml_block(&Value::Sequence(m.map.clone())),
    };

    Ok(RenderContext {
        key: key.to_string(),
        name: m.name.clone().unwrap_or_else(|| slug.clone()),
        description: m.description.clone().unwrap_or_default(),
        url: m.url.clone(),
        version,
        runtime: RuntimeVersions::load(paths),
        container_workdir: m
            .container_workdir
            .clone()
            .unwrap_or_else(|| format!("/opt/{slug}/app")),
        homeassistant_min: m
            .homeassistant_min
            .clone()
            .unwrap_or_else(|| DEFAULT_HOMEASSISTANT_MIN.to_string()),
        ingress: m.ingress,
        ingress_entry: m.ingress_entry.clone(),
        panel_icon: m.panel_icon.clone(),
        panel_title: m.panel_title.clone(),
        homeassistant_api: m.homeassistant_api,
        auth_api: m.auth_api,
        host_network: m.host_network,
        usb: m.usb,
        audio: m.audio,
        gpio: m.gpio,
        primary_port: m.primary_port(),
        ports: m.port_numbers(),
        python: m.python,
        python_module: m.python_module.clone(),
        npm_build: m.npm_build,
        custom_dockerfile: m.custom_dockerfile,
        run_env: m.run_env.clone(),
        git_clone: m.git_clone.clone(),
        copy: m.copy.clone(),
        docs: m.docs.clone(),
        source_dir: addon.source_dir.clone(),
        container_paths: CONTAINER_PATHS,
        deploy_paths: DEPLOY_PATHS,
        yaml,
        slug,
    })
}

/// Serialize block-style with insertion-ordered keys; empty collections
/// render inline (`{}` / `[]`).
pub fn yaml_block(value: &Value) -> String {
    match value {
        Value::Mapping(m) if m.is_empty() => "{}".to_string(),
        Value::Sequence(s) if s.is_empty() => "[]".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| "{}".to_string()),
    }
}

/// Supervisor expects `"<port>/tcp"` keys; bare numbers get the tcp suffix.
fn normalize_port_keys(ports: &Mapping) -> Mapping {
    ports
        .iter()
        .map(|(k, v)| {
            let key = match k {
                Value::Number(n) => Value::String(format!("{n}/tcp")),
                Value::String(s) if !s.contains('/') => Value::String(format!("{s}/tcp")),
                other => other.clone(),
            };
            (key, v.clone())
        })
        .collect()
}

fn read_pin(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let line = content.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.to_string())
}

fn read_package_json_version(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    json.get("version")?.as_str().map(str::to_string)
}

fn read_pyproject_version(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let doc: toml::Value = toml::from_str(&content).ok()?;
    doc.get("project")?
        .get("version")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_block_renders_empty_inline() {
        assert_eq!(yaml_block(&Value::Mapping(Mapping::new())), "{}");
        assert_eq!(yaml_block(&Value::Sequence(Vec::new())), "[]");
    }

    #[test]
    fn yaml_block_keeps_insertion_order() {
        let mut m = Mapping::new();
        m.insert("zeta".into(), 1.into());
        m.insert("alpha".into(), 2.into());
        assert_eq!(yaml_block(&Value::Mapping(m)), "zeta: 1\nalpha: 2");
    }

    #[test]
    fn port_keys_gain_tcp_suffix() {
        let mut m = Mapping::new();
        m.insert(8080.into(), 8080.into());
        m.insert("53/udp".into(), 53.into());
        m.insert("9000".into(), Value::Null);
        let normalized = normalize_port_keys(&m);
        let keys: Vec<_> = normalized.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                Value::from("8080/tcp"),
                Value::from("53/udp"),
                Value::from("9000/tcp")
            ]
        );
    }
}
