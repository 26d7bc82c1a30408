//! `addon.yaml` schema.

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

/// Parsed add-on manifest.
///
/// Every field is optional at parse time; required fields are checked when a
/// consumer asks for them (see [`crate::manifest::Addon::slug`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddonManifest {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub source_subdir: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub copy: Vec<String>,
    pub container_workdir: Option<String>,
    pub homeassistant_min: Option<String>,

    #[serde(deserialize_with = "nullable")]
    pub ingress: bool,
    pub ingress_entry: Option<String>,
    pub panel_icon: Option<String>,
    pub panel_title: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub homeassistant_api: bool,
    #[serde(deserialize_with = "nullable")]
    pub auth_api: bool,
    #[serde(deserialize_with = "nullable")]
    pub host_network: bool,

    /// Container port to host port, in declaration order.
    #[serde(deserialize_with = "nullable")]
    pub ports: Mapping,
    #[serde(deserialize_with = "nullable")]
    pub ports_description: Mapping,
    #[serde(deserialize_with = "nullable")]
    pub environment: Mapping,
    #[serde(deserialize_with = "nullable")]
    pub options: Mapping,
    #[serde(deserialize_with = "nullable")]
    pub schema: Mapping,
    #[serde(deserialize_with = "nullable")]
    pub translations: Mapping,
    #[serde(deserialize_with = "nullable")]
    pub docs: Mapping,

    #[serde(deserialize_with = "nullable")]
    pub python: bool,
    pub python_module: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub npm_build: bool,
    #[serde(deserialize_with = "nullable")]
    pub custom_dockerfile: bool,

    #[serde(deserialize_with = "nullable")]
    pub run_env: Vec<EnvSpec>,
    pub git_clone: Option<GitClone>,
    #[serde(deserialize_with = "nullable")]
    pub tests: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub map: Vec<Value>,
    #[serde(deserialize_with = "nullable")]
    pub usb: bool,
    #[serde(deserialize_with = "nullable")]
    pub audio: bool,
    #[serde(deserialize_with = "nullable")]
    pub gpio: bool,
}

impl AddonManifest {
    /// Declared port numbers in declaration order. Unparseable keys are skipped.
    pub fn port_numbers(&self) -> Vec<u16> {
        self.ports.keys().filter_map(parse_port_key).collect()
    }

    /// The first declared port, used for health and conflict checks.
    pub fn primary_port(&self) -> Option<u16> {
        self.ports.keys().next().and_then(parse_port_key)
    }
}

/// Accepts `8080`, `"8080"` and `"8080/tcp"`.
pub fn parse_port_key(key: &Value) -> Option<u16> {
    match key {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.split('/').next()?.trim().parse().ok(),
        _ => None,
    }
}

/// One environment injection declared in `run_env`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvSpec", into = "RawEnvSpec")]
pub enum EnvSpec {
    /// `{env: NAME, value: V}`
    Static { name: String, value: String },
    /// `{env: NAME, from_option: KEY, default: D, optional?: bool}`
    FromOption {
        name: String,
        option: String,
        default: String,
        optional: bool,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawEnvSpec {
    env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
}

impl TryFrom<RawEnvSpec> for EnvSpec {
    type Error = String;

    fn try_from(raw: RawEnvSpec) -> Result<Self, Self::Error> {
        match (raw.from_option, raw.value) {
            (Some(option), _) => Ok(EnvSpec::FromOption {
                name: raw.env,
                option,
                default: raw.default.as_ref().map(scalar_to_string).unwrap_or_default(),
                optional: raw.optional.unwrap_or(false),
            }),
            (None, Some(value)) => Ok(EnvSpec::Static {
                name: raw.env,
                value: scalar_to_string(&value),
            }),
            (None, None) => Err(format!(
                "run_env entry '{}' needs either 'value' or 'from_option'",
                raw.env
            )),
        }
    }
}

impl From<EnvSpec> for RawEnvSpec {
    fn from(spec: EnvSpec) -> Self {
        match spec {
            EnvSpec::Static { name, value } => RawEnvSpec {
                env: name,
                value: Some(Value::String(value)),
                ..Default::default()
            },
            EnvSpec::FromOption {
                name,
                option,
                default,
                optional,
            } => RawEnvSpec {
                env: name,
                from_option: Some(option),
                default: Some(Value::String(default)),
                optional: optional.then_some(true),
                ..Default::default()
            },
        }
    }
}

/// Upstream source cloned at image build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GitClone {
    Url(String),
    Detailed {
        url: String,
        #[serde(default, rename = "ref")]
        reference: Option<String>,
        #[serde(default)]
        dest: Option<String>,
    },
}

impl GitClone {
    pub fn url(&self) -> &str {
        match self {
            GitClone::Url(url) | GitClone::Detailed { url, .. } => url,
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            GitClone::Url(_) => None,
            GitClone::Detailed { reference, .. } => reference.as_deref(),
        }
    }

    pub fn dest(&self) -> Option<&str> {
        match self {
            GitClone::Url(_) => None,
            GitClone::Detailed { dest, .. } => dest.as_deref(),
        }
    }
}

/// Render a YAML scalar the way a shell would see it.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> AddonManifest {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn primary_port_is_first_declared() {
        let manifest = parse("slug: foo\nports:\n  9000: 9000\n  8080: 8080\n");
        assert_eq!(manifest.primary_port(), Some(9000));
        assert_eq!(manifest.port_numbers(), vec![9000, 8080]);
    }

    #[test]
    fn port_keys_accept_strings_with_protocol() {
        assert_eq!(parse_port_key(&Value::from("8123/tcp")), Some(8123));
        assert_eq!(parse_port_key(&Value::from("53")), Some(53));
        assert_eq!(parse_port_key(&Value::from(8080)), Some(8080));
        assert_eq!(parse_port_key(&Value::from("http")), None);
        assert_eq!(parse_port_key(&Value::from(70000)), None);
    }

    #[test]
    fn empty_or_null_ports_have_no_primary() {
        assert_eq!(parse("slug: bar\nports: {}\n").primary_port(), None);
        assert_eq!(parse("slug: bar\nports:\n").primary_port(), None);
        assert_eq!(parse("slug: bar\n").primary_port(), None);
    }

    #[test]
    fn run_env_parses_both_variants() {
        let manifest = parse(
            r#"
slug: foo
run_env:
  - env: LOG_LEVEL
    value: debug
  - env: API_URL
    from_option: api_url
    default: http://local-sonos-api:5005
  - env: TOKEN
    from_option: token
    default: ""
    optional: true
  - env: RETRIES
    value: 3
"#,
        );

        assert_eq!(
            manifest.run_env,
            vec![
                EnvSpec::Static {
                    name: "LOG_LEVEL".into(),
                    value: "debug".into()
                },
                EnvSpec::FromOption {
                    name: "API_URL".into(),
                    option: "api_url".into(),
                    default: "http://local-sonos-api:5005".into(),
                    optional: false,
                },
                EnvSpec::FromOption {
                    name: "TOKEN".into(),
                    option: "token".into(),
                    default: String::new(),
                    optional: true,
                },
                EnvSpec::Static {
                    name: "RETRIES".into(),
                    value: "3".into()
                },
            ]
        );
    }

    #[test]
    fn run_env_without_value_or_option_is_rejected() {
        let result: Result<AddonManifest, _> =
            serde_yaml::from_str("slug: foo\nrun_env:\n  - env: BROKEN\n");
        assert!(result.is_err());
    }

    #[test]
    fn git_clone_accepts_url_or_mapping() {
        let short = parse("git_clone: https://example.com/repo.git\n");
        assert_eq!(
            short.git_clone.as_ref().map(GitClone::url),
            Some("https://example.com/repo.git")
        );

        let long = parse("git_clone:\n  url: https://example.com/r.git\n  ref: v1\n");
        let clone = long.git_clone.unwrap();
        assert_eq!(clone.reference(), Some("v1"));
        assert_eq!(clone.dest(), None);
    }
}
