//! Add-on manifests: schema and discovery.

pub mod discovery;
pub mod schema;

use std::path::PathBuf;

use thiserror::Error;

pub use discovery::{Addon, AddonTable, MANIFEST_FILE, discover, find};
pub use schema::{AddonManifest, EnvSpec, GitClone, parse_port_key, scalar_to_string};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Duplicate slug '{slug}' declared by '{first}' and '{second}'")]
    DuplicateSlug {
        slug: String,
        first: String,
        second: String,
    },
    #[error("Add-on '{0}' not found")]
    NotFound(String),
    #[error("Add-on '{addon}' is missing required field '{field}'")]
    MissingField { addon: String, field: &'static str },
}
