//! Find `*/addon.yaml` one level below the repository root.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{AddonManifest, ManifestError};

pub const MANIFEST_FILE: &str = "addon.yaml";

/// Discovered add-ons keyed by directory name, sorted alphabetically.
pub type AddonTable = BTreeMap<String, Addon>;

/// A manifest together with where it was found.
#[derive(Debug, Clone)]
pub struct Addon {
    /// Directory name under the repository root.
    pub key: String,
    /// Directory holding `addon.yaml`.
    pub dir: PathBuf,
    /// `dir / source_subdir`, or `dir` when unset.
    pub source_dir: PathBuf,
    pub manifest: AddonManifest,
}

impl Addon {
    pub fn slug(&self) -> Result<&str, ManifestError> {
        self.manifest
            .slug
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ManifestError::MissingField {
                addon: self.key.clone(),
                field: "slug",
            })
    }

    /// Human name, falling back to the slug and then the key.
    pub fn display_name(&self) -> &str {
        self.manifest
            .name
            .as_deref()
            .or(self.manifest.slug.as_deref())
            .unwrap_or(&self.key)
    }

    pub fn primary_port(&self) -> Option<u16> {
        self.manifest.primary_port()
    }
}

/// Scan immediate subdirectories of `repo_root` for `addon.yaml`.
///
/// Empty YAML documents are skipped. Slugs must be unique among manifests
/// that declare one; a missing slug is only reported when the add-on is used.
pub fn discover(repo_root: &Path) -> Result<AddonTable, ManifestError> {
    let entries = std::fs::read_dir(repo_root).map_err(|source| ManifestError::Read {
        path: repo_root.to_path_buf(),
        source,
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join(MANIFEST_FILE).is_file())
        .collect();
    dirs.sort();

    let mut table = AddonTable::new();
    let mut slugs: BTreeMap<String, String> = BTreeMap::new();

    for dir in dirs {
        let Some(key) = dir.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let Some(manifest) = load_manifest(&dir.join(MANIFEST_FILE))? else {
            debug!(addon = %key, "Skipping empty manifest");
            continue;
        };

        if let Some(slug) = manifest.slug.clone() {
            match slugs.entry(slug.clone()) {
                Entry::Occupied(existing) => {
                    return Err(ManifestError::DuplicateSlug {
                        slug,
                        first: existing.get().clone(),
                        second: key,
                    });
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(key.clone());
                }
            }
        }

        let source_dir = match manifest.source_subdir.as_deref() {
            Some(sub) if !sub.is_empty() => dir.join(sub),
            _ => dir.clone(),
        };

        debug!(addon = %key, source = %source_dir.display(), "Discovered add-on");
        table.insert(
            key.clone(),
            Addon {
                key,
                dir,
                source_dir,
                manifest,
            },
        );
    }

    Ok(table)
}

/// Look up one add-on by key.
pub fn find<'a>(table: &'a AddonTable, key: &str) -> Result<&'a Addon, ManifestError> {
    table
        .get(key)
        .ok_or_else(|| ManifestError::NotFound(key.to_string()))
}

fn load_manifest(path: &Path) -> Result<Option<AddonManifest>, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if value.is_null() {
        return Ok(None);
    }

    serde_yaml::from_value(value)
        .map(Some)
        .map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
