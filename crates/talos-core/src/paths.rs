//! Repository path resolution.

use std::path::{Path, PathBuf};

use anyhow::Context;

const BUILD_SUBDIR: &str = "build/home-assistant-addon";
const TEMPLATE_SUBDIR: &str = "talos/templates";

/// Resolved roots for one CLI invocation.
///
/// Frontends create this once and pass it to every component.
#[derive(Debug, Clone)]
pub struct RepoPaths {
    repo_root: PathBuf,
    build_dir: PathBuf,
    template_dir: PathBuf,
}

impl RepoPaths {
    /// Derive build and template directories from the repository root.
    pub fn new(repo_root: PathBuf) -> Self {
        let build_dir = repo_root.join(BUILD_SUBDIR);
        let template_dir = repo_root.join(TEMPLATE_SUBDIR);
        Self {
            repo_root,
            build_dir,
            template_dir,
        }
    }

    /// Resolve the repository root.
    ///
    /// An explicit root wins; otherwise the nearest ancestor of the current
    /// directory holding `.git`, falling back to the current directory.
    pub fn resolve(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(root) = explicit {
            let root = root
                .canonicalize()
                .with_context(|| format!("Repository root not found: {}", root.display()))?;
            return Ok(Self::new(root));
        }
        let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
        Ok(Self::new(find_repo_root(&cwd)))
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    /// `<build>/<slug>/`
    pub fn artifact_dir(&self, slug: &str) -> PathBuf {
        self.build_dir.join(slug)
    }

    /// `<build>/<slug>.tar.gz`
    pub fn tarball_path(&self, slug: &str) -> PathBuf {
        self.build_dir.join(format!("{slug}.tar.gz"))
    }

    pub fn nvmrc(&self) -> PathBuf {
        self.repo_root.join(".nvmrc")
    }

    pub fn python_version_file(&self) -> PathBuf {
        self.repo_root.join(".python-version")
    }
}

/// Walk up from `start` to the first directory containing `.git`.
pub fn find_repo_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .unwrap_or(start)
        .to_path_buf()
}
