#![allow(dead_code)]

use std::path::{Path, PathBuf};

use talos_core::paths::RepoPaths;
use tempfile::TempDir;

/// Throwaway repository with `addon.yaml` directories under its root.
pub struct Fixture {
    pub temp: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".git")).unwrap();
        Self { temp }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> RepoPaths {
        RepoPaths::new(self.root().to_path_buf())
    }

    /// Write `<root>/<key>/addon.yaml` and return the add-on directory.
    pub fn addon(&self, key: &str, manifest: &str) -> PathBuf {
        let dir = self.root().join(key);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("addon.yaml"), manifest).unwrap();
        dir
    }

    pub fn file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }
}

/// The two add-ons used across the end-to-end scenarios.
pub fn foo_bar() -> Fixture {
    let fx = Fixture::new();
    fx.addon("foo", "slug: foo\nports:\n  8080: 8080\n");
    fx.addon("bar", "slug: bar\nports: {}\n");
    fx
}
