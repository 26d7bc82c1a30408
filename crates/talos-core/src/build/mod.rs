//! Artifact builder
//!
//! Stages an add-on's sources, renders the template set and packs
//! `<build>/<slug>/` into `<build>/<slug>.tar.gz`.

pub mod archive;
pub mod assets;

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::RenderContext;
use crate::fs::{copy_file, copy_path, hash_tree, set_mode, write_with_mode};
use crate::paths::RepoPaths;
use crate::render::{self, RenderSkips, Template};

pub use archive::create_tar_gz;
pub use assets::PLACEHOLDER_PNG;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Copy entry '{entry}' not found at {}", .path.display())]
    MissingSource { entry: String, path: PathBuf },
    #[error("custom_dockerfile is set but {} does not exist", .0.display())]
    MissingDockerfile(PathBuf),
}

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub key: String,
    pub slug: String,
    pub version: String,
    pub artifact_dir: PathBuf,
    pub tarball: PathBuf,
    /// blake3 tree hash of `artifact_dir`.
    pub digest: String,
}

/// Builds add-on artifacts under a repository's build directory.
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    paths: RepoPaths,
}

impl ArtifactBuilder {
    pub fn new(paths: RepoPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    /// Build one add-on from its render context.
    ///
    /// The artifact directory is removed first. A failed build leaves
    /// whatever was written so far; the next build wipes it.
    pub fn build(&self, ctx: &RenderContext) -> anyhow::Result<BuildReport> {
        let artifact_dir = self.paths.artifact_dir(&ctx.slug);
        info!(addon = %ctx.key, slug = %ctx.slug, "Building add-on artifact");

        self.prepare_dirs(&artifact_dir)?;
        self.stage_sources(ctx, &artifact_dir)?;
        self.write_templates(ctx, &artifact_dir)?;

        std::fs::write(
            artifact_dir.join("CHANGELOG.md"),
            format!("## {}\n", ctx.version),
        )
        .context("Failed to write CHANGELOG.md")?;

        for image in ["icon.png", "logo.png"] {
            self.write_image(ctx, &artifact_dir, image)?;
        }

        let digest = hash_tree(&artifact_dir)?;
        let tarball = self.paths.tarball_path(&ctx.slug);
        create_tar_gz(&artifact_dir, &ctx.slug, &tarball)?;
        info!(slug = %ctx.slug, tarball = %tarball.display(), "Artifact ready");

        Ok(BuildReport {
            key: ctx.key.clone(),
            slug: ctx.slug.clone(),
            version: ctx.version.clone(),
            artifact_dir,
            tarball,
            digest,
        })
    }

    fn prepare_dirs(&self, artifact_dir: &Path) -> anyhow::Result<()> {
        if artifact_dir.exists() {
            std::fs::remove_dir_all(artifact_dir).with_context(|| {
                format!("Failed to remove previous build: {}", artifact_dir.display())
            })?;
        }
        for sub in ["app", "translations"] {
            let dir = artifact_dir.join(sub);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    fn stage_sources(&self, ctx: &RenderContext, artifact_dir: &Path) -> anyhow::Result<()> {
        let app_dir = artifact_dir.join("app");
        for entry in &ctx.copy {
            let src = ctx.source_dir.join(entry);
            if !src.exists() {
                return Err(BuildError::MissingSource {
                    entry: entry.clone(),
                    path: src,
                }
                .into());
            }
            let dst = match Path::new(entry).file_name() {
                Some(name) => app_dir.join(name),
                None => app_dir.join(entry),
            };
            debug!(entry = %entry, dst = %dst.display(), "Staging source");
            copy_path(&src, &dst)?;
        }
        Ok(())
    }

    fn write_templates(&self, ctx: &RenderContext, artifact_dir: &Path) -> anyhow::Result<()> {
        let own_run_script = ctx.source_dir.join("run.sh");
        let skips = RenderSkips {
            dockerfile: ctx.custom_dockerfile,
            run_script: own_run_script.is_file(),
        };

        if skips.dockerfile {
            let dockerfile = ctx.source_dir.join("Dockerfile");
            if !dockerfile.is_file() {
                return Err(BuildError::MissingDockerfile(dockerfile).into());
            }
            copy_file(&dockerfile, &artifact_dir.join(Template::Dockerfile.output_path()))?;
        }
        if skips.run_script {
            let dst = artifact_dir.join(Template::RunScript.output_path());
            copy_file(&own_run_script, &dst)?;
            set_mode(&dst, Template::RunScript.mode())?;
        }

        for artifact in render::render_all(ctx, skips) {
            let path = artifact_dir.join(artifact.template.output_path());
            write_with_mode(&path, artifact.contents.as_bytes(), artifact.template.mode())?;
        }
        Ok(())
    }

    /// Add-on source tree first, then the repository template directory,
    /// then the embedded placeholder.
    fn write_image(&self, ctx: &RenderContext, artifact_dir: &Path, name: &str) -> anyhow::Result<()> {
        let dst = artifact_dir.join(name);
        if dst.exists() {
            return Ok(());
        }
        let candidates = [ctx.source_dir.join(name), self.paths.template_dir().join(name)];
        match candidates.iter().find(|p| p.is_file()) {
            Some(src) => copy_file(src, &dst),
            None => std::fs::write(&dst, PLACEHOLDER_PNG)
                .with_context(|| format!("Failed to write {}", dst.display())),
        }
    }
}
