//! Template rendering.
//!
//! The template set is fixed; each [`Template`] maps to one render function
//! over a [`RenderContext`]. Rendering is pure: the same context always
//! yields byte-identical output.

mod config;
mod docs;
mod dockerfile;
pub mod filters;
mod run_script;

use crate::context::RenderContext;

/// Named templates, in the order the builder writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    Config,
    Dockerfile,
    RunScript,
    Readme,
    Docs,
    AppArmor,
    TranslationsEn,
}

impl Template {
    pub const ALL: [Template; 7] = [
        Template::Config,
        Template::Dockerfile,
        Template::RunScript,
        Template::Readme,
        Template::Docs,
        Template::AppArmor,
        Template::TranslationsEn,
    ];

    /// Template name.
    pub fn name(self) -> &'static str {
        match self {
            Template::Config => "config.yaml",
            Template::Dockerfile => "Dockerfile",
            Template::RunScript => "run.sh",
            Template::Readme => "README.md",
            Template::Docs => "DOCS.md",
            Template::AppArmor => "apparmor.txt",
            Template::TranslationsEn => "translations_en.yaml",
        }
    }

    /// Output path relative to the artifact directory.
    pub fn output_path(self) -> &'static str {
        match self {
            Template::TranslationsEn => "translations/en.yaml",
            other => other.name(),
        }
    }

    /// Unix mode for the written file.
    pub fn mode(self) -> u32 {
        match self {
            Template::RunScript => 0o755,
            _ => 0o644,
        }
    }
}

/// Templates replaced by a verbatim copy from the source tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSkips {
    /// `custom_dockerfile: true`
    pub dockerfile: bool,
    /// The source tree ships its own `run.sh`.
    pub run_script: bool,
}

impl RenderSkips {
    pub fn skips(&self, template: Template) -> bool {
        match template {
            Template::Dockerfile => self.dockerfile,
            Template::RunScript => self.run_script,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub template: Template,
    pub contents: String,
}

pub fn render(template: Template, ctx: &RenderContext) -> String {
    match template {
        Template::Config => config::render(ctx),
        Template::Dockerfile => dockerfile::render(ctx),
        Template::RunScript => run_script::render(ctx),
        Template::Readme => docs::render_readme(ctx),
        Template::Docs => docs::render_docs(ctx),
        Template::AppArmor => docs::render_apparmor(ctx),
        Template::TranslationsEn => docs::render_translations(ctx),
    }
}

/// Render every template not short-circuited by `skips`.
pub fn render_all(ctx: &RenderContext, skips: RenderSkips) -> Vec<RenderedArtifact> {
    Template::ALL
        .into_iter()
        .filter(|t| !skips.skips(*t))
        .map(|template| RenderedArtifact {
            template,
            contents: render(template, ctx),
        })
        .collect()
}

/// Python entry module, defaulting to the slug in identifier form.
pub(crate) fn python_module(ctx: &RenderContext) -> String {
    ctx.python_module
        .clone()
        .unwrap_or_else(|| ctx.slug.replace('-', "_"))
}
