//! Talos Core Library
//!
//! Turns a repository of services declared by `addon.yaml` manifests into
//! Home Assistant add-on packages, deploys them to a remote supervisor over
//! SSH, and runs the same services locally as a supervised multi-process
//! development environment.
//!
//! # Architecture
//!
//! ```text
//! manifest ──► context ──► render ──► build ──► deploy
//!     │
//!     ├──► ports (list / kill)
//!     ├──► hooks
//!     └──► dev (graph ─► port gate ─► supervisor ─► logs)
//! ```

pub mod build;
pub mod context;
pub mod deploy;
pub mod dev;
pub mod error;
pub mod fs;
pub mod hooks;
pub mod manifest;
pub mod paths;
pub mod ports;
pub mod recipes;
pub mod render;

/// Re-exports of commonly used types
pub mod prelude {
    pub use crate::build::{ArtifactBuilder, BuildReport};
    pub use crate::context::{RenderContext, build_context};
    pub use crate::deploy::{DeployOutcome, DeployTarget, Deployer};
    pub use crate::dev::{DevConfig, DevOrchestrator, DevOutcome};
    pub use crate::error::{DeploymentError, ErrorType};
    pub use crate::manifest::{Addon, AddonManifest, AddonTable, EnvSpec, discover};
    pub use crate::paths::RepoPaths;
}
