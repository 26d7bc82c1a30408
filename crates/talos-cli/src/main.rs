//! Talos - Home Assistant add-on build, deploy and dev tool
//!
//! Usage:
//!   talos addon list              # Show discovered add-ons
//!   talos addon build <key>       # Package one add-on
//!   talos addon deploy <key>      # Build and install on the supervisor
//!   talos dev                     # Run every add-on locally

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use talos_core::build::ArtifactBuilder;
use talos_core::context::build_context;
use talos_core::deploy::{
    DEFAULT_HA_HOST, DEFAULT_HA_PORT, DEFAULT_HA_USER, DeployOutcome, DeployTarget, Deployer,
    deploy_batch,
};
use talos_core::dev::{DevConfig, DevError, DevOrchestrator, listen_for_signals};
use talos_core::hooks::{self, HookOutcome};
use talos_core::manifest::{self, AddonTable};
use talos_core::paths::RepoPaths;
use talos_core::ports;
use talos_core::recipes::{self, RecipeStatus};

#[derive(Parser)]
#[command(name = "talos")]
#[command(about = "Build, deploy and run Home Assistant add-ons", long_about = None)]
struct Cli {
    /// Repository root (defaults to the nearest ancestor holding .git)
    #[arg(long, global = true, env = "TALOS_REPO_ROOT")]
    repo_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Single add-on operations
    #[command(subcommand)]
    Addon(AddonCommand),

    /// Operations over several add-ons
    #[command(subcommand)]
    Addons(AddonsCommand),

    /// Inspect or free the ports add-ons declare
    #[command(subcommand)]
    Ports(PortsCommand),

    /// Per-add-on lifecycle hooks
    #[command(subcommand)]
    Hook(HookCommand),

    /// Run every add-on locally until interrupted
    Dev,
}

#[derive(Subcommand)]
enum AddonCommand {
    /// List discovered add-ons with slug and ports
    List,

    /// Print add-on keys
    Names {
        /// Print a JSON array instead of one key per line
        #[arg(long)]
        json: bool,
    },

    /// Build the add-on package and tarball
    Build {
        /// Add-on key (directory name)
        key: String,
    },

    /// Build and install the add-on on a Home Assistant host
    Deploy {
        /// Add-on key (directory name)
        key: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Print the deployment plan without touching the remote
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the add-on's declared test commands
    Test {
        /// Add-on key (directory name)
        key: String,
    },
}

#[derive(Subcommand)]
enum AddonsCommand {
    /// Run a just recipe in each add-on that has a Justfile
    Run {
        /// Recipe name
        recipe: String,
        /// Add-on keys (all when omitted)
        keys: Vec<String>,
    },

    /// Deploy several add-ons one after another
    Deploy {
        /// Add-on keys (all when omitted)
        keys: Vec<String>,

        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Subcommand)]
enum PortsCommand {
    /// Show the ports each add-on declares
    List,

    /// Signal processes listening on declared ports
    Kill {
        /// Send SIGKILL instead of SIGTERM
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum HookCommand {
    /// Run a hook from <addon>/local-dev/hooks
    Run {
        /// Add-on key (directory name)
        addon: String,
        /// Hook name (pre_start, ...)
        hook: String,
        /// Succeed when the hook does not exist
        #[arg(long)]
        if_missing_ok: bool,
    },
}

#[derive(Args, Clone)]
struct TargetArgs {
    /// Home Assistant SSH host
    #[arg(long, env = "HA_HOST", default_value = DEFAULT_HA_HOST)]
    ha_host: String,

    /// Home Assistant SSH port
    #[arg(long, env = "HA_PORT", default_value_t = DEFAULT_HA_PORT)]
    ha_port: u32,

    /// Home Assistant SSH user
    #[arg(long, env = "HA_USER", default_value = DEFAULT_HA_USER)]
    ha_user: String,
}

impl From<TargetArgs> for DeployTarget {
    fn from(args: TargetArgs) -> Self {
        Self {
            host: args.ha_host,
            port: args.ha_port,
            user: args.ha_user,
        }
    }
}

fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries command output only.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talos=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let paths = RepoPaths::resolve(cli.repo_root)?;
    tracing::debug!(repo = %paths.repo_root().display(), "Resolved repository root");

    let code = match cli.command {
        Commands::Addon(cmd) => run_addon(&paths, cmd)?,
        Commands::Addons(cmd) => run_addons(&paths, cmd)?,
        Commands::Ports(cmd) => run_ports(&paths, cmd)?,
        Commands::Hook(cmd) => run_hook(&paths, cmd)?,
        Commands::Dev => run_dev(&paths)?,
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn load_addons(paths: &RepoPaths) -> Result<AddonTable> {
    manifest::discover(paths.repo_root())
        .with_context(|| format!("Failed to discover add-ons in {}", paths.repo_root().display()))
}

fn run_addon(paths: &RepoPaths, cmd: AddonCommand) -> Result<i32> {
    let addons = load_addons(paths)?;
    match cmd {
        AddonCommand::List => {
            for addon in addons.values() {
                let ports: Vec<String> = addon
                    .manifest
                    .port_numbers()
                    .iter()
                    .map(u16::to_string)
                    .collect();
                println!(
                    "- {}: slug={} port=[{}]",
                    addon.key,
                    addon.manifest.slug.as_deref().unwrap_or("<missing>"),
                    ports.join(", ")
                );
            }
            Ok(0)
        }
        AddonCommand::Names { json } => {
            let keys: Vec<&String> = addons.keys().collect();
            if json {
                println!("{}", serde_json::to_string(&keys)?);
            } else {
                for key in keys {
                    println!("{key}");
                }
            }
            Ok(0)
        }
        AddonCommand::Build { key } => {
            let ctx = build_context(paths, &addons, &key)?;
            let report = ArtifactBuilder::new(paths.clone()).build(&ctx)?;
            println!("✓ Built {} {}", report.slug, report.version);
            println!("  Package: {}", report.artifact_dir.display());
            println!("  Tarball: {}", report.tarball.display());
            println!("  Digest:  {}", report.digest);
            Ok(0)
        }
        AddonCommand::Deploy {
            key,
            target,
            dry_run,
        } => {
            let deployer = Deployer::over_ssh(paths.clone(), target.into());
            match deployer.deploy(&addons, &key, dry_run) {
                Ok(DeployOutcome::DryRun(plan)) => {
                    println!("{plan}");
                    Ok(0)
                }
                Ok(DeployOutcome::Deployed(report)) => {
                    println!(
                        "{} Deployed {} to {}",
                        style("✓").green(),
                        report.key,
                        report.target
                    );
                    if let Some(version) = &report.installed_version {
                        println!("  Installed version: {version}");
                    }
                    if let Some(core) = &report.remote.core_version {
                        println!("  Home Assistant: {core}");
                    }
                    println!("  Digest: {}", report.build.digest);
                    Ok(0)
                }
                Err(err) => {
                    eprintln!("{err}");
                    Ok(1)
                }
            }
        }
        AddonCommand::Test { key } => {
            let addon = manifest::find(&addons, &key)?;
            let ran = recipes::run_addon_tests(addon)?;
            if ran > 0 {
                println!("✓ {ran} test command(s) passed for {key}");
            }
            Ok(0)
        }
    }
}

fn run_addons(paths: &RepoPaths, cmd: AddonsCommand) -> Result<i32> {
    let addons = load_addons(paths)?;
    match cmd {
        AddonsCommand::Run { recipe, keys } => {
            let summary = recipes::run_recipe(&addons, &recipe, &keys);
            let succeeded = summary.keys_with(|s| *s == RecipeStatus::Succeeded);
            let skipped = summary.keys_with(|s| *s == RecipeStatus::Skipped);
            println!("Recipe '{recipe}':");
            println!("  succeeded: {}", list_or_none(&succeeded));
            println!("  skipped (no Justfile): {}", list_or_none(&skipped));
            for result in &summary.results {
                if let RecipeStatus::Failed(reason) = &result.status {
                    println!("  failed: {}: {reason}", result.key);
                }
            }
            Ok(if summary.any_failed() { 1 } else { 0 })
        }
        AddonsCommand::Deploy { keys, target } => {
            let deployer = Deployer::over_ssh(paths.clone(), target.into());
            let summary = deploy_batch(&deployer, &addons, &keys);
            for (_, err) in &summary.failed {
                eprintln!("{err}");
            }
            let succeeded: Vec<&str> = summary.succeeded.iter().map(String::as_str).collect();
            let failed: Vec<&str> = summary.failed.iter().map(|(k, _)| k.as_str()).collect();
            println!("Deploy summary:");
            println!("  succeeded: {}", list_or_none(&succeeded));
            println!("  failed: {}", list_or_none(&failed));
            Ok(if summary.is_success() { 0 } else { 1 })
        }
    }
}

fn list_or_none(keys: &[&str]) -> String {
    if keys.is_empty() {
        "(none)".to_string()
    } else {
        keys.join(", ")
    }
}

fn run_ports(paths: &RepoPaths, cmd: PortsCommand) -> Result<i32> {
    let entries = ports::collect_ports(paths.repo_root())?;
    match cmd {
        PortsCommand::List => {
            if entries.is_empty() {
                println!("No add-on ports declared.");
            } else {
                println!("{}", ports::format_port_list(&entries));
            }
        }
        PortsCommand::Kill { force } => {
            let report = ports::kill_ports(&entries, force)?;
            for record in &report.records {
                println!("  port {} pid {}: {}", record.port, record.pid, record.outcome);
            }
            if report.records.is_empty() {
                println!("No listeners on declared ports.");
            } else {
                println!("Signalled {} process(es).", report.killed());
            }
        }
    }
    Ok(0)
}

fn run_hook(paths: &RepoPaths, cmd: HookCommand) -> Result<i32> {
    let HookCommand::Run {
        addon,
        hook,
        if_missing_ok,
    } = cmd;
    let addons = load_addons(paths)?;
    let entry = match manifest::find(&addons, &addon) {
        Ok(entry) => entry,
        Err(e) => {
            eprintln!("{} {e}", style("✗").red());
            return Ok(1);
        }
    };
    match hooks::run_hook(paths.repo_root(), &entry.dir, &hook, if_missing_ok) {
        Ok(HookOutcome::Ran(path)) => {
            println!("✓ Hook {} finished", path.display());
            Ok(0)
        }
        Ok(HookOutcome::Missing) => {
            println!("• No '{hook}' hook for {addon}, skipped");
            Ok(0)
        }
        Err(e) => {
            eprintln!("{} {e}", style("✗").red());
            Ok(1)
        }
    }
}

fn run_dev(paths: &RepoPaths) -> Result<i32> {
    let addons = load_addons(paths)?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    runtime.block_on(async {
        let orchestrator = DevOrchestrator::new(paths.clone(), DevConfig::default());
        let signals = listen_for_signals(orchestrator.shutdown());
        let result = orchestrator.run(&addons).await;
        signals.abort();

        match result {
            Ok(outcome) => {
                println!("{}", outcome.summary());
                Ok(outcome.exit_code())
            }
            Err(DevError::PortConflicts(conflicts)) => {
                eprintln!("{}", talos_core::dev::format_conflicts(&conflicts));
                Ok(1)
            }
            Err(e) => {
                eprintln!("{} {e}", style("✗").red());
                Ok(1)
            }
        }
    })
}
