mod host;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parcel_core::{config::Config, stubs, PackageManager, PackageManifest, PackageState};
use tracing_subscriber::{fmt, EnvFilter};

use crate::host::{copy_assets, LogScheduler, StandaloneHost};

#[derive(Parser, Debug)]
#[command(name = "parcel", author, version, about = "Package discovery and activation")]
struct Cli {
    /// Sets the log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run both lifecycle phases and the deferred schedule hooks.
    Run {
        #[arg(short, long, value_name = "FILE", default_value = "config/packages.toml")]
        config: PathBuf,
        /// Treat this process as serving requests (no publishing, no schedules).
        #[arg(long)]
        serving: bool,
    },
    /// Inspect discovered packages.
    Packages {
        #[command(subcommand)]
        command: PackageCommands,
    },
    /// Print the file an active package maps a qualified symbol to.
    Resolve {
        #[arg(short, long, value_name = "FILE", default_value = "config/packages.toml")]
        config: PathBuf,
        #[arg(value_name = "SYMBOL")]
        symbol: String,
    },
    /// Interact with configuration files (validate, sample output).
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Copy the default config and sample package into a project.
    Publish {
        #[arg(long, value_name = "DIR", default_value = ".")]
        base: PathBuf,
        /// Overwrite files that already exist.
        #[arg(long)]
        force: bool,
    },
    /// Dump the resolved configuration as JSON.
    Diag {
        #[arg(short, long, value_name = "FILE", default_value = "config/packages.toml")]
        config: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum PackageCommands {
    /// Lists discovered packages with their activation state.
    List {
        #[arg(short, long, value_name = "FILE", default_value = "config/packages.toml")]
        config: PathBuf,
    },
    /// Lists manifest sources that could not be registered.
    Failures {
        #[arg(short, long, value_name = "FILE", default_value = "config/packages.toml")]
        config: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validates the provided configuration file.
    Validate {
        #[arg(value_name = "FILE")]
        config: PathBuf,
    },
    /// Prints the bundled default configuration.
    Example,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    match cli.command {
        Commands::Run { config, serving } => handle_run(&config, serving),
        Commands::Packages { command } => handle_packages(command),
        Commands::Resolve { config, symbol } => handle_resolve(&config, &symbol),
        Commands::Config { command } => handle_config(command),
        Commands::Publish { base, force } => handle_publish(&base, force),
        Commands::Diag { config } => handle_diag(&config),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).try_init().ok();
    Ok(())
}

/// Loads the config and runs register + boot against a standalone host.
fn start(config_path: &Path, operational: bool) -> Result<(PackageManager, StandaloneHost)> {
    let config = Config::load(config_path)?;
    let mut host = StandaloneHost::new(operational);
    let mut manager = PackageManager::new(config)
        .with_context(|| format!("invalid configuration {}", config_path.display()))?;
    manager.register(&mut host)?;
    manager.boot(&mut host)?;
    Ok((manager, host))
}

fn handle_run(config_path: &Path, serving: bool) -> Result<()> {
    let (manager, mut host) = start(config_path, !serving)?;
    let mut scheduler = LogScheduler::default();
    let failed = host.finish_startup(&mut scheduler);

    let active: Vec<_> = manager.active().collect();
    println!(
        "{} package(s) discovered, {} active, {} failure(s)",
        manager.registry().all().len(),
        active.len(),
        manager.registry().failures().len()
    );
    for id in active {
        println!("- {id}");
    }
    for service in host.services() {
        println!("registered service {service}");
    }
    for task in scheduler.tasks() {
        println!("scheduled {} [{}] {}", task.name, task.cron, task.command);
    }
    if failed > 0 {
        println!("{failed} schedule hook(s) failed; see log output");
    }
    for (tag, assets) in host.publishable() {
        println!(
            "{} asset(s) publishable under `{tag}`; run `parcel publish` to copy them",
            assets.len()
        );
    }
    Ok(())
}

fn handle_packages(command: PackageCommands) -> Result<()> {
    match command {
        PackageCommands::List { config } => {
            let (manager, _) = start(&config, false)?;
            let packages = manager.registry().all();
            if packages.is_empty() {
                println!("no packages discovered");
            }
            for (id, manifest) in packages {
                println!("{}", package_line(id, manifest, manager.state(id)));
            }
        }
        PackageCommands::Failures { config } => {
            let (manager, _) = start(&config, false)?;
            let failures = manager.registry().failures();
            if failures.is_empty() {
                println!("no failures");
            }
            for failure in failures {
                println!(
                    "- [{}] {}: {}",
                    failure.category,
                    failure.source_location.display(),
                    failure.error
                );
            }
        }
    }
    Ok(())
}

/// One `packages list` row: `- id [category] name vX.Y.Z: state`.
fn package_line(id: &str, manifest: &PackageManifest, state: Option<PackageState>) -> String {
    let state = match state {
        Some(PackageState::Active(by)) => format!("active ({by:?})").to_lowercase(),
        Some(PackageState::Inactive) => "inactive".to_string(),
        Some(PackageState::Discovered) | None => "discovered".to_string(),
    };
    let version = manifest
        .semver()
        .map(|v| format!(" v{v}"))
        .unwrap_or_default();
    format!(
        "- {} [{}] {}{}: {}",
        id,
        manifest.category,
        manifest.display_name(),
        version,
        state
    )
}

fn handle_resolve(config_path: &Path, symbol: &str) -> Result<()> {
    let (manager, _) = start(config_path, false)?;
    match manager.resolve_symbol(symbol) {
        Some(path) => println!("{}", path.display()),
        None => {
            let candidates = manager.registry().resolver().candidates(symbol);
            if candidates.is_empty() {
                println!("no active package maps `{symbol}`");
            } else {
                println!("`{symbol}` is unresolved; tried:");
                for candidate in candidates {
                    println!("  {}", candidate.display());
                }
            }
        }
    }
    Ok(())
}

fn handle_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { config } => {
            let cfg = Config::load(&config)?;
            cfg.validate()?;
            println!("configuration OK: {}", config.display());
        }
        ConfigCommands::Example => {
            println!("{}", stubs::SAMPLE_CONFIG);
        }
    }
    Ok(())
}

fn handle_publish(base: &Path, force: bool) -> Result<()> {
    let copied = copy_assets(&stubs::publishables(base), force)?;
    println!("published {copied} file(s) under {}", base.display());
    Ok(())
}

fn handle_diag(config_path: &Path) -> Result<()> {
    let cfg = Config::load(config_path)?;
    let json = serde_json::to_string_pretty(&cfg)?;
    println!("{json}");
    Ok(())
}
