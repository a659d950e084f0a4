mod logging;
mod replay;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glint_config::{ConfigLoadError, GlintConfig};
use glint_host::{module_path, DirStorage, HeterogeneousAllocator, PoolKind, Storage};
use tracing::info;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show which file `require` would load for a module name
    Resolve {
        module: String,

        /// Host directory standing in for the storage mount
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Replay an allocation trace through the script heap
    Replay { trace: PathBuf },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => GlintConfig::config_path().context("Failed to find home directory"),
    }
}

fn load_config(cli: &Cli) -> Result<GlintConfig> {
    let path = config_path(cli)?;
    match GlintConfig::load_from(&path) {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound) => Ok(GlintConfig::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _guard = logging::init_logging(&config.logging, cli.verbose)
        .context("Failed to initialize logging")?;

    match &cli.command {
        Command::Resolve { module, root } => resolve(&config, module, root.clone()),
        Command::Replay { trace } => run_replay(&config, trace),
        Command::Config { action } => match action {
            ConfigAction::Init { force } => config_init(&cli, *force),
            ConfigAction::Show => config_show(&config),
        },
    }
}

fn resolve(config: &GlintConfig, module: &str, root: Option<PathBuf>) -> Result<()> {
    let modules = &config.modules;
    let path = module_path(&modules.mount_path, modules.bare_extension(), module);
    println!("{}", path.display());

    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let storage = DirStorage::new(modules.mount_path.clone(), root);
    match storage.host_path(&path) {
        Some(host) if storage.exists(&path) => println!("  found at {}", host.display()),
        Some(host) => println!("  missing (looked at {})", host.display()),
        None => println!("  outside the mount point {}", modules.mount_path.display()),
    }
    Ok(())
}

fn run_replay(config: &GlintConfig, trace: &Path) -> Result<()> {
    let text = fs::read_to_string(trace)
        .with_context(|| format!("Failed to read {}", trace.display()))?;
    let mut heap = HeterogeneousAllocator::from_config(&config.allocator);
    let summary = replay::replay(&mut heap, &text)?;
    heap.log_stats("after replay");

    let stats = summary.stats;
    println!("operations:  {}", summary.operations);
    println!("failures:    {}", summary.failures);
    println!("live blocks: {}", summary.live_blocks);
    for kind in [PoolKind::Near, PoolKind::Extended] {
        println!(
            "{:<9} {:>10} live / {:>10} free / {:>10} capacity",
            format!("{}:", kind),
            stats.allocated(kind),
            heap.free_bytes(kind),
            heap.capacity(kind),
        );
    }
    println!(
        "total:    {:>10} live, peak {} (near {}, extended {})",
        stats.total_allocated, stats.peak_total, stats.peak_near, stats.peak_extended
    );
    println!("allocs {} / frees {}", stats.alloc_count, stats.free_count);
    Ok(())
}

fn config_init(cli: &Cli, force: bool) -> Result<()> {
    let path = config_path(cli)?;
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    GlintConfig::default().save_to(&path)?;
    info!("Created config at {}", path.display());
    eprintln!("Config file created at: {}", path.display());
    Ok(())
}

fn config_show(config: &GlintConfig) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
    print!("{}", text);
    Ok(())
}
