//! revcryptfs - Encrypted view of a plaintext directory
//!
//! Usage:
//!   revcryptfs mount <backing_dir> <mount_point>  - Mount the reverse view
//!   revcryptfs size <bytes>                       - Show the presented size of a plaintext size
//!   revcryptfs show-config                        - Print the effective configuration

use anyhow::Context;
use clap::{Parser, Subcommand};
use revcryptfs::{
    config::{MountConfig, Owner},
    crypto::ContentSizing,
    fs::{Mount, ReverseFs},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "revcryptfs")]
#[command(version)]
#[command(about = "Encrypted view of a plaintext directory tree")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/revcryptfs/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the encrypted view of a plaintext directory
    Mount {
        /// Plaintext directory to present
        backing_dir: PathBuf,

        /// Mount point directory
        mount_point: PathBuf,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,

        /// Report every entry as owned by uid:gid
        #[arg(long)]
        force_owner: Option<Owner>,
    },

    /// Print the size a plaintext file of the given length is presented with
    Size {
        /// Plaintext size in bytes
        bytes: u64,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let config_path = expand_tilde(&cli.config);

    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Mount {
            backing_dir,
            mount_point,
            allow_other,
            force_owner,
        } => cmd_mount(config_path, &backing_dir, &mount_point, allow_other, force_owner),

        Commands::Size { bytes } => {
            let sizing = ContentSizing::from_config(&base_config(config_path, None)?);
            println!("{}", sizing.plain_to_cipher(bytes));
            Ok(())
        }

        Commands::ShowConfig => {
            let config = base_config(config_path, None)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Config file if present, defaults otherwise
fn base_config(config_path: &Path, backing_dir: Option<&Path>) -> anyhow::Result<MountConfig> {
    let mut config = if config_path.exists() {
        MountConfig::load(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        MountConfig::from_overrides(|key| std::env::var(key).ok())?
    };
    if let Some(dir) = backing_dir {
        config.backing_dir = dir.to_path_buf();
    }
    Ok(config)
}

fn cmd_mount(
    config_path: &Path,
    backing_dir: &Path,
    mount_point: &Path,
    allow_other: bool,
    force_owner: Option<Owner>,
) -> anyhow::Result<()> {
    let backing_dir = backing_dir
        .canonicalize()
        .with_context(|| format!("resolving {}", backing_dir.display()))?;

    let mut config = base_config(config_path, Some(&backing_dir))?;
    config.allow_other |= allow_other;
    if force_owner.is_some() {
        config.force_owner = force_owner;
    }
    config.validate()?;

    let mount = Mount::new(config).context("opening backing directory")?;

    info!(
        "Mounting reverse view of {} at {}",
        backing_dir.display(),
        mount_point.display()
    );
    ReverseFs::new(Arc::new(mount))
        .mount(mount_point)
        .with_context(|| format!("mounting at {}", mount_point.display()))?;

    info!("Unmounted {}", mount_point.display());
    Ok(())
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
