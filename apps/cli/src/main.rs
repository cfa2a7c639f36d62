//! SimpleToolkit CLI - headless front-end for the download core
//!
//! Downloads disk images with live progress, lists the remote catalog and
//! manages the preference file.

mod commands;
mod output;
mod progress;
mod prompt;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use simplekit_core::{CoreConfig, DirectoryPicker, PresetPicker, SavePathPicker, SimpleToolkit};
use simplekit_types::default_download_dir;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// SimpleToolkit - disk image downloads and settings
#[derive(Parser)]
#[command(name = "simplekit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Preference file location
    #[arg(long, env = "SIMPLEKIT_PREFS")]
    prefs_file: Option<PathBuf>,

    /// Image catalog endpoint
    #[arg(long, env = "SIMPLEKIT_CATALOG_URL")]
    catalog_url: Option<String>,

    /// Output format
    #[arg(long, default_value = "human")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one or more images concurrently
    Download {
        /// URLs to download
        #[arg(required = true)]
        urls: Vec<String>,

        /// Save to this path (single URL only)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Accept the suggested file name in the download directory
        #[arg(short, long)]
        yes: bool,

        /// Download directory
        #[arg(long, env = "SIMPLEKIT_DOWNLOAD_DIR")]
        dir: Option<PathBuf>,
    },

    /// List images offered by the catalog
    Catalog,

    /// Show/update preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsAction>,
    },

    /// Check whether a location accepts writes
    Verify {
        /// File or directory path
        path: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Show all preferences
    Show,

    /// Get a preference value
    Get {
        /// Preference key, e.g. themeMode
        key: String,
    },

    /// Set a preference value
    Set {
        /// Preference key, e.g. themeMode or radioGroups.region
        key: String,

        /// New value (parsed as JSON when possible)
        value: String,
    },

    /// Reset to defaults
    Reset,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = CoreConfig::default();
    if let Some(path) = cli.prefs_file {
        config.preferences_path = absolute(&path)?;
    }
    if let Some(url) = cli.catalog_url {
        config.catalog_url = url;
    }

    let ok = match cli.command {
        Commands::Download {
            urls,
            output,
            yes,
            dir,
        } => {
            let download_dir = match dir {
                Some(dir) => absolute(&dir)?,
                None => default_download_dir(),
            };
            config.allowed_roots = vec![download_dir.clone()];

            let picker: Arc<dyn SavePathPicker> = match output {
                Some(_) if urls.len() > 1 => bail!("--output can only be used with a single URL"),
                Some(path) => Arc::new(PresetPicker(absolute(&path)?)),
                None if yes => Arc::new(DirectoryPicker(download_dir)),
                None => Arc::new(prompt::PromptPicker::new(download_dir)),
            };

            let toolkit = SimpleToolkit::new(&config, picker)?;
            commands::download(&toolkit, &urls, cli.format).await?
        }

        Commands::Catalog => {
            let toolkit = SimpleToolkit::new(&config, Arc::new(simplekit_core::NoPicker))?;
            commands::catalog(&toolkit, cli.format).await?
        }

        Commands::Prefs { action } => {
            let toolkit = SimpleToolkit::new(&config, Arc::new(simplekit_core::NoPicker))?;
            commands::prefs_action(&toolkit, action, cli.format).await?
        }

        Commands::Verify { path } => {
            let toolkit = SimpleToolkit::new(&config, Arc::new(simplekit_core::NoPicker))?;
            commands::verify(&toolkit, &absolute(&path)?, cli.format).await?
        }

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "simplekit", &mut std::io::stdout());
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
