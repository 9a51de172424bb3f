//! # Release Harness CLI (`release-harness`)
//!
//! Builds the consolidated package/release dataset in one pass.
//!
//! ## Usage
//!
//! ```bash
//! release-harness --config ./config/releases.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `release-harness run` | Collect, enrich and write the dataset |
//! | `release-harness sources` | Show upstream endpoints and token status |
//! | `release-harness overrides` | List the manual source overrides |
//!
//! ## Examples
//!
//! ```bash
//! # Curated run (Brewfiles + Homebrew + OS releases)
//! GITHUB_TOKEN=... release-harness run
//!
//! # Flathub's recently updated apps, written elsewhere
//! release-harness run --mode recent --output /tmp/apps.json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use release_harness::config;
use release_harness::logging;
use release_harness::pipeline::{self, RunMode};
use release_harness::sources;

/// Release Harness: aggregates Flatpak, Homebrew and OS release metadata
/// and enriches it with upstream changelogs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(name = "release-harness", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/releases.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect all catalogs, enrich with releases and write the dataset.
    ///
    /// Prints a one-line JSON summary to stdout; logs go to stderr.
    Run {
        /// Which catalogs to consult.
        #[arg(long, value_enum, default_value = "curated")]
        mode: RunMode,

        /// Output file; defaults to `[output] path`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show configured upstreams and whether tokens are present.
    Sources,

    /// List the manual source-repository overrides.
    Overrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Run { mode, output } => {
            pipeline::run(&cfg, mode, output.as_deref()).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Overrides => {
            sources::list_overrides(&cfg)?;
        }
    }

    Ok(())
}
