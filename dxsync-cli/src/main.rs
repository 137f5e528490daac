//! dxsync: local sync state for content service artifacts.
//!
//! # Usage
//!
//! ```text
//! dxsync status [--dir <path>] [--tenant <id>] [--new | --modified] [--json]
//! dxsync manifest show <name> [--dir <path>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{manifest::ManifestCommand, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dxsync",
    version,
    about = "Inspect the local sync state of a content working directory",
    long_about = None,
)]
struct Cli {
    /// Log progress at info level (`RUST_LOG` overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report local files the hash cache considers new or modified.
    Status(StatusArgs),

    /// Inspect manifests.
    Manifest {
        #[command(subcommand)]
        command: ManifestCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Status(args) => args.run(),
        Commands::Manifest { command } => commands::manifest::run(command),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
