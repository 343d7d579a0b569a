#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use modwire_core::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "modwire")]
#[command(author, version, about = "Resolve module manifests into wirings", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Declare the modules of a manifest and resolve its batch
    Resolve {
        /// Path to the manifest (JSON)
        manifest: PathBuf,
    },

    /// Resolve a manifest, then look up one package dynamically
    Dynamic {
        /// Path to the manifest (JSON)
        manifest: PathBuf,

        /// Symbolic name of the module doing the lookup
        #[arg(long)]
        module: String,

        /// Package to look up
        #[arg(long)]
        package: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Resolve { manifest }) => {
            let span = tracing::info_span!("resolve", cmd = "resolve", manifest = %manifest.display());
            let _guard = span.enter();
            commands::resolve::run(&config, &manifest, cli.json)
        }
        Some(Commands::Dynamic {
            manifest,
            module,
            package,
        }) => {
            let span = tracing::info_span!("dynamic", cmd = "dynamic", module = %module, package = %package);
            let _guard = span.enter();
            commands::dynamic::run(&config, &manifest, &module, &package, cli.json)
        }
    }
}
