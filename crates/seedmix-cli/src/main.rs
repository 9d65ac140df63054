//! CLI for seedmix: random bytes from several entropy collectors.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use seedmix_core::{Config, Orchestrator};

#[derive(Parser)]
#[command(name = "seedmix")]
#[command(about = "seedmix: mix unreliable entropy collectors into a ratcheting ChaCha keystream")]
#[command(version = seedmix_core::VERSION)]
struct Cli {
    /// JSON configuration file (defaults apply to missing keys)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print bytes from the shared generator
    Bytes {
        /// Number of bytes
        #[arg(default_value = "32")]
        count: usize,

        /// Output format
        #[arg(long, default_value = "hex", value_parser = ["hex", "raw"])]
        format: String,
    },

    /// Draw integers in an inclusive range
    Int {
        /// Lower bound (inclusive)
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        min: i32,

        /// Upper bound (inclusive)
        #[arg(long, default_value = "99", allow_negative_numbers = true)]
        max: i32,

        /// How many integers to draw
        #[arg(long, short = 'n', default_value = "1")]
        count: usize,
    },

    /// Population-count sanity run over raw mixer output
    Mix {
        /// Number of samples
        #[arg(long, default_value = "100")]
        trials: usize,

        /// Bytes per sample
        #[arg(long, default_value = "1024")]
        len: usize,
    },

    /// Run the statistical battery over generator output
    Check {
        /// Bytes to test
        #[arg(long, default_value = "65536")]
        bytes: usize,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the default collectors and their health
    Collectors {
        /// Bytes to draw through the mixer before reporting
        #[arg(long, default_value = "256")]
        probe: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = load_config(cli.config.as_deref()).and_then(|config| {
        let orchestrator = Orchestrator::new(config);
        let outcome = match cli.command {
            Commands::Bytes { count, format } => {
                commands::bytes::run(&orchestrator, count, &format).map(|()| true)
            }
            Commands::Int { min, max, count } => {
                commands::int::run(&orchestrator, min, max, count).map(|()| true)
            }
            Commands::Mix { trials, len } => commands::mix::run(&orchestrator, trials, len),
            Commands::Check { bytes, json } => commands::check::run(&orchestrator, bytes, json),
            Commands::Collectors { probe } => {
                commands::collectors::run(&orchestrator, probe).map(|()| true)
            }
        };
        orchestrator.close();
        outcome
    });

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> seedmix_core::Result<Config> {
    match path {
        Some(path) => Config::from_json_file(path),
        None => Ok(Config::default()),
    }
}
