//! Wayfinder session CLI.
//!
//! Provides the `wayfinder` binary, which replays a JSON session script
//! against a fresh dataflow and prints the resulting layout window.
//! Logging goes to stderr and is controlled by the `WAYFINDER_LOG`
//! environment variable (an `EnvFilter` directive, default `warn`).

mod render;
mod script;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use wayfinder_core::Layout;

use crate::script::Script;

/// Replay dataflow sessions and inspect their layout windows.
#[derive(Parser)]
#[command(name = "wayfinder", about = "Replay dataflow sessions and inspect their layout windows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Replay a session script and print the final window.
    Run {
        /// Path to the session script (JSON).
        script: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Log every model operation to stderr.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Replay a session script and print only the final path.
    Check {
        /// Path to the session script (JSON).
        script: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Run {
            script,
            format,
            verbose,
        } => {
            init_tracing(verbose);
            run(&script, format)
        }
        Commands::Check { script } => {
            init_tracing(false);
            run_check(&script)
        }
    };
    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("WAYFINDER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 = success, 1 = script could not be read or parsed,
/// 2 = the model rejected an operation.
fn run(path: &Path, format: Format) -> i32 {
    let layout = match replay(path) {
        Ok(layout) => layout,
        Err(code) => return code,
    };

    match format {
        Format::Text => println!("{}", render::text(&layout)),
        Format::Json => match render::json(&layout) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize window: {}", e);
                return 1;
            }
        },
    }
    0
}

/// Execute the check subcommand. Exit codes as for `run`.
fn run_check(path: &Path) -> i32 {
    match replay(path) {
        Ok(layout) => {
            println!("{}", render::steps(layout.dataflow().path()));
            0
        }
        Err(code) => code,
    }
}

fn replay(path: &Path) -> Result<Layout<String>, i32> {
    let result = Script::load(path).and_then(|script| {
        debug!(script = %path.display(), steps = script.steps.len(), "replaying session");
        script.replay()
    });
    result.map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code()
    })
}
