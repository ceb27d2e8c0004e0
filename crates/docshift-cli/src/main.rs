use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// docshift: apply versioned migration plans to JSON documents.
///
/// Documents are read from files (or stdin when none are given). A file may
/// hold a single JSON object or an array of objects.
#[derive(Parser)]
#[command(name = "docshift", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate documents and print the result.
    Migrate {
        /// Path to the TOML migration plan.
        #[arg(short, long)]
        plan: String,

        /// Target version. Defaults to the latest version in the plan.
        #[arg(long)]
        to: Option<u32>,

        /// Write migrated documents back to their files instead of stdout.
        #[arg(long)]
        in_place: bool,

        /// Document files. Reads stdin if omitted.
        files: Vec<String>,
    },

    /// Show each document's version and whether it needs migration.
    Status {
        /// Path to the TOML migration plan.
        #[arg(short, long)]
        plan: String,

        /// Document files. Reads stdin if omitted.
        files: Vec<String>,
    },

    /// List the steps of a plan in application order.
    Steps {
        /// Path to the TOML migration plan.
        #[arg(short, long)]
        plan: String,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("global tracing subscriber already initialized");
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Migrate {
            plan,
            to,
            in_place,
            files,
        } => commands::migrate(&plan, to, in_place, &files),
        Commands::Status { plan, files } => commands::status(&plan, &files),
        Commands::Steps { plan } => commands::steps(&plan),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
