//! Veriframe CLI - Batch image verification tool.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod commands;
mod exit_codes;
mod utils;

use commands::verify::VerifyArgs;
use exit_codes::{ExitCode, SUCCESS, USAGE_ERROR};

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   All images verified
  1   Batch failed or was cancelled
  64  Usage error (bad arguments, blank or duplicate image ids)
  65  Some images could not be verified
  66  Id file unreadable, or job not found
  69  Ledger, detection service or server unavailable";

#[derive(Parser)]
#[command(name = "veriframe")]
#[command(author, version, about = "Batch image verification against an integrity ledger", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a batch of images and print a per-image report
    Verify(VerifyArgs),

    /// Show a job held by a running veriframe server
    Status {
        /// Job id
        #[arg(value_name = "JOB_ID")]
        job_id: Uuid,

        /// Server base URL
        #[arg(
            long,
            env = "VERIFRAME_SERVER_URL",
            default_value = "http://127.0.0.1:3000",
            value_name = "URL"
        )]
        server: String,

        /// Print the job record as JSON instead of a report
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "veriframe=info,veriframe_core=info",
        _ => "veriframe=debug,veriframe_core=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Verify(args) => commands::verify::execute(args).await,
        Commands::Status {
            job_id,
            server,
            json,
        } => commands::status::execute(job_id, server, json).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { USAGE_ERROR } else { SUCCESS };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = exit.message {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}
