//! Fault tracker CLI - report faults from scripts and jobs to a collector.

mod commands;
mod error;
mod logging;
mod paths;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::CaptureArgs;
use logging::{init_logging, LogFormat};
use paths::Paths;

/// Fault tracker command-line interface.
#[derive(Parser)]
#[command(name = "fault-tracker")]
#[command(about = "Capture faults and deliver them to a collector endpoint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Base directory for the config and durable queue. Defaults to ~/.fault-tracker
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Tracker options file (JSON). Defaults to <base-dir>/config.json when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Collector endpoint, overriding the config file
    #[arg(long, env = "FAULT_TRACKER_REPORT_URL", global = true)]
    report_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture one fault and deliver it
    Capture {
        /// Fault message
        message: String,
        /// Stack trace or other detail
        #[arg(long)]
        stack: Option<String>,
        /// Source file the fault refers to
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        line: Option<u32>,
        #[arg(long)]
        column: Option<u32>,
        /// Fault kind (runtime, resource, rejection, manual)
        #[arg(long)]
        kind: Option<String>,
        /// Extra structured data as JSON
        #[arg(long)]
        extra: Option<String>,
    },
    /// Deliver the persisted queue
    Flush,
    /// Print the persisted queue as JSON
    Queue,
    /// Capture each line of stdin as a fault until EOF
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };

    let options = || commands::load_options(&paths, cli.config.as_deref(), cli.report_url.clone());

    let delivered = match cli.command {
        Commands::Capture {
            message,
            stack,
            file,
            line,
            column,
            kind,
            extra,
        } => {
            let args = CaptureArgs {
                message,
                stack,
                file,
                line,
                column,
                kind,
                extra,
            };
            commands::capture(&paths, options()?, args).await?
        }
        Commands::Flush => commands::flush(&paths, options()?).await?,
        Commands::Queue => {
            commands::queue(&paths)?;
            true
        }
        Commands::Watch => commands::watch(&paths, options()?).await?,
    };

    Ok(if delivered {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
