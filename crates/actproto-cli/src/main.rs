mod cmd;
mod config_path;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, parse::ModeArg};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "actproto",
    about = "Normalize, repair, and parse LLM action-protocol output",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest .actproto.yaml, else built-in defaults)
    #[arg(long, global = true, env = "ACTPROTO_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log pipeline stages to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse model output into thoughts, vitals, and actions
    Parse {
        /// Input file ("-" or omitted reads stdin)
        file: Option<PathBuf>,
        /// Parser to run after repair
        #[arg(long, value_enum, default_value = "auto")]
        mode: ModeArg,
    },

    /// Print the text after conversion, preprocessing, and repair
    Repair {
        /// Input file ("-" or omitted reads stdin)
        file: Option<PathBuf>,
    },

    /// Re-serialize parsed output in canonical protocol form
    Normalize {
        /// Input file ("-" or omitted reads stdin)
        file: Option<PathBuf>,
    },

    /// Show, validate, or create the protocol config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let explicit = cli.config.as_deref();
    let result = match cli.command {
        Commands::Parse { file, mode } => {
            cmd::parse::run(explicit, file.as_deref(), mode, cli.json)
        }
        Commands::Repair { file } => cmd::repair::run(explicit, file.as_deref(), cli.json),
        Commands::Normalize { file } => cmd::normalize::run(explicit, file.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(explicit, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
