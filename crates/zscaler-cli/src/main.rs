use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};

mod commands;

use commands::check::OutputFormat;

#[derive(Parser)]
#[command(
    name = "zscaler",
    about = "zScaler — a simple yet flexible scaler",
    long_about = "A simple and flexible scaler for various orchestrators.\n\
                  Reads metric probes described in zscaler.toml.",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Activate debug output
    #[arg(short, long, global = true)]
    debug: bool,
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "zscaler.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read every configured probe once and print its value
    Check {
        /// Only read the probe with this id (repeatable)
        #[arg(short, long = "probe")]
        probes: Vec<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Report failed reads as -1 instead of failing
        #[arg(long)]
        sentinel: bool,
    },
    /// Print the effective configuration
    DumpConfig,
    /// Display version number
    Version,
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    let default = if debug {
        "info,zscaler=debug,zscaler_probe=debug,zscaler_config=debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.debug)?;

    match cli.command {
        Some(Commands::Check {
            probes,
            format,
            sentinel,
        }) => commands::check::run(&cli.config, &probes, format, sentinel).await,
        Some(Commands::DumpConfig) => {
            commands::dump_config::run(&cli.config)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Version) => {
            println!("zScaler {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        None => {
            Cli::command().print_help()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
