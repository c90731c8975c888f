//! otaflash CLI - Command-line tool for pushing firmware over serial.
//!
//! ## Features
//!
//! - Flash a raw firmware image through the OTA bootloader protocol
//! - Serial port auto-detection by USB bridge type
//! - Configuration file and environment variable support
//! - Shell completion generation

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use env_logger::Env;
use log::debug;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal with colors enabled.
pub(crate) fn use_fancy_output() -> bool {
    console::Term::stderr().is_term() && console::colors_enabled_stderr()
}

/// CLI-specific failures.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// No port given and none could be detected.
    #[error("No serial port found. Connect a device or pass --port.")]
    NoPort,
}

/// otaflash - Push firmware to a microcontroller running an OTA bootloader.
///
/// Environment variables:
///   OTAFLASH_PORT   - Default serial port
///   OTAFLASH_BAUD   - Default baud rate (default: 2000000)
#[derive(Parser)]
#[command(name = "otaflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "OTAFLASH_PORT")]
    pub port: Option<String>,

    /// Baud rate for the transfer.
    #[arg(short, long, global = true, env = "OTAFLASH_BAUD")]
    pub baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Flash a firmware image.
    Flash {
        /// Path to the firmware binary.
        firmware: PathBuf,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Default log filter for the given verbosity.
///
/// Upload session records already reach the terminal through the flash
/// observer, so they stay hidden unless `-v` is given.
fn log_filter(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn,otaflash::session=off",
        1 => "debug",
        _ => "trace",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if std::env::var_os("NO_COLOR").is_some() || !console::Term::stderr().is_term() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let default_filter = log_filter(cli.quiet, cli.verbose);
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "otaflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash { firmware } => {
            commands::flash::cmd_flash(&cli, &config, firmware)?;
        },
        Commands::ListPorts { json } => {
            commands::ports::cmd_list_ports(*json)?;
        },
        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "otaflash", &mut io::stdout());
        },
    }

    Ok(())
}
