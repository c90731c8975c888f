//! Flash command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use otaflash::protocol::constants::DEFAULT_BAUD;
use otaflash::{FlashObserver, NativePort, SerialConfig, UploadSession, UploadState};
use std::path::Path;

use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output};

/// Terminal observer: status lines on stderr and a progress bar while
/// chunks are being sent.
struct CliObserver {
    quiet: bool,
    fancy: bool,
    bar: Option<ProgressBar>,
}

impl CliObserver {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            fancy: use_fancy_output(),
            bar: None,
        }
    }

    fn new_bar(&self) -> ProgressBar {
        if self.quiet || !self.fancy {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb
    }
}

impl FlashObserver for CliObserver {
    fn on_log(&mut self, line: &str) {
        if self.quiet {
            return;
        }
        let print = || eprintln!("{} {line}", style("›").cyan());
        match &self.bar {
            Some(bar) => bar.suspend(print),
            None => print(),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn on_progress(&mut self, fraction: f64) {
        if let Some(bar) = &self.bar {
            bar.set_position((fraction * 100.0).round() as u64);
        }
    }

    fn on_state(&mut self, state: UploadState) {
        match state {
            UploadState::Transferring => {
                let bar = self.new_bar();
                bar.set_message("sending");
                self.bar = Some(bar);
            },
            UploadState::Ending | UploadState::Failed => {
                if let Some(bar) = self.bar.take() {
                    bar.abandon();
                }
            },
            _ => {},
        }
    }
}

/// Resolve the serial port: CLI/env, then config, then auto-detection.
fn resolve_port(cli: &Cli, config: &Config) -> Result<String> {
    if let Some(port) = cli
        .port
        .clone()
        .or_else(|| config.connection.serial.clone())
    {
        return Ok(port);
    }

    let detected = otaflash::auto_detect_port().map_err(|_| CliError::NoPort)?;
    if !cli.quiet {
        eprintln!(
            "{} Auto-detected {}",
            style("🔍").cyan(),
            detected.describe()
        );
    }
    Ok(detected.name)
}

/// Resolve the baud rate: CLI/env, then config, then the bootloader default.
fn resolve_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.connection.baud)
        .unwrap_or(DEFAULT_BAUD)
}

/// Flash command implementation.
pub(crate) fn cmd_flash(cli: &Cli, config: &Config, firmware: &Path) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("📦").cyan(),
            firmware.display()
        );
    }

    let image = otaflash::load_firmware(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} Firmware size: {} bytes",
            style("ℹ").blue(),
            image.len()
        );
    }

    let port = resolve_port(cli, config)?;
    let baud = resolve_baud(cli, config);
    if !cli.quiet {
        eprintln!("{} Using {port} @ {baud}", style("🔌").cyan());
    }

    let mut observer = CliObserver::new(cli.quiet);
    let mut session = UploadSession::<NativePort>::new(SerialConfig::new(port, baud));
    let report = session
        .run_native(&image, &mut observer)
        .with_context(|| format!("Flashing failed ({} state)", session.state()))?;

    if !cli.quiet {
        eprintln!(
            "\n{} Flashed {} bytes in {} chunks: {}",
            style("🎉").green().bold(),
            report.bytes,
            report.chunks,
            report.final_message
        );
    }

    Ok(())
}
