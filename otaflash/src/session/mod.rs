//! Upload session: the state machine that drives one firmware flash.
//!
//! ```text
//! Idle -> Connecting -> Resetting -> Syncing -> Starting -> Transferring -> Ending
//!                                                                              |
//!                                              Completed <---------------------+
//!                      (any phase) --error--> Failed
//! ```
//!
//! Exactly one frame is in flight at a time: every frame is followed by a
//! blocking wait for its ack (or timeout) before the next one is built.
//! Only VERIFY is retried. Any other timeout or device error ends the
//! session, and the port is closed on every exit path.
//!
//! ## Example
//!
//! ```rust,no_run
//! use otaflash::{NativePort, NoopObserver, SerialConfig, UploadSession};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfig::new("/dev/ttyUSB0", 2_000_000);
//!     let mut session = UploadSession::<NativePort>::new(config);
//!     let report = session.run_native_file("firmware.bin", &mut NoopObserver)?;
//!     println!("Device says: {}", report.final_message);
//!     Ok(())
//! }
//! ```

mod observer;
mod timings;

pub use observer::{FlashObserver, NoopObserver};
pub use timings::Timings;

use std::fmt;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{error, info, trace, warn};

use crate::error::{Error, Result};
use crate::port::{Port, SerialConfig};
use crate::protocol::constants::CHUNK_SIZE;
use crate::protocol::frame::start_payload;
use crate::protocol::{Ack, AckReceiver, Command, Frame};

/// Session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UploadState {
    /// Not started.
    #[default]
    Idle,
    /// Opening the serial port.
    Connecting,
    /// Pulsing the reset line and waiting for boot.
    Resetting,
    /// Probing the bootloader with VERIFY.
    Syncing,
    /// Announcing the image size with START.
    Starting,
    /// Sending DATA chunks.
    Transferring,
    /// Finishing with END.
    Ending,
    /// The device accepted the image.
    Completed,
    /// The session ended with an error.
    Failed,
}

impl UploadState {
    /// Whether the session can no longer make progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Resetting => "resetting",
            Self::Syncing => "syncing",
            Self::Starting => "starting",
            Self::Transferring => "transferring",
            Self::Ending => "ending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a successful session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashReport {
    /// Image size in bytes.
    pub bytes: usize,
    /// Number of DATA frames acknowledged.
    pub chunks: usize,
    /// Message returned by the device during sync.
    pub device_info: String,
    /// Message returned by the device for END.
    pub final_message: String,
}

/// Read and validate a firmware image.
pub fn load_firmware(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| Error::Firmware {
        path: path.to_path_buf(),
        source,
    })?;
    validate_firmware(&data)?;
    Ok(data)
}

/// Check that an image can be described by a START frame.
pub fn validate_firmware(data: &[u8]) -> Result<u32> {
    if data.is_empty() {
        return Err(Error::EmptyFirmware);
    }
    u32::try_from(data.len()).map_err(|_| Error::FirmwareTooLarge(data.len()))
}

/// One connect-through-disconnect firmware flash attempt.
///
/// Generic over the port type `P` so the same state machine runs against
/// the native serial backend or a simulated device.
pub struct UploadSession<P: Port> {
    config: SerialConfig,
    timings: Timings,
    port: Option<P>,
    state: UploadState,
    offset: usize,
    chunks_acked: usize,
    progress: f64,
}

impl<P: Port> UploadSession<P> {
    /// Create a session for the given serial configuration.
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            timings: Timings::default(),
            port: None,
            state: UploadState::Idle,
            offset: 0,
            chunks_acked: 0,
            progress: 0.0,
        }
    }

    /// Override the phase deadlines and delays.
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Serial configuration of this session.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Bytes of the image acknowledged so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of DATA chunks acknowledged so far.
    pub fn chunks_acked(&self) -> usize {
        self.chunks_acked
    }

    /// Fraction of the image acknowledged so far.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// The port, once opened. Still available (closed) after the session ends.
    pub fn port(&self) -> Option<&P> {
        self.port
            .as_ref()
    }

    /// Consume the session and return the port, if one was opened.
    pub fn into_port(self) -> Option<P> {
        self.port
    }

    /// Flash the image at `path`, opening the port with `open`.
    pub fn run_file<F>(
        &mut self,
        path: impl AsRef<Path>,
        open: F,
        observer: &mut dyn FlashObserver,
    ) -> Result<FlashReport>
    where
        F: FnOnce(&SerialConfig) -> Result<P>,
    {
        if self.state != UploadState::Idle {
            return Err(Error::SessionFinished(self.state.to_string()));
        }
        let firmware = match load_firmware(path) {
            Ok(data) => data,
            Err(e) => return Err(self.fail(e, observer)),
        };
        self.run(&firmware, open, observer)
    }

    /// Flash `firmware`, opening the port with `open`.
    ///
    /// The port is closed before this returns, whatever the outcome.
    pub fn run<F>(
        &mut self,
        firmware: &[u8],
        open: F,
        observer: &mut dyn FlashObserver,
    ) -> Result<FlashReport>
    where
        F: FnOnce(&SerialConfig) -> Result<P>,
    {
        if self.state != UploadState::Idle {
            return Err(Error::SessionFinished(self.state.to_string()));
        }

        let result = self.drive(firmware, open, observer);
        self.disconnect(observer);

        match result {
            Ok(report) => {
                self.set_state(UploadState::Completed, observer);
                Ok(report)
            },
            Err(e) => Err(self.fail(e, observer)),
        }
    }

    fn drive<F>(
        &mut self,
        firmware: &[u8],
        open: F,
        observer: &mut dyn FlashObserver,
    ) -> Result<FlashReport>
    where
        F: FnOnce(&SerialConfig) -> Result<P>,
    {
        let image_size = validate_firmware(firmware)?;

        self.set_state(UploadState::Connecting, observer);
        self.note(
            observer,
            &format!(
                "Connecting to {} @ {}...",
                self.config.port_name, self.config.baud_rate
            ),
        );
        self.port = Some(open(&self.config)?);

        self.set_state(UploadState::Resetting, observer);
        self.note(observer, "Resetting device...");
        let reset = self.timings.reset;
        reset.run(self.port_mut()?)?;
        self.note(observer, "Device ready");

        self.set_state(UploadState::Syncing, observer);
        let device_info = self.sync(observer)?;
        thread::sleep(self.timings.post_sync_delay);

        self.set_state(UploadState::Starting, observer);
        self.start(image_size, observer)?;

        self.set_state(UploadState::Transferring, observer);
        self.transfer(firmware, observer)?;

        self.set_state(UploadState::Ending, observer);
        let final_message = self.end(observer)?;

        Ok(FlashReport {
            bytes: firmware.len(),
            chunks: self.chunks_acked,
            device_info,
            final_message,
        })
    }

    /// Probe the bootloader with VERIFY until it answers.
    fn sync(&mut self, observer: &mut dyn FlashObserver) -> Result<String> {
        self.note(observer, "Syncing with device...");
        let attempts = self.timings.sync_attempts;

        for attempt in 1..=attempts {
            match self.exchange(&Frame::verify(), self.timings.sync_timeout) {
                Ok(ack) if ack.is_success() => {
                    self.note(observer, &format!("Sync OK, device info: {}", ack.message));
                    return Ok(ack.message);
                },
                Ok(ack) => {
                    let line = format!(
                        "Device connected but reported error (status {}): {}",
                        ack.status, ack.message
                    );
                    warn!("{line}");
                    observer.on_log(&line);
                    return Ok(ack.message);
                },
                Err(Error::Timeout(_)) => {
                    let line = format!("Sync attempt {attempt}/{attempts} timed out");
                    warn!("{line}");
                    observer.on_log(&line);
                    if attempt < attempts {
                        thread::sleep(self.timings.sync_backoff);
                    }
                },
                Err(e) => return Err(e),
            }
        }

        Err(Error::SyncFailed { attempts })
    }

    fn start(&mut self, image_size: u32, observer: &mut dyn FlashObserver) -> Result<()> {
        self.note(observer, &format!("Firmware size: {image_size} bytes"));
        self.note(observer, "Sending START...");

        let payload = start_payload(image_size);
        let ack = self.exchange_checked(
            &Frame::new(Command::Start, &payload),
            self.timings.start_timeout,
        )?;
        self.note(observer, &format!("START OK: {}", ack.message));
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn transfer(&mut self, firmware: &[u8], observer: &mut dyn FlashObserver) -> Result<()> {
        let total = firmware.len();
        let chunk_count = total.div_ceil(CHUNK_SIZE);
        self.note(
            observer,
            &format!("Sending {chunk_count} chunks of up to {CHUNK_SIZE} bytes..."),
        );

        for (index, chunk) in firmware
            .chunks(CHUNK_SIZE)
            .enumerate()
        {
            let ack = match self.exchange(&Frame::data(chunk), self.timings.data_timeout) {
                Ok(ack) => ack,
                Err(Error::Timeout(reason)) => {
                    return Err(Error::Timeout(format!("chunk {index}: {reason}")));
                },
                Err(e) => return Err(e),
            };

            if !ack.is_success() {
                return Err(Error::ChunkRejected {
                    index,
                    status: ack.status,
                    message: ack.message,
                });
            }

            self.offset += chunk.len();
            self.chunks_acked += 1;
            self.progress = self.offset as f64 / total as f64;
            trace!("Chunk {index} acked ({}/{total})", self.offset);
            observer.on_progress(self.progress);
        }

        self.note(observer, "Data transfer complete");
        Ok(())
    }

    fn end(&mut self, observer: &mut dyn FlashObserver) -> Result<String> {
        self.note(observer, "Sending END...");
        let ack = self.exchange_checked(&Frame::end(), self.timings.end_timeout)?;
        self.note(
            observer,
            &format!("Update successful, device message: {}", ack.message),
        );
        Ok(ack.message)
    }

    /// Send one frame and wait for its ack.
    fn exchange(&mut self, frame: &Frame<'_>, timeout: Duration) -> Result<Ack> {
        let data = frame.build()?;
        let poll_interval = self.timings.poll_interval;
        let port = self.port_mut()?;

        trace!("Sending {}: {} bytes", frame.command(), data.len());
        port.write_all_bytes(&data)?;

        AckReceiver::with_poll_interval(port, poll_interval).receive(timeout)
    }

    /// Like [`exchange`](Self::exchange), but a non-zero status is an error.
    fn exchange_checked(&mut self, frame: &Frame<'_>, timeout: Duration) -> Result<Ack> {
        let command = frame.command();
        let ack = match self.exchange(frame, timeout) {
            Ok(ack) => ack,
            Err(Error::Timeout(reason)) => {
                return Err(Error::Timeout(format!("{command}: {reason}")));
            },
            Err(e) => return Err(e),
        };

        if ack.is_success() {
            Ok(ack)
        } else {
            Err(Error::Device {
                command,
                status: ack.status,
                message: ack.message,
            })
        }
    }

    fn port_mut(&mut self) -> Result<&mut P> {
        self.port
            .as_mut()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "port not open",
                ))
            })
    }

    fn disconnect(&mut self, observer: &mut dyn FlashObserver) {
        let Some(port) = self.port.as_mut() else {
            return;
        };
        if !port.is_open() {
            return;
        }
        if let Err(e) = port.close() {
            warn!("Failed to close {}: {e}", port.name());
        }
        self.note(observer, "Disconnected");
    }

    fn fail(&mut self, e: Error, observer: &mut dyn FlashObserver) -> Error {
        let line = format!("Flash failed: {e}");
        error!("{line}");
        observer.on_log(&line);
        self.set_state(UploadState::Failed, observer);
        e
    }

    fn set_state(&mut self, state: UploadState, observer: &mut dyn FlashObserver) {
        trace!("State: {} -> {state}", self.state);
        self.state = state;
        observer.on_state(state);
    }

    #[allow(clippy::unused_self)]
    fn note(&self, observer: &mut dyn FlashObserver, line: &str) {
        info!("{line}");
        observer.on_log(line);
    }
}

// Native-specific convenience functions
#[cfg(feature = "native")]
mod native_impl {
    use super::{FlashObserver, FlashReport, Path, Result, UploadSession};
    use crate::port::NativePort;

    impl UploadSession<NativePort> {
        /// Flash `firmware` over the native serial port named in the config.
        pub fn run_native(
            &mut self,
            firmware: &[u8],
            observer: &mut dyn FlashObserver,
        ) -> Result<FlashReport> {
            self.run(firmware, NativePort::open, observer)
        }

        /// Flash the image at `path` over the native serial port.
        pub fn run_native_file(
            &mut self,
            path: impl AsRef<Path>,
            observer: &mut dyn FlashObserver,
        ) -> Result<FlashReport> {
            self.run_file(path, NativePort::open, observer)
        }
    }
}
