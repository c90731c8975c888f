//! # otaflash
//!
//! Host-side driver for a framed, acknowledged serial firmware upload
//! protocol spoken by small OTA bootloaders.
//!
//! This crate provides:
//!
//! - CRC16-XMODEM checksum calculation
//! - Command frame encoding (START, DATA, END, VERIFY)
//! - Acknowledgement scanning with resynchronization on noisy lines
//! - Control-line (DTR/RTS) reset sequencing
//! - The upload state machine: connect, reset, sync, start, transfer, end
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use otaflash::{FlashObserver, NativePort, SerialConfig, UploadSession};
//!
//! struct Printer;
//!
//! impl FlashObserver for Printer {
//!     fn on_log(&mut self, line: &str) {
//!         println!("{line}");
//!     }
//!
//!     fn on_progress(&mut self, fraction: f64) {
//!         println!("{:.0}%", fraction * 100.0);
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfig::new("/dev/ttyUSB0", 2_000_000);
//!     let mut session = UploadSession::<NativePort>::new(config);
//!     session.run_native_file("firmware.bin", &mut Printer)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod port;
pub mod protocol;
pub mod reset;
pub mod session;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    device::{DetectedPort, DeviceKind, auto_detect_port, detect_ports, select_port},
    error::{Error, Result},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{Ack, AckBuffer, AckReceiver, Command, Frame, crc::crc16_xmodem},
    reset::ResetSequence,
    session::{
        FlashObserver, FlashReport, NoopObserver, Timings, UploadSession, UploadState,
        load_firmware,
    },
};
