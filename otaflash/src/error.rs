//! Error types for otaflash.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::Command;

/// Result type for otaflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for otaflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the serial transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The serial device could not be opened or configured.
    #[error("Port open error on {port}: {reason}")]
    PortOpen {
        /// Device path that failed to open.
        port: String,
        /// Underlying failure description.
        reason: String,
    },

    /// The firmware image could not be read.
    #[error("Cannot read firmware {}: {source}", path.display())]
    Firmware {
        /// Firmware path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The firmware image has no content.
    #[error("Firmware image is empty")]
    EmptyFirmware,

    /// The firmware image does not fit the 32-bit size field of START.
    #[error("Firmware image too large: {0} bytes")]
    FirmwareTooLarge(usize),

    /// A frame payload exceeds the 16-bit length field.
    #[error("Payload too large: {0} bytes (max 65535)")]
    PayloadTooLarge(usize),

    /// No valid acknowledgement arrived before the deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Every sync attempt timed out.
    #[error("Sync failed after {attempts} attempts")]
    SyncFailed {
        /// Number of VERIFY frames sent.
        attempts: usize,
    },

    /// The device acknowledged a command with a non-zero status.
    #[error("{command} rejected by device (status {status}): {message}")]
    Device {
        /// Command that was rejected.
        command: Command,
        /// Device status code.
        status: u8,
        /// Device-supplied message.
        message: String,
    },

    /// The device rejected a DATA chunk.
    #[error("Chunk {index} rejected by device (status {status}): {message}")]
    ChunkRejected {
        /// Zero-based index of the failing chunk.
        index: usize,
        /// Device status code.
        status: u8,
        /// Device-supplied message.
        message: String,
    },

    /// The session already ran; retries need a new session.
    #[error("Upload session already finished ({0})")]
    SessionFinished(String),

    /// No suitable serial port was found.
    #[error("No serial port found")]
    DeviceNotFound,

    /// Operation not available on this build.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Message reported by the device, when the error carries one.
    pub fn device_message(&self) -> Option<&str> {
        match self {
            Self::Device { message, .. } | Self::ChunkRejected { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether this error is an acknowledgement timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
