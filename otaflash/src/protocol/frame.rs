//! Host-to-device command frames.
//!
//! ## Frame Format
//!
//! ```text
//! +--------+-----+--------+----------+-----------+--------+
//! | Magic  | Cmd | Length | Reserved |  Payload  | CRC16  |
//! +--------+-----+--------+----------+-----------+--------+
//! | 2 bytes| 1   | 2 bytes| 9 bytes  |  Length   | 2 bytes|
//! +--------+-----+--------+----------+-----------+--------+
//! | 0xABCD | cmd |  BE16  |  zeros   |   data    |  BE16  |
//! +--------+-----+--------+----------+-----------+--------+
//! ```
//!
//! The CRC covers every byte before it, header included.

use std::fmt;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::protocol::constants::{
    CRC_LEN, FRAME_HEADER_LEN, FRAME_MAGIC, MAX_PAYLOAD_LEN, RESERVED_LEN,
};
use crate::protocol::crc::crc16_xmodem;

/// OTA command codes (frame command field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Command {
    /// Begin an update; payload is the 4-byte big-endian image size.
    Start = 0x01,
    /// One firmware chunk.
    Data = 0x02,
    /// Finish the update.
    End = 0x03,
    /// Liveness probe used to sync with the bootloader.
    Verify = 0x04,
}

impl Command {
    /// Wire value of the command.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Start),
            0x02 => Some(Self::Data),
            0x03 => Some(Self::End),
            0x04 => Some(Self::Verify),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "START"),
            Self::Data => write!(f, "DATA"),
            Self::End => write!(f, "END"),
            Self::Verify => write!(f, "VERIFY"),
        }
    }
}

/// Command frame builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    command: Command,
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Create a frame with an arbitrary payload.
    pub fn new(command: Command, payload: &'a [u8]) -> Self {
        Self { command, payload }
    }

    /// Build a VERIFY frame (no payload).
    pub fn verify() -> Self {
        Self::new(Command::Verify, &[])
    }

    /// Build a DATA frame carrying one chunk.
    pub fn data(chunk: &'a [u8]) -> Self {
        Self::new(Command::Data, chunk)
    }

    /// Build an END frame (no payload).
    pub fn end() -> Self {
        Self::new(Command::End, &[])
    }

    /// Get the command type.
    pub fn command(&self) -> Command {
        self.command
    }

    /// Get the payload.
    pub fn payload(&self) -> &[u8] {
        self.payload
    }

    /// Encoded length of the frame in bytes.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len() + CRC_LEN
    }

    /// Build the complete frame data.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn build(&self) -> Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge(self.payload.len()));
        }

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.write_u16::<BigEndian>(FRAME_MAGIC).unwrap();
        buf.push(self.command.code());
        // Checked above: fits in 16 bits
        buf.write_u16::<BigEndian>(self.payload.len() as u16)
            .unwrap();
        buf.extend_from_slice(&[0u8; RESERVED_LEN]);
        buf.extend_from_slice(self.payload);

        let crc = crc16_xmodem(&buf);
        buf.write_u16::<BigEndian>(crc).unwrap();

        Ok(buf)
    }
}

/// Build the payload of a START frame.
pub fn start_payload(image_size: u32) -> [u8; 4] {
    image_size.to_be_bytes()
}

/// Encode `command` with `payload` into wire bytes.
pub fn encode(command: Command, payload: &[u8]) -> Result<Vec<u8>> {
    Frame::new(command, payload).build()
}
