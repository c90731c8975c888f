//! Wire-level protocol constants shared by the frame codec and the session.

/// Magic marker at the start of every host-to-device frame.
pub const FRAME_MAGIC: u16 = 0xABCD;

/// Magic marker at the start of every device-to-host acknowledgement.
pub const ACK_MAGIC: u16 = 0xAA55;

/// Acknowledgement magic as it appears on the wire.
pub const ACK_MAGIC_BYTES: [u8; 2] = ACK_MAGIC.to_be_bytes();

/// Width of the zero-filled reserved field in a frame header.
pub const RESERVED_LEN: usize = 9;

/// Frame header size: magic(2) + command(1) + length(2) + reserved(9).
pub const FRAME_HEADER_LEN: usize = 2 + 1 + 2 + RESERVED_LEN;

/// Ack header size: magic(2) + status(1) + message length(1).
pub const ACK_HEADER_LEN: usize = 4;

/// Trailing checksum size for frames and acks.
pub const CRC_LEN: usize = 2;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Firmware bytes carried by one DATA frame.
pub const CHUNK_SIZE: usize = 4096;

/// Ack status reported by the device on success.
pub const STATUS_OK: u8 = 0;

/// Default baud rate of the OTA bootloader.
pub const DEFAULT_BAUD: u32 = 2_000_000;
