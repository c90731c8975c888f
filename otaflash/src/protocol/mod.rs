//! OTA bootloader protocol implementation.
//!
//! The host talks to the device in strict request/response pairs: every
//! [`Frame`] sent is answered by exactly one [`Ack`] (or a timeout).

pub mod ack;
pub mod constants;
pub mod crc;
pub mod frame;

// Re-export common types
pub use ack::{Ack, AckBuffer, AckReceiver};
pub use frame::{Command, Frame};
