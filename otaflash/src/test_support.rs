//! In-memory port and device simulation for unit tests.

use std::collections::VecDeque;
use std::io::{Read, Write};

use crate::error::Result;
use crate::port::Port;
use crate::protocol::Command;
use crate::protocol::constants::{ACK_HEADER_LEN, ACK_MAGIC_BYTES, CRC_LEN, FRAME_HEADER_LEN};
use crate::protocol::crc::crc16_xmodem;

type Responder = Box<dyn FnMut(Command, &[u8]) -> Option<Vec<u8>> + Send>;

/// Encode an ack as the device would send it.
///
/// Messages longer than 255 bytes are truncated to fit the length field.
pub(crate) fn encode_ack(status: u8, message: &[u8]) -> Vec<u8> {
    let message = &message[..message.len().min(usize::from(u8::MAX))];
    let mut buf = Vec::with_capacity(ACK_HEADER_LEN + message.len() + CRC_LEN);
    buf.extend_from_slice(&ACK_MAGIC_BYTES);
    buf.push(status);
    #[allow(clippy::cast_possible_truncation)] // Truncated to u8::MAX above
    buf.push(message.len() as u8);
    buf.extend_from_slice(message);
    let crc = crc16_xmodem(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    buf
}

/// A control line change observed by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineEvent {
    Dtr(bool),
    Rts(bool),
}

/// Mock serial port with separate read/write sides.
///
/// Reads are served chunk by chunk from a queue. Writes are split into
/// frames and handed to an optional responder that plays the device.
pub(crate) struct MockPort {
    reads: VecDeque<Vec<u8>>,
    pending: Vec<u8>,
    responder: Option<Responder>,
    boot_noise: Vec<u8>,
    pub frames: Vec<(Command, Vec<u8>)>,
    pub lines: Vec<LineEvent>,
    pub open: bool,
    pub close_calls: usize,
    pub clear_calls: usize,
    pub overlapping_requests: usize,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            reads: VecDeque::new(),
            pending: Vec::new(),
            responder: None,
            boot_noise: Vec::new(),
            frames: Vec::new(),
            lines: Vec::new(),
            open: true,
            close_calls: 0,
            clear_calls: 0,
            overlapping_requests: 0,
        }
    }

    /// Simulated device answering every frame through `responder`.
    pub fn with_device<F>(responder: F) -> Self
    where
        F: FnMut(Command, &[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Bytes the device prints when it comes out of reset.
    pub fn with_boot_noise(mut self, noise: &[u8]) -> Self {
        self.boot_noise = noise.to_vec();
        self
    }

    pub fn queue_read(&mut self, data: &[u8]) {
        self.reads
            .push_back(data.to_vec());
    }

    pub fn commands(&self) -> Vec<Command> {
        self.frames
            .iter()
            .map(|(cmd, _)| *cmd)
            .collect()
    }

    fn dispatch_frames(&mut self) {
        while self.pending.len() >= FRAME_HEADER_LEN {
            let len = usize::from(u16::from_be_bytes([self.pending[3], self.pending[4]]));
            let total = FRAME_HEADER_LEN + len + CRC_LEN;
            if self.pending.len() < total {
                return;
            }

            let frame: Vec<u8> = self
                .pending
                .drain(..total)
                .collect();
            let Some(command) = Command::from_code(frame[2]) else {
                continue;
            };
            let payload = frame[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len].to_vec();

            if !self.reads.is_empty() {
                self.overlapping_requests += 1;
            }

            let response = self
                .responder
                .as_mut()
                .and_then(|respond| respond(command, &payload));
            self.frames.push((command, payload));
            if let Some(response) = response {
                self.reads.push_back(response);
            }
        }
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.open {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "port closed",
            ));
        }
        let Some(front) = self.reads.front_mut() else {
            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"));
        };
        let n = buf.len().min(front.len());
        buf[..n].copy_from_slice(&front[..n]);
        front.drain(..n);
        if front.is_empty() {
            self.reads.pop_front();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.open {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "port closed",
            ));
        }
        self.pending
            .extend_from_slice(buf);
        self.dispatch_frames();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn name(&self) -> &str {
        "mock"
    }

    fn baud_rate(&self) -> u32 {
        115200
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        if !self.open {
            return Ok(0);
        }
        Ok(self
            .reads
            .front()
            .map_or(0, Vec::len))
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.clear_calls += 1;
        self.reads
            .clear();
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.lines
            .push(LineEvent::Dtr(level));
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        let released = !level
            && self
                .lines
                .iter()
                .rev()
                .find_map(|e| match e {
                    LineEvent::Rts(prev) => Some(*prev),
                    LineEvent::Dtr(_) => None,
                })
                == Some(true);
        self.lines
            .push(LineEvent::Rts(level));
        if released && !self.boot_noise.is_empty() {
            let noise = self.boot_noise.clone();
            self.reads
                .push_back(noise);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.close_calls += 1;
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ack_layout() {
        let data = encode_ack(0, b"OK");
        assert_eq!(&data[..4], &[0xAA, 0x55, 0x00, 0x02]);
        assert_eq!(&data[4..6], b"OK");
        assert_eq!(data.len(), 8);
    }

    #[test]
    fn test_encode_ack_truncates_long_message() {
        let long = vec![b'x'; 300];
        let data = encode_ack(0, &long);
        assert_eq!(data[3], 255);
        assert_eq!(data.len(), 4 + 255 + 2);
    }
}
