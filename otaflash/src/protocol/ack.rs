//! Device-to-host acknowledgement frames.
//!
//! ## Ack Format
//!
//! ```text
//! +--------+--------+--------+-------------+--------+
//! | Magic  | Status | MsgLen |   Message   | CRC16  |
//! +--------+--------+--------+-------------+--------+
//! | 2 bytes| 1      | 1      |   MsgLen    | 2 bytes|
//! +--------+--------+--------+-------------+--------+
//! | 0xAA55 | 0 = ok | n      | UTF-8 text  |  BE16  |
//! +--------+--------+--------+-------------+--------+
//! ```
//!
//! Acks arrive on a serial line that may also carry boot logs and noise, so
//! the receiver scans for the magic marker, validates the checksum and
//! resynchronizes by dropping only the marker bytes when validation fails.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::constants::{ACK_HEADER_LEN, ACK_MAGIC_BYTES, CRC_LEN, STATUS_OK};
use crate::protocol::crc::crc16_xmodem;

/// A validated acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ack {
    /// Device status (0 = success, anything else is a device error code).
    pub status: u8,
    /// Device message, lossily decoded as UTF-8.
    pub message: String,
}

impl Ack {
    /// Check if this is a successful response.
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Accumulation buffer that extracts acks from a noisy byte stream.
#[derive(Debug, Default)]
pub struct AckBuffer {
    buf: Vec<u8>,
}

impl AckBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf
            .extend_from_slice(data);
    }

    /// Bytes currently buffered.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf
            .len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf
            .is_empty()
    }

    /// Try to extract the next valid ack.
    ///
    /// Returns `None` when more bytes are needed. Bytes before a marker are
    /// discarded; a frame failing its checksum loses only its two marker
    /// bytes so a real frame hiding behind a false marker is still found.
    pub fn next_ack(&mut self) -> Option<Ack> {
        loop {
            let Some(pos) = self
                .buf
                .windows(ACK_MAGIC_BYTES.len())
                .position(|w| w == ACK_MAGIC_BYTES)
            else {
                // Keep a trailing first marker byte, it may be half a marker
                let keep = usize::from(self.buf.last() == Some(&ACK_MAGIC_BYTES[0]));
                let discard = self.buf.len() - keep;
                if discard > 0 {
                    trace!("Discarding {discard} bytes without ack marker");
                    self.buf
                        .drain(..discard);
                }
                return None;
            };

            if pos > 0 {
                trace!("Discarding {pos} bytes before ack marker");
                self.buf
                    .drain(..pos);
            }

            if self.buf.len() < ACK_HEADER_LEN {
                return None;
            }

            let status = self.buf[2];
            let msg_len = usize::from(self.buf[3]);
            let total_len = ACK_HEADER_LEN + msg_len + CRC_LEN;
            if self.buf.len() < total_len {
                return None;
            }

            let body_len = total_len - CRC_LEN;
            let received = u16::from_be_bytes([self.buf[body_len], self.buf[body_len + 1]]);
            let computed = crc16_xmodem(&self.buf[..body_len]);

            if received != computed {
                debug!("Ack CRC mismatch: received {received:04X}, computed {computed:04X}");
                self.buf
                    .drain(..ACK_MAGIC_BYTES.len());
                continue;
            }

            let message = String::from_utf8_lossy(&self.buf[ACK_HEADER_LEN..body_len]).into_owned();
            self.buf
                .drain(..total_len);

            return Some(Ack { status, message });
        }
    }
}

/// Waits for acks on a port, polling until a deadline.
pub struct AckReceiver<'a, P: Port> {
    port: &'a mut P,
    poll_interval: Duration,
    output: Vec<u8>,
}

impl<'a, P: Port> AckReceiver<'a, P> {
    /// Default delay between polls of the port.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// Most recent device output kept for the timeout report.
    pub const MAX_OUTPUT_LEN: usize = 1024;

    /// Create a receiver polling at the default interval.
    pub fn new(port: &'a mut P) -> Self {
        Self::with_poll_interval(port, Self::DEFAULT_POLL_INTERVAL)
    }

    /// Create a receiver with a custom poll interval.
    pub fn with_poll_interval(port: &'a mut P, poll_interval: Duration) -> Self {
        Self {
            port,
            poll_interval,
            output: Vec::new(),
        }
    }

    /// Raw bytes read during the last [`receive`](Self::receive) call, at
    /// most [`MAX_OUTPUT_LEN`](Self::MAX_OUTPUT_LEN) of the latest ones.
    pub fn device_output(&self) -> &[u8] {
        &self.output
    }

    /// Wait up to `timeout` for the next valid ack.
    ///
    /// Returns [`Error::Timeout`] if no valid ack arrives in time. Corrupted
    /// frames and stray bytes are absorbed silently.
    pub fn receive(&mut self, timeout: Duration) -> Result<Ack> {
        let start = Instant::now();
        let mut buffer = AckBuffer::new();
        self.output
            .clear();

        loop {
            let data = self
                .port
                .read_available()?;
            if !data.is_empty() {
                trace!("Received {} bytes", data.len());
                buffer.extend(&data);
                self.record(&data);
            }

            if let Some(ack) = buffer.next_ack() {
                trace!("Ack: status={} message={:?}", ack.status, ack.message);
                return Ok(ack);
            }

            if start.elapsed() >= timeout {
                break;
            }
            thread::sleep(self.poll_interval);
        }

        if !self.output.is_empty() {
            debug!(
                "Device output before timeout: {}",
                String::from_utf8_lossy(&self.output)
            );
        }

        Err(Error::Timeout(format!(
            "no ack within {} ms",
            timeout.as_millis()
        )))
    }

    fn record(&mut self, data: &[u8]) {
        self.output
            .extend_from_slice(data);
        let excess = self
            .output
            .len()
            .saturating_sub(Self::MAX_OUTPUT_LEN);
        if excess > 0 {
            self.output
                .drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockPort, encode_ack};

    #[test]
    fn test_parse_clean_frame() {
        let mut buffer = AckBuffer::new();
        buffer.extend(&encode_ack(0, b"ready"));
        let ack = buffer.next_ack().unwrap();
        assert_eq!(ack.status, 0);
        assert_eq!(ack.message, "ready");
        assert!(ack.is_success());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parse_with_leading_noise() {
        let frame = encode_ack(7, b"busy");
        for n in [0usize, 1, 2, 17, 255, 1000] {
            let mut data: Vec<u8> = (0..n).map(|i| (i * 31 % 251) as u8).collect();
            data.extend_from_slice(&frame);

            let mut buffer = AckBuffer::new();
            buffer.extend(&data);
            let ack = buffer.next_ack().unwrap_or_else(|| panic!("no ack with {n} noise bytes"));
            assert_eq!(ack.status, 7);
            assert_eq!(ack.message, "busy");
        }
    }

    #[test]
    fn test_noise_containing_marker_bytes() {
        // A false marker with a short length field fails its CRC check
        let mut data = b"boot\xAA\x55\x01\x02xy".to_vec();
        data.extend_from_slice(&encode_ack(0, b"hello"));

        let mut buffer = AckBuffer::new();
        buffer.extend(&data);
        assert_eq!(buffer.next_ack().unwrap().message, "hello");
    }

    #[test]
    fn test_resync_after_corrupted_frame() {
        let mut bad = encode_ack(1, b"corrupt");
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;

        let mut data = bad;
        data.extend_from_slice(&encode_ack(0, b"valid"));

        let mut buffer = AckBuffer::new();
        buffer.extend(&data);
        let ack = buffer.next_ack().unwrap();
        assert_eq!(ack.status, 0);
        assert_eq!(ack.message, "valid");
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let frame = encode_ack(0, b"split");
        let mut buffer = AckBuffer::new();

        buffer.extend(&frame[..1]);
        assert!(buffer.next_ack().is_none());
        buffer.extend(&frame[1..3]);
        assert!(buffer.next_ack().is_none());
        buffer.extend(&frame[3..frame.len() - 1]);
        assert!(buffer.next_ack().is_none());
        buffer.extend(&frame[frame.len() - 1..]);
        assert_eq!(buffer.next_ack().unwrap().message, "split");
    }

    #[test]
    fn test_lossy_message_decoding() {
        let mut buffer = AckBuffer::new();
        buffer.extend(&encode_ack(0, b"ok\xFF\xFE"));
        let ack = buffer.next_ack().unwrap();
        assert!(ack.message.starts_with("ok"));
        assert!(ack.message.contains('\u{FFFD}'));
    }

    #[test]
    fn test_receiver_reads_across_polls() {
        let frame = encode_ack(0, b"chunked");
        let mut port = MockPort::new();
        port.queue_read(&b"garbage"[..]);
        port.queue_read(&frame[..5]);
        port.queue_read(&frame[5..]);

        let mut receiver = AckReceiver::with_poll_interval(&mut port, Duration::ZERO);
        let ack = receiver.receive(Duration::from_secs(1)).unwrap();
        assert_eq!(ack.message, "chunked");
    }

    #[test]
    fn test_receiver_resyncs_on_corruption() {
        let mut bad = encode_ack(9, b"noise");
        bad[4] ^= 0x01;
        let mut port = MockPort::new();
        port.queue_read(&bad);
        port.queue_read(&encode_ack(0, b"real"));

        let mut receiver = AckReceiver::with_poll_interval(&mut port, Duration::ZERO);
        let ack = receiver.receive(Duration::from_secs(1)).unwrap();
        assert_eq!(ack.status, 0);
        assert_eq!(ack.message, "real");
    }

    #[test]
    fn test_receiver_timeout() {
        let mut port = MockPort::new();
        port.queue_read(&b"no frame here"[..]);

        let mut receiver = AckReceiver::with_poll_interval(&mut port, Duration::from_millis(1));
        let err = receiver
            .receive(Duration::from_millis(20))
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_receiver_times_out_on_closed_port() {
        let mut port = MockPort::new();
        port.close().unwrap();

        let mut receiver = AckReceiver::with_poll_interval(&mut port, Duration::from_millis(1));
        assert!(
            receiver
                .receive(Duration::from_millis(10))
                .unwrap_err()
                .is_timeout()
        );
    }

    #[test]
    fn test_timeout_reports_device_output() {
        let mut port = MockPort::new();
        port.queue_read(&b"E (123) ota: "[..]);
        port.queue_read(&b"app not found\r\n"[..]);

        let mut receiver = AckReceiver::with_poll_interval(&mut port, Duration::from_millis(1));
        let err = receiver
            .receive(Duration::from_millis(20))
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(
            receiver.device_output(),
            b"E (123) ota: app not found\r\n"
        );
    }

    #[test]
    fn test_device_output_keeps_latest_bytes() {
        let mut port = MockPort::new();
        port.queue_read(&vec![b'a'; AckReceiver::<MockPort>::MAX_OUTPUT_LEN]);
        port.queue_read(&b"tail"[..]);

        let mut receiver = AckReceiver::with_poll_interval(&mut port, Duration::from_millis(1));
        assert!(
            receiver
                .receive(Duration::from_millis(20))
                .is_err()
        );
        let output = receiver.device_output();
        assert_eq!(output.len(), AckReceiver::<MockPort>::MAX_OUTPUT_LEN);
        assert!(output.ends_with(b"tail"));
    }
}
