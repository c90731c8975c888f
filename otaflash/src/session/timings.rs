//! Phase deadlines and delays for an upload session.

use std::time::Duration;

use crate::reset::ResetSequence;

/// Deadlines and delays used by [`UploadSession`](super::UploadSession).
///
/// The defaults match what the OTA bootloader needs on real hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Control-line reset pulse and boot settle time.
    pub reset: ResetSequence,
    /// Delay between polls while waiting for an ack.
    pub poll_interval: Duration,
    /// Ack deadline for each VERIFY sync attempt.
    pub sync_timeout: Duration,
    /// Number of VERIFY frames sent before giving up.
    pub sync_attempts: usize,
    /// Pause after a timed-out sync attempt.
    pub sync_backoff: Duration,
    /// Pause between a successful sync and START.
    pub post_sync_delay: Duration,
    /// Ack deadline for START (the device erases its update slot).
    pub start_timeout: Duration,
    /// Ack deadline for each DATA chunk.
    pub data_timeout: Duration,
    /// Ack deadline for END (the device validates the image).
    pub end_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reset: ResetSequence::default(),
            poll_interval: Duration::from_millis(1),
            sync_timeout: Duration::from_secs(1),
            sync_attempts: 3,
            sync_backoff: Duration::from_millis(500),
            post_sync_delay: Duration::from_millis(500),
            start_timeout: Duration::from_secs(10),
            data_timeout: Duration::from_secs(1),
            end_timeout: Duration::from_secs(5),
        }
    }
}
