//! Progress and status reporting for upload sessions.

use super::UploadState;

/// Receives status lines and progress from an [`UploadSession`](super::UploadSession).
///
/// Callbacks run synchronously on the session's thread between protocol
/// exchanges, so they should return quickly.
pub trait FlashObserver {
    /// A human-readable status line at a protocol milestone or error.
    fn on_log(&mut self, line: &str);

    /// Fraction of the image acknowledged by the device, in `[0, 1]`.
    fn on_progress(&mut self, fraction: f64);

    /// The session entered a new state.
    fn on_state(&mut self, _state: UploadState) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FlashObserver for NoopObserver {
    fn on_log(&mut self, _line: &str) {}

    fn on_progress(&mut self, _fraction: f64) {}
}
