//! Hardware reset sequencing through the serial control lines.
//!
//! USB-UART bridges on development boards conventionally wire RTS to the
//! target's reset (EN) pin and DTR to its boot-mode (IO0) pin. Pulsing RTS
//! while DTR stays deasserted restarts the target into its normal boot
//! path, where the OTA bootloader takes over.

use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::error::Result;
use crate::port::Port;

/// Default length of each step of the control-line pulse.
pub const DEFAULT_PULSE: Duration = Duration::from_millis(100);

/// Default time the target needs to boot after reset.
pub const DEFAULT_BOOT_SETTLE: Duration = Duration::from_millis(2000);

/// Timed reset pulse followed by a boot-settle wait and an input drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSequence {
    /// Delay after each control-line change.
    pub pulse: Duration,
    /// Delay after releasing reset before protocol traffic starts.
    pub boot_settle: Duration,
}

impl Default for ResetSequence {
    fn default() -> Self {
        Self {
            pulse: DEFAULT_PULSE,
            boot_settle: DEFAULT_BOOT_SETTLE,
        }
    }
}

impl ResetSequence {
    /// Run the sequence on an open port.
    ///
    /// Any bytes received while the target boots (bootloader banners, log
    /// output) are discarded before this returns.
    pub fn run<P: Port>(&self, port: &mut P) -> Result<()> {
        debug!("Resetting device on {}", port.name());

        // IO0 = HIGH, EN = HIGH
        port.set_dtr(false)?;
        port.set_rts(false)?;
        thread::sleep(self.pulse);

        // EN = LOW, chip in reset
        port.set_rts(true)?;
        thread::sleep(self.pulse);

        // EN = HIGH, chip out of reset
        port.set_rts(false)?;
        thread::sleep(self.pulse);

        trace!("Waiting {} ms for boot", self.boot_settle.as_millis());
        thread::sleep(self.boot_settle);

        port.clear_buffers()?;
        debug!("Reset complete, input drained");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{LineEvent, MockPort};
    use std::time::Instant;

    fn instant() -> ResetSequence {
        ResetSequence {
            pulse: Duration::ZERO,
            boot_settle: Duration::ZERO,
        }
    }

    #[test]
    fn test_default_timings() {
        let seq = ResetSequence::default();
        assert_eq!(seq.pulse, Duration::from_millis(100));
        assert_eq!(seq.boot_settle, Duration::from_secs(2));
    }

    #[test]
    fn test_line_order() {
        let mut port = MockPort::new();
        instant().run(&mut port).unwrap();

        assert_eq!(
            port.lines,
            vec![
                LineEvent::Dtr(false),
                LineEvent::Rts(false),
                LineEvent::Rts(true),
                LineEvent::Rts(false),
            ]
        );
    }

    #[test]
    fn test_boot_noise_is_drained() {
        let mut port = MockPort::new().with_boot_noise(b"ets Jun  8 2016 00:22:57\r\nrst:0x1");
        instant().run(&mut port).unwrap();

        assert_eq!(port.clear_calls, 1);
        assert_eq!(port.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn test_waits_for_pulses_and_settle() {
        let seq = ResetSequence {
            pulse: Duration::from_millis(5),
            boot_settle: Duration::from_millis(20),
        };
        let mut port = MockPort::new();

        let started = Instant::now();
        seq.run(&mut port).unwrap();
        assert!(started.elapsed() >= seq.pulse * 3 + seq.boot_settle);
    }
}
