//! Frame transmitter
//!
//! Emits one frame per call, stepping strictly through
//! break → mark-after-break → data → flush. A failure in any step abandons
//! the frame; there is no mid-frame retry.

use std::thread;
use std::time::Duration;

use crate::constants::{DEFAULT_BREAK_US, DEFAULT_MARK_AFTER_BREAK_US};
use crate::error::TransmitError;
use crate::frame::Frame;
use crate::output::DmxPort;
use crate::universe::ChannelBuffer;

/// Break and mark-after-break lengths
///
/// Defaults are 1 ms each, well above the 88 µs / 8 µs protocol minimums,
/// because a sleeping thread cannot hit the minimums reliably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTiming {
    pub break_duration: Duration,
    pub mark_after_break: Duration,
}

impl Default for ProtocolTiming {
    fn default() -> Self {
        Self {
            break_duration: Duration::from_micros(DEFAULT_BREAK_US),
            mark_after_break: Duration::from_micros(DEFAULT_MARK_AFTER_BREAK_US),
        }
    }
}

/// Phase of one transmission cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Break,
    MarkAfterBreak,
    Data,
    Flush,
    Complete,
}

/// Outcome of a cycle that got its data onto the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub bytes_written: usize,
    /// Flush failed; the data was still handed to the driver
    pub flush_failed: bool,
}

/// Builds frames from a channel buffer and drives them onto a port
pub struct FrameTransmitter {
    timing: ProtocolTiming,
    /// Reused between cycles
    frame: Frame,
    phase: FramePhase,
}

impl FrameTransmitter {
    pub fn new(channels: usize, timing: ProtocolTiming) -> Self {
        Self {
            timing,
            frame: Frame::with_channels(channels),
            phase: FramePhase::Complete,
        }
    }

    /// Phase reached by the last cycle
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Snapshot `buffer` and transmit it as one frame
    ///
    /// A buffer whose channel count differs from the transmitter's is
    /// rejected before anything touches the line.
    pub fn transmit(
        &mut self,
        port: &mut dyn DmxPort,
        buffer: &ChannelBuffer,
    ) -> Result<FrameReport, TransmitError> {
        buffer.snapshot_into(self.frame.levels_mut())?;
        self.send_frame(port)
    }

    fn send_frame(&mut self, port: &mut dyn DmxPort) -> Result<FrameReport, TransmitError> {
        self.phase = FramePhase::Break;
        port.set_break().map_err(TransmitError::Break)?;
        thread::sleep(self.timing.break_duration);

        self.phase = FramePhase::MarkAfterBreak;
        port.clear_break().map_err(TransmitError::MarkAfterBreak)?;
        thread::sleep(self.timing.mark_after_break);

        self.phase = FramePhase::Data;
        port.write_all(self.frame.as_bytes())
            .map_err(TransmitError::Data)?;

        self.phase = FramePhase::Flush;
        let flush_failed = match port.flush() {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!("Flush on {} failed: {}", port.name(), e);
                true
            }
        };

        self.phase = FramePhase::Complete;
        Ok(FrameReport {
            bytes_written: self.frame.as_bytes().len(),
            flush_failed,
        })
    }
}
