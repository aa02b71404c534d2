//! DMX512 frame building and line timing

pub mod transmitter;

pub use transmitter::{FramePhase, FrameReport, FrameTransmitter, ProtocolTiming};

use crate::constants::START_CODE;

/// One packet as it goes on the wire: start code followed by channel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Zeroed dimmer frame sized for `channels`
    pub fn with_channels(channels: usize) -> Self {
        let mut bytes = vec![0u8; channels + 1];
        bytes[0] = START_CODE;
        Self { bytes }
    }

    pub fn start_code(&self) -> u8 {
        self.bytes[0]
    }

    /// Channel data without the start code
    pub fn levels(&self) -> &[u8] {
        &self.bytes[1..]
    }

    /// Mutable channel data, for refilling in place
    pub fn levels_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[1..]
    }

    pub fn channel_count(&self) -> usize {
        self.bytes.len() - 1
    }

    /// Full wire image including the start code
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
