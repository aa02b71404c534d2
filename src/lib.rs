//! # DMX Serial Sender
//!
//! Continuous DMX512 output over an RS-485 transceiver (MAX485 or similar)
//! attached to a UART.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  Collaborators (UI sliders, effects, scene loader, remote control)   │
//! └───────────────┬───────────────────────────────────┬──────────────────┘
//!                 │ update_channel()                  │ snapshot()
//!                 ▼                                   ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                 Channel Buffer (universe::ChannelBuffer)             │
//! │                 512 x u8 behind a parking_lot::Mutex                 │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │ snapshot once per cycle
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  Transmit Thread (scheduler::TransmitScheduler)  every 23 ms         │
//! │  ┌─────────┐   ┌─────────┐   ┌──────────────────────┐   ┌────────┐  │
//! │  │  Break  │──▶│   MAB   │──▶│ 0x00 + N data bytes  │──▶│ Flush  │  │
//! │  └─────────┘   └─────────┘   └──────────────────────┘   └────────┘  │
//! │                  (frame::FrameTransmitter)                          │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │        output::DmxPort  (serial UART / null / recording)             │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`sender::DmxSender`] owns all of the above and controls the
//! transmit thread lifecycle.

pub mod config;
pub mod error;
pub mod frame;
pub mod output;
pub mod scheduler;
pub mod sender;
pub mod universe;

pub use config::DmxConfig;
pub use error::{Error, Result};
pub use sender::{DmxSender, TransmitterState};

/// Protocol and application constants
pub mod constants {
    /// DMX512 line rate in baud
    pub const DEFAULT_BAUD_RATE: u32 = 250_000;

    /// Channels in one full universe
    pub const MAX_CHANNELS: usize = 512;

    /// Default channel count
    pub const DEFAULT_CHANNELS: usize = MAX_CHANNELS;

    /// Start code for a standard dimmer frame
    pub const START_CODE: u8 = 0x00;

    /// Default refresh interval in milliseconds (about 44 Hz)
    pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 23;

    /// Protocol minimum break length in microseconds
    pub const MIN_BREAK_US: u64 = 88;

    /// Protocol minimum mark-after-break length in microseconds
    pub const MIN_MARK_AFTER_BREAK_US: u64 = 8;

    /// Default break length in microseconds
    pub const DEFAULT_BREAK_US: u64 = 1_000;

    /// Default mark-after-break length in microseconds
    pub const DEFAULT_MARK_AFTER_BREAK_US: u64 = 1_000;

    /// Default port open / write timeout in milliseconds
    pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

    /// Default bound on waiting for the transmit thread to stop
    pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 1_000;

    /// Default serial device on a Raspberry Pi
    pub const DEFAULT_PORT: &str = "/dev/serial0";
}
