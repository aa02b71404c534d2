//! Error types for the DMX transmitter

use std::time::Duration;
use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Communication resource errors
#[derive(Error, Debug)]
pub enum PortError {
    #[error("Failed to open {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    #[error("Port {0} is busy")]
    Busy(String),
}

/// Failures inside a single transmission cycle.
///
/// Each variant names the frame phase that failed; the frame is dropped
/// and the next cycle starts from the break again.
#[derive(Error, Debug)]
pub enum TransmitError {
    #[error("Break failed: {0}")]
    Break(#[source] std::io::Error),

    #[error("Mark-after-break failed: {0}")]
    MarkAfterBreak(#[source] std::io::Error),

    #[error("Data write failed: {0}")]
    Data(#[source] std::io::Error),

    #[error("Port is not open")]
    PortClosed,

    #[error("Snapshot failed: {0}")]
    Snapshot(#[from] ChannelError),
}

/// Channel buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Address {address} out of range (0..{channels})")]
    OutOfRange { address: isize, channels: usize },

    #[error("Snapshot target holds {actual} channels, buffer has {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Start/stop errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Transmit loop did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Failed to spawn transmit thread: {0}")]
    SpawnFailed(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
