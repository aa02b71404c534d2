//! Communication resource behind the transmitter
//!
//! [`DmxPort`] is the narrow capability the frame transmitter needs from a
//! line driver. Which implementation is used is decided once, from
//! configuration, by a [`PortFactory`].

pub mod memory;
pub mod null;
pub mod serial;

use std::io;
use std::sync::Arc;

use crate::config::{Backend, DmxConfig};
use crate::error::PortError;

pub use memory::{RecordedFrame, RecordingPort, RecordingPortFactory};
pub use null::NullPort;
pub use serial::SerialDmxPort;

/// Line-level operations needed to emit a DMX frame
pub trait DmxPort: Send {
    /// Drive the line low (break)
    fn set_break(&mut self) -> io::Result<()>;

    /// Release the line to idle high (mark)
    fn clear_break(&mut self) -> io::Result<()>;

    /// Queue bytes for transmission
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Wait for queued bytes to leave the driver
    fn flush(&mut self) -> io::Result<()>;

    /// Human-readable endpoint name for logs
    fn name(&self) -> &str;
}

/// Opens a [`DmxPort`] for a configuration
pub trait PortFactory: Send + Sync {
    fn open(&self, config: &DmxConfig) -> Result<Box<dyn DmxPort>, PortError>;
}

impl<F: PortFactory + ?Sized> PortFactory for Arc<F> {
    fn open(&self, config: &DmxConfig) -> Result<Box<dyn DmxPort>, PortError> {
        (**self).open(config)
    }
}

/// Factory that follows `config.backend`
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfiguredPortFactory;

impl PortFactory for ConfiguredPortFactory {
    fn open(&self, config: &DmxConfig) -> Result<Box<dyn DmxPort>, PortError> {
        match config.backend {
            Backend::Serial => Ok(Box::new(SerialDmxPort::open(config)?)),
            Backend::Null => Ok(Box::new(NullPort::new(&config.port))),
        }
    }
}
