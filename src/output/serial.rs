//! UART output through `serialport`

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Write};

use crate::config::DmxConfig;
use crate::error::PortError;
use crate::output::DmxPort;

/// Serial port configured for DMX512 line format (8N2)
pub struct SerialDmxPort {
    inner: Box<dyn SerialPort>,
    name: String,
}

impl SerialDmxPort {
    /// Open and configure the device named in `config.port`
    pub fn open(config: &DmxConfig) -> Result<Self, PortError> {
        let inner = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .flow_control(FlowControl::None)
            .timeout(config.timeout())
            .open()
            .map_err(|e| PortError::OpenFailed {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("Opened serial port {} @ {} baud", config.port, config.baud_rate);

        Ok(Self {
            inner,
            name: config.port.clone(),
        })
    }
}

impl DmxPort for SerialDmxPort {
    fn set_break(&mut self) -> io::Result<()> {
        self.inner.set_break().map_err(io::Error::from)
    }

    fn clear_break(&mut self) -> io::Result<()> {
        self.inner.clear_break().map_err(io::Error::from)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SerialDmxPort {
    fn drop(&mut self) {
        tracing::info!("Closed serial port {}", self.name);
    }
}
