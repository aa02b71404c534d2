//! Port that accepts and discards everything

use std::io;

use crate::output::DmxPort;

/// Stand-in used when no line driver is attached
#[derive(Debug, Clone)]
pub struct NullPort {
    name: String,
}

impl NullPort {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl DmxPort for NullPort {
    fn set_break(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn clear_break(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        tracing::trace!("{}: discarded {} bytes", self.name, bytes.len());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
