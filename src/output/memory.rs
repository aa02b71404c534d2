//! In-memory port that records every frame it is given
//!
//! Useful as a loopback for diagnostics and for exercising the transmit
//! path without hardware. A `RecordingPort` is a cheap handle: clones share
//! the same record, so a caller can keep one as a recorder while another is
//! owned by the transmitter.

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::DmxConfig;
use crate::error::PortError;
use crate::output::{DmxPort, PortFactory};

/// One frame as it reached the port
#[derive(Debug, Clone)]
pub struct RecordedFrame {
    pub bytes: Vec<u8>,
    /// When the break for this frame was asserted
    pub break_at: Instant,
    /// Time between break release and the data write
    pub mark_after_break: Duration,
    /// Length of the break
    pub break_length: Duration,
}

#[derive(Default)]
struct Record {
    frames: Mutex<Vec<RecordedFrame>>,
    fail_writes: AtomicUsize,
    write_delay: Mutex<Duration>,
    flushes: AtomicU64,
    closed: AtomicU64,
}

/// Port that keeps frames in memory
#[derive(Clone)]
pub struct RecordingPort {
    name: String,
    record: Arc<Record>,
    break_at: Option<Instant>,
    mark_at: Option<(Instant, Duration)>,
    /// Only ports handed to a transmitter count as closed when dropped
    owned: bool,
}

impl RecordingPort {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            record: Arc::new(Record::default()),
            break_at: None,
            mark_at: None,
            owned: false,
        }
    }

    /// Another handle on the same record that counts as a live port
    pub fn attach(&self) -> Self {
        Self {
            name: self.name.clone(),
            record: Arc::clone(&self.record),
            break_at: None,
            mark_at: None,
            owned: true,
        }
    }

    /// Frames recorded so far
    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.record.frames.lock().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.record.frames.lock().len()
    }

    /// Most recent frame, if any
    pub fn last_frame(&self) -> Option<RecordedFrame> {
        self.record.frames.lock().last().cloned()
    }

    /// Make the next `count` data writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.record.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Block every data write for `delay`, simulating a stuck driver
    pub fn set_write_delay(&self, delay: Duration) {
        *self.record.write_delay.lock() = delay;
    }

    pub fn flushes(&self) -> u64 {
        self.record.flushes.load(Ordering::Relaxed)
    }

    /// How many owned handles have been dropped
    pub fn closed_count(&self) -> u64 {
        self.record.closed.load(Ordering::SeqCst)
    }
}

impl DmxPort for RecordingPort {
    fn set_break(&mut self) -> io::Result<()> {
        self.break_at = Some(Instant::now());
        self.mark_at = None;
        Ok(())
    }

    fn clear_break(&mut self) -> io::Result<()> {
        let break_at = self
            .break_at
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "break released without break"))?;
        self.mark_at = Some((Instant::now(), break_at.elapsed()));
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let delay = *self.record.write_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let failed = self
            .record
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure"));
        }

        let (break_at, (mark_at, break_length)) = self
            .break_at
            .zip(self.mark_at)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "data written without break/MAB"))?;

        self.record.frames.lock().push(RecordedFrame {
            bytes: bytes.to_vec(),
            break_at,
            mark_after_break: mark_at.elapsed(),
            break_length,
        });
        self.break_at = None;
        self.mark_at = None;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.record.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for RecordingPort {
    fn drop(&mut self) {
        if self.owned {
            self.record.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Factory handing out attached [`RecordingPort`]s
pub struct RecordingPortFactory {
    recorder: RecordingPort,
    fail_open: AtomicBool,
    opens: AtomicU64,
}

impl RecordingPortFactory {
    pub fn new(recorder: RecordingPort) -> Self {
        Self {
            recorder,
            fail_open: AtomicBool::new(false),
            opens: AtomicU64::new(0),
        }
    }

    /// Make subsequent opens fail
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PortFactory for RecordingPortFactory {
    fn open(&self, config: &DmxConfig) -> Result<Box<dyn DmxPort>, PortError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(PortError::OpenFailed {
                port: config.port.clone(),
                reason: "simulated open failure".to_string(),
            });
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.recorder.attach()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_frame_after_break_and_mab() {
        let recorder = RecordingPort::new("mem");
        let mut port = recorder.attach();

        port.set_break().unwrap();
        port.clear_break().unwrap();
        port.write_all(&[0, 1, 2]).unwrap();

        assert_eq!(recorder.frame_count(), 1);
        assert_eq!(recorder.last_frame().unwrap().bytes, vec![0, 1, 2]);
    }

    #[test]
    fn test_rejects_data_without_break() {
        let mut port = RecordingPort::new("mem");
        assert!(port.write_all(&[0]).is_err());
        assert_eq!(port.frame_count(), 0);
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let recorder = RecordingPort::new("mem");
        let mut port = recorder.attach();
        recorder.fail_next_writes(1);

        port.set_break().unwrap();
        port.clear_break().unwrap();
        assert!(port.write_all(&[0]).is_err());
        assert!(port.write_all(&[0]).is_ok());
        assert_eq!(recorder.frame_count(), 1);
    }

    #[test]
    fn test_closed_counts_only_owned_handles() {
        let recorder = RecordingPort::new("mem");
        let extra_handle = recorder.clone();
        drop(extra_handle);
        assert_eq!(recorder.closed_count(), 0);

        drop(recorder.attach());
        assert_eq!(recorder.closed_count(), 1);
    }

    #[test]
    fn test_factory_can_fail_open() {
        let factory = RecordingPortFactory::new(RecordingPort::new("mem"));
        assert!(factory.open(&DmxConfig::null()).is_ok());

        factory.set_fail_open(true);
        assert!(factory.open(&DmxConfig::null()).is_err());
        assert_eq!(factory.opens(), 1);
    }
}
