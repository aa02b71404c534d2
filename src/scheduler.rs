//! Periodic transmit loop
//!
//! Runs on its own thread, one frame per interval. Deadlines accumulate
//! from the previous deadline rather than from "now" so per-cycle jitter
//! does not turn into drift. After an overrun the next sleep is zero; if
//! the loop falls a whole interval behind it re-anchors on the current
//! time instead of bursting frames to catch up.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::TransmitError;
use crate::frame::{FrameReport, FrameTransmitter};
use crate::output::DmxPort;
use crate::universe::SharedChannelBuffer;

/// Port slot shared between the lifecycle controller and the transmit thread
pub type SharedPort = Arc<Mutex<Option<Box<dyn DmxPort>>>>;

/// Counters updated by the transmit thread
#[derive(Debug, Default)]
pub struct TransmitCounters {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    flush_failures: AtomicU64,
}

impl TransmitCounters {
    pub fn stats(&self) -> TransmitStats {
        TransmitStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
        }
    }
}

/// Transmit statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub flush_failures: u64,
}

impl TransmitStats {
    pub fn drop_rate(&self) -> f32 {
        let total = self.frames_sent + self.frames_dropped;
        if total == 0 {
            0.0
        } else {
            self.frames_dropped as f32 / total as f32
        }
    }
}

/// Compute the deadline after `deadline`
pub fn advance_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if now >= next + interval {
        now
    } else {
        next
    }
}

/// Transmit loop state, moved onto the transmit thread
pub struct TransmitScheduler {
    interval: Duration,
    buffer: SharedChannelBuffer,
    port: SharedPort,
    transmitter: FrameTransmitter,
    stop: Arc<AtomicBool>,
    /// Raised when the controller gave up waiting; the loop then closes
    /// the port itself on exit
    close_on_exit: Arc<AtomicBool>,
    counters: Arc<TransmitCounters>,
}

impl TransmitScheduler {
    pub fn new(
        interval: Duration,
        buffer: SharedChannelBuffer,
        port: SharedPort,
        transmitter: FrameTransmitter,
        stop: Arc<AtomicBool>,
        close_on_exit: Arc<AtomicBool>,
        counters: Arc<TransmitCounters>,
    ) -> Self {
        Self {
            interval,
            buffer,
            port,
            transmitter,
            stop,
            close_on_exit,
            counters,
        }
    }

    /// Run until the stop flag is raised
    pub fn run(mut self) {
        tracing::info!("Transmit loop started ({:?} interval)", self.interval);
        let mut deadline = Instant::now();

        while !self.stop.load(Ordering::Acquire) {
            self.run_cycle();

            deadline = advance_deadline(deadline, self.interval, Instant::now());
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }

        if self.close_on_exit.load(Ordering::SeqCst) {
            if let Some(port) = self.port.lock().take() {
                tracing::info!("Closing DMX port {} after late stop", port.name());
            }
        }
        tracing::info!("Transmit loop stopped");
    }

    /// Send one frame, recording the outcome; errors never escape
    pub fn run_cycle(&mut self) -> Option<FrameReport> {
        match self.send_once() {
            Ok(report) => {
                self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
                if report.flush_failed {
                    self.counters.flush_failures.fetch_add(1, Ordering::Relaxed);
                }
                tracing::trace!("Sent frame ({} bytes)", report.bytes_written);
                Some(report)
            }
            Err(e) => {
                self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Frame dropped: {}", e);
                None
            }
        }
    }

    fn send_once(&mut self) -> Result<FrameReport, TransmitError> {
        let mut slot = self.port.lock();
        let port = slot.as_mut().ok_or(TransmitError::PortClosed)?;
        self.transmitter.transmit(port.as_mut(), &self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ProtocolTiming;
    use crate::output::RecordingPort;
    use crate::universe::create_shared_buffer;

    fn fast_timing() -> ProtocolTiming {
        ProtocolTiming {
            break_duration: Duration::from_micros(100),
            mark_after_break: Duration::from_micros(10),
        }
    }

    fn scheduler(recorder: &RecordingPort, interval: Duration) -> (TransmitScheduler, Arc<AtomicBool>) {
        let buffer = create_shared_buffer(8);
        let attached: Box<dyn DmxPort> = Box::new(recorder.attach());
        let port: SharedPort = Arc::new(Mutex::new(Some(attached)));
        let stop = Arc::new(AtomicBool::new(false));
        let scheduler = TransmitScheduler::new(
            interval,
            buffer,
            port,
            FrameTransmitter::new(8, fast_timing()),
            stop.clone(),
            Arc::new(AtomicBool::new(false)),
            Arc::new(TransmitCounters::default()),
        );
        (scheduler, stop)
    }

    #[test]
    fn test_port_left_open_on_normal_exit() {
        let recorder = RecordingPort::new("mem");
        let (scheduler, stop) = scheduler(&recorder, Duration::from_millis(5));
        let port = Arc::clone(&scheduler.port);

        stop.store(true, Ordering::Release);
        scheduler.run();

        assert!(port.lock().is_some());
        assert_eq!(recorder.closed_count(), 0);
    }

    #[test]
    fn test_close_on_exit_releases_port() {
        let recorder = RecordingPort::new("mem");
        let (scheduler, stop) = scheduler(&recorder, Duration::from_millis(5));
        let port = Arc::clone(&scheduler.port);
        scheduler.close_on_exit.store(true, Ordering::SeqCst);

        let handle = thread::spawn(move || scheduler.run());
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        assert!(port.lock().is_none());
        assert_eq!(recorder.closed_count(), 1);
    }

    #[test]
    fn test_deadline_accumulates_from_previous_deadline() {
        let start = Instant::now();
        let interval = Duration::from_millis(23);

        // Running 5 ms late still targets start + 2 intervals
        let next = advance_deadline(start + interval, interval, start + interval + Duration::from_millis(5));
        assert_eq!(next, start + interval * 2);
    }

    #[test]
    fn test_deadline_reanchors_after_long_overrun() {
        let start = Instant::now();
        let interval = Duration::from_millis(10);
        let now = start + Duration::from_millis(50);

        assert_eq!(advance_deadline(start, interval, now), now);
    }

    #[test]
    fn test_cycle_with_closed_port_counts_drop() {
        let recorder = RecordingPort::new("mem");
        let (mut scheduler, _) = scheduler(&recorder, Duration::from_millis(5));
        scheduler.port.lock().take();

        assert!(scheduler.run_cycle().is_none());
        assert_eq!(scheduler.counters.stats().frames_dropped, 1);
    }

    #[test]
    fn test_write_failure_drops_one_frame_only() {
        let recorder = RecordingPort::new("mem");
        let (mut scheduler, _) = scheduler(&recorder, Duration::from_millis(5));
        recorder.fail_next_writes(1);

        assert!(scheduler.run_cycle().is_none());
        assert!(scheduler.run_cycle().is_some());

        let stats = scheduler.counters.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(recorder.frame_count(), 1);
        assert!((stats.drop_rate() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mean_gap_converges_to_interval() {
        let recorder = RecordingPort::new("mem");
        let interval = Duration::from_millis(10);
        let (scheduler, stop) = scheduler(&recorder, interval);

        let handle = thread::spawn(move || scheduler.run());
        while recorder.frame_count() < 31 {
            thread::sleep(Duration::from_millis(5));
        }
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        let frames = recorder.frames();
        let span = frames[30].break_at - frames[0].break_at;
        let mean = span / 30;
        assert!(
            mean >= Duration::from_micros(9_000) && mean <= Duration::from_micros(12_000),
            "mean gap {:?}",
            mean
        );
    }

    #[test]
    fn test_stop_flag_ends_loop_within_a_cycle() {
        let recorder = RecordingPort::new("mem");
        let (scheduler, stop) = scheduler(&recorder, Duration::from_millis(20));

        let handle = thread::spawn(move || scheduler.run());
        thread::sleep(Duration::from_millis(30));
        let raised = Instant::now();
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        assert!(raised.elapsed() < Duration::from_millis(100));
    }
}
