//! DMX sender: channel access and transmit lifecycle
//!
//! `DmxSender` is the handle collaborators hold. Channel writes go straight
//! to the shared buffer; `start()`/`stop()` manage the transmit thread and
//! the port it drives. Both are idempotent and safe to call from any
//! thread.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::DmxConfig;
use crate::error::{Error, LifecycleError, PortError, Result};
use crate::frame::FrameTransmitter;
use crate::output::{ConfiguredPortFactory, PortFactory};
use crate::scheduler::{SharedPort, TransmitCounters, TransmitScheduler, TransmitStats};
use crate::universe::{create_shared_buffer, SharedChannelBuffer};

/// Lifecycle state of the transmitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitterState {
    Idle,
    Running,
    Stopping,
}

/// Handle on a running transmit thread
struct Worker {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    close_on_exit: Arc<AtomicBool>,
    /// Signalled (or disconnected) when the loop exits
    done_rx: Receiver<()>,
}

/// Continuous DMX512 transmitter
pub struct DmxSender {
    config: DmxConfig,
    buffer: SharedChannelBuffer,
    port: SharedPort,
    factory: Box<dyn PortFactory>,
    counters: Arc<TransmitCounters>,
    state: Mutex<TransmitterState>,
    /// Held for the whole of start/stop so they never interleave
    worker: Mutex<Option<Worker>>,
    /// Loop that missed its stop deadline and has not exited yet
    lingering: Mutex<Option<Worker>>,
}

impl DmxSender {
    /// Open the backend named in `config`
    ///
    /// Fails if the configuration is invalid or the port cannot be opened;
    /// no sender is produced in that case.
    pub fn new(config: DmxConfig) -> Result<Self> {
        Self::with_factory(config, ConfiguredPortFactory)
    }

    /// Open the port through a caller-supplied factory
    pub fn with_factory(config: DmxConfig, factory: impl PortFactory + 'static) -> Result<Self> {
        config.validate()?;

        let port = factory.open(&config).map_err(|e| {
            tracing::error!("Cannot open DMX port {}: {}", config.port, e);
            e
        })?;
        tracing::info!(
            "DMX sender ready on {} ({} channels @ {} baud)",
            port.name(),
            config.channels,
            config.baud_rate
        );

        Ok(Self {
            buffer: create_shared_buffer(config.channels),
            port: Arc::new(Mutex::new(Some(port))),
            factory: Box::new(factory),
            counters: Arc::new(TransmitCounters::default()),
            state: Mutex::new(TransmitterState::Idle),
            worker: Mutex::new(None),
            lingering: Mutex::new(None),
            config,
        })
    }

    /// Set a channel (0-based) to a level clamped into 0..=255
    ///
    /// Out-of-range addresses are logged and ignored. Returns whether the
    /// write landed.
    pub fn update_channel(&self, address: isize, value: i32) -> bool {
        self.buffer.update(address, value)
    }

    /// Like [`update_channel`](Self::update_channel), but reports an
    /// out-of-range address as an error
    pub fn set_channel(&self, address: isize, value: i32) -> Result<()> {
        self.buffer.set(address, value)?;
        Ok(())
    }

    /// Copy of all channel levels
    pub fn snapshot(&self) -> Vec<u8> {
        self.buffer.snapshot()
    }

    /// Level of one channel
    pub fn channel(&self, address: usize) -> Option<u8> {
        self.buffer.get(address)
    }

    /// Apply a run of levels from channel 0 upward, e.g. a loaded scene
    pub fn apply_levels(&self, values: &[i32]) -> usize {
        self.buffer.apply_levels(values)
    }

    /// All channels to zero
    pub fn blackout(&self) {
        self.buffer.blackout();
    }

    /// Shared buffer handle, for collaborators that write from their own threads
    pub fn buffer(&self) -> SharedChannelBuffer {
        Arc::clone(&self.buffer)
    }

    pub fn channel_count(&self) -> usize {
        self.config.channels
    }

    pub fn config(&self) -> &DmxConfig {
        &self.config
    }

    pub fn state(&self) -> TransmitterState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == TransmitterState::Running
    }

    /// Whether the port is open, or `None` while the transmit thread holds it
    pub fn is_port_open(&self) -> Option<bool> {
        self.port.try_lock().map(|slot| slot.is_some())
    }

    pub fn stats(&self) -> TransmitStats {
        self.counters.stats()
    }

    /// Start transmitting at the configured frame interval
    pub fn start(&self) -> Result<()> {
        self.start_with_interval(self.config.frame_interval())
    }

    /// Start transmitting at `interval`; a no-op if already running
    pub fn start_with_interval(&self, interval: Duration) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::debug!("start: already running");
            return Ok(());
        }
        if interval.is_zero() {
            return Err(Error::Config("frame interval must be non-zero".into()));
        }

        self.reap_lingering()?;
        self.ensure_port_open()?;

        let stop = Arc::new(AtomicBool::new(false));
        let close_on_exit = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded::<()>(1);
        let scheduler = TransmitScheduler::new(
            interval,
            Arc::clone(&self.buffer),
            Arc::clone(&self.port),
            FrameTransmitter::new(self.config.channels, self.config.timing()),
            Arc::clone(&stop),
            Arc::clone(&close_on_exit),
            Arc::clone(&self.counters),
        );

        *self.state.lock() = TransmitterState::Running;

        let handle = thread::Builder::new()
            .name("dmx-transmit".to_string())
            .spawn(move || {
                scheduler.run();
                let _ = done_tx.send(());
            })
            .map_err(|e| {
                *self.state.lock() = TransmitterState::Idle;
                LifecycleError::SpawnFailed(e.to_string())
            })?;

        *worker = Some(Worker {
            handle,
            stop,
            close_on_exit,
            done_rx,
        });
        tracing::info!("DMX sender started");
        Ok(())
    }

    /// Stop transmitting and close the port
    ///
    /// Waits at most `shutdown_timeout` for the transmit thread. If it does
    /// not acknowledge in time, the port is closed now when it is free, or
    /// by the thread itself as it exits otherwise. The sender returns to
    /// idle either way. A no-op when not running.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        let Some(current) = worker.take() else {
            tracing::trace!("stop: not running");
            return;
        };

        *self.state.lock() = TransmitterState::Stopping;
        current.stop.store(true, Ordering::Release);

        let timeout = self.config.shutdown_timeout();
        match current.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if current.handle.join().is_err() {
                    tracing::error!("Transmit thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("{}", LifecycleError::ShutdownTimeout(timeout));
                // Set before trying the lock: if the thread still holds the
                // port it will see the flag once it lets go.
                current.close_on_exit.store(true, Ordering::SeqCst);
                *self.lingering.lock() = Some(current);
            }
        }

        self.close_port();
        *self.state.lock() = TransmitterState::Idle;
        tracing::info!("DMX sender stopped");
    }

    /// Wait out a loop left behind by a timed-out `stop()`
    fn reap_lingering(&self) -> Result<()> {
        let mut lingering = self.lingering.lock();
        let Some(old) = lingering.take() else {
            return Ok(());
        };

        match old.done_rx.recv_timeout(self.config.shutdown_timeout()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if old.handle.join().is_err() {
                    tracing::error!("Transmit thread panicked");
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                *lingering = Some(old);
                Err(PortError::Busy(self.config.port.clone()).into())
            }
        }
    }

    fn ensure_port_open(&self) -> Result<()> {
        let mut slot = self
            .port
            .try_lock_for(self.config.timeout())
            .ok_or_else(|| PortError::Busy(self.config.port.clone()))?;
        if slot.is_none() {
            let port = self.factory.open(&self.config)?;
            tracing::info!("Reopened DMX port {}", port.name());
            *slot = Some(port);
        }
        Ok(())
    }

    fn close_port(&self) {
        match self.port.try_lock() {
            Some(mut slot) => {
                if let Some(port) = slot.take() {
                    tracing::info!("Closing DMX port {}", port.name());
                }
            }
            None => tracing::warn!(
                "DMX port {} busy, transmit thread will close it on exit",
                self.config.port
            ),
        }
    }
}

impl Drop for DmxSender {
    fn drop(&mut self) {
        self.stop();
    }
}
