//! Fixed-size channel intensity buffer
//!
//! Any number of threads write single channels; the transmit thread takes
//! one copy per frame. The lock is only held for a bounds check, a store
//! or a memcpy, never across I/O.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ChannelError;

/// Clamp an arbitrary integer level into the 0..=255 range
pub fn clamp_level(value: i32) -> u8 {
    value.clamp(0, u8::MAX as i32) as u8
}

/// One universe of channel levels
pub struct ChannelBuffer {
    levels: Mutex<Box<[u8]>>,
    /// Writes rejected for being outside the universe
    rejected_writes: AtomicU64,
}

impl ChannelBuffer {
    /// Create a buffer of `channels` levels, all zero
    pub fn new(channels: usize) -> Self {
        Self {
            levels: Mutex::new(vec![0u8; channels].into_boxed_slice()),
            rejected_writes: AtomicU64::new(0),
        }
    }

    /// Number of channels; fixed for the buffer's lifetime
    pub fn len(&self) -> usize {
        self.levels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a clamped level at a 0-based address
    pub fn set(&self, address: isize, value: i32) -> Result<(), ChannelError> {
        let mut levels = self.levels.lock();
        let channels = levels.len();
        match usize::try_from(address).ok().filter(|&a| a < channels) {
            Some(index) => {
                levels[index] = clamp_level(value);
                Ok(())
            }
            None => {
                drop(levels);
                self.rejected_writes.fetch_add(1, Ordering::Relaxed);
                Err(ChannelError::OutOfRange { address, channels })
            }
        }
    }

    /// Store a clamped level, logging and ignoring out-of-range addresses
    ///
    /// Returns whether the write landed.
    pub fn update(&self, address: isize, value: i32) -> bool {
        match self.set(address, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("update_channel ignored: {}", e);
                false
            }
        }
    }

    /// Read one channel
    pub fn get(&self, address: usize) -> Option<u8> {
        self.levels.lock().get(address).copied()
    }

    /// Independent copy of all levels
    pub fn snapshot(&self) -> Vec<u8> {
        self.levels.lock().to_vec()
    }

    /// Copy all levels into `out`, which must be exactly `len()` long
    pub fn snapshot_into(&self, out: &mut [u8]) -> Result<(), ChannelError> {
        let levels = self.levels.lock();
        if out.len() != levels.len() {
            return Err(ChannelError::LengthMismatch {
                expected: levels.len(),
                actual: out.len(),
            });
        }
        out.copy_from_slice(&levels);
        Ok(())
    }

    /// Apply an ordered run of levels starting at address 0
    ///
    /// Entries beyond the universe are dropped with a warning. Returns the
    /// number of channels written.
    pub fn apply_levels(&self, values: &[i32]) -> usize {
        let mut levels = self.levels.lock();
        let count = values.len().min(levels.len());
        for (slot, &value) in levels.iter_mut().zip(values) {
            *slot = clamp_level(value);
        }
        let channels = levels.len();
        drop(levels);

        if values.len() > channels {
            tracing::warn!(
                "apply_levels: {} values for {} channels, extra ignored",
                values.len(),
                channels
            );
        }
        count
    }

    /// Set every channel to zero
    pub fn blackout(&self) {
        self.levels.lock().fill(0);
    }

    /// Count of rejected out-of-range writes
    pub fn rejected_writes(&self) -> u64 {
        self.rejected_writes.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a channel buffer
pub type SharedChannelBuffer = Arc<ChannelBuffer>;

/// Create a new shared channel buffer
pub fn create_shared_buffer(channels: usize) -> SharedChannelBuffer {
    Arc::new(ChannelBuffer::new(channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn test_clamps_high_and_low() {
        let buffer = ChannelBuffer::new(512);

        assert!(buffer.update(0, 300));
        assert_eq!(buffer.snapshot()[0], 255);

        assert!(buffer.update(0, -10));
        assert_eq!(buffer.snapshot()[0], 0);
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let buffer = ChannelBuffer::new(8);
        buffer.update(7, 42);
        let before = buffer.snapshot();

        assert!(!buffer.update(8, 10));
        assert!(!buffer.update(-1, 10));
        assert_eq!(
            buffer.set(100, 1),
            Err(ChannelError::OutOfRange { address: 100, channels: 8 })
        );

        assert_eq!(buffer.snapshot(), before);
        assert_eq!(buffer.rejected_writes(), 3);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let buffer = ChannelBuffer::new(4);
        buffer.update(1, 9);
        let snap = buffer.snapshot();
        buffer.update(1, 200);

        assert_eq!(snap, vec![0, 9, 0, 0]);
        assert_eq!(buffer.get(1), Some(200));
        assert_eq!(buffer.get(4), None);
    }

    #[test]
    fn test_snapshot_into_rejects_wrong_length() {
        let buffer = ChannelBuffer::new(4);
        let mut short = [0u8; 3];

        assert_eq!(
            buffer.snapshot_into(&mut short),
            Err(ChannelError::LengthMismatch { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn test_apply_levels_and_blackout() {
        let buffer = ChannelBuffer::new(4);

        assert_eq!(buffer.apply_levels(&[10, 300, -5]), 3);
        assert_eq!(buffer.snapshot(), vec![10, 255, 0, 0]);

        assert_eq!(buffer.apply_levels(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(buffer.snapshot(), vec![1, 2, 3, 4]);

        buffer.blackout();
        assert_eq!(buffer.snapshot(), vec![0; 4]);
    }

    #[test]
    fn test_concurrent_writers_never_tear_snapshot() {
        // Each writer fills the whole universe with one value, so a
        // consistent snapshot is always uniform.
        let buffer = create_shared_buffer(512);
        let writers: Vec<_> = (0..4)
            .map(|id| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        buffer.apply_levels(&[id * 60; 512]);
                    }
                })
            })
            .collect();

        let mut out = vec![0u8; 512];
        for _ in 0..200 {
            buffer.snapshot_into(&mut out).unwrap();
            assert!(out.iter().all(|&v| v == out[0]));
        }

        for writer in writers {
            writer.join().unwrap();
        }
    }

    proptest! {
        #[test]
        fn prop_in_range_write_is_clamped(address in 0isize..512, value in -1000i32..=1000) {
            let buffer = ChannelBuffer::new(512);
            buffer.update(address, value);
            prop_assert_eq!(buffer.snapshot()[address as usize] as i32, value.clamp(0, 255));
        }

        #[test]
        fn prop_out_of_range_write_changes_nothing(
            address in prop_oneof![-10_000isize..0, 512isize..10_000],
            value in -1000i32..=1000,
        ) {
            let buffer = ChannelBuffer::new(512);
            buffer.update(3, 77);
            let before = buffer.snapshot();
            buffer.update(address, value);
            prop_assert_eq!(buffer.snapshot(), before);
        }
    }
}
