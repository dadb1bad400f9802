//! Shared ring carrying the monitored channel's samples to the audio
//! callback.
//!
//! The producer is the streaming tick; the consumer is a free-running audio
//! callback that pulls fixed-size frames on its own clock. The two sides
//! share a [`MonitorRing`]: sample storage behind a mutex, plus monotonic
//! write/read cursors masked onto the buffer on use. Cursor stores happen
//! while the buffer lock is held, so a reset or reconfigure can never
//! interleave with a half-finished copy and the callback never observes a
//! mix of two channels' audio.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::MONITOR_BUFFER_SECONDS;

/// Lock-guarded PCM ring between the streaming tick and the audio callback.
pub struct MonitorRing {
    buffer: Mutex<Vec<i16>>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

/// Ring depth for a sample rate, rounded up to a power of two so cursor
/// masking stays a single AND.
fn frames_for(sample_rate: f32) -> usize {
    ((MONITOR_BUFFER_SECONDS * sample_rate).ceil() as usize)
        .max(1)
        .next_power_of_two()
}

impl MonitorRing {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            buffer: Mutex::new(vec![0; frames_for(sample_rate)]),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Samples written but not yet consumed, capped at the ring depth.
    pub fn available(&self) -> usize {
        let buffer = self.buffer.lock();
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        (write - read).min(buffer.len())
    }

    /// Appends PCM at the write cursor. A block longer than the ring keeps
    /// only its most recent `capacity` samples, but the cursor still
    /// advances by the full length so the consumer's lap arithmetic stays
    /// truthful.
    pub fn write(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }

        let mut buffer = self.buffer.lock();
        let capacity = buffer.len();
        let mask = capacity - 1;
        let write = self.write_pos.load(Ordering::Acquire);

        let n = samples.len();
        let (kept, position) = if n > capacity {
            (&samples[n - capacity..], write + (n - capacity))
        } else {
            (samples, write)
        };

        let start = position & mask;
        let first = kept.len().min(capacity - start);
        buffer[start..start + first].copy_from_slice(&kept[..first]);
        buffer[..kept.len() - first].copy_from_slice(&kept[first..]);

        self.write_pos.store(write + n, Ordering::Release);
    }

    /// Fills `dest` for the audio callback. Consumes what is available and
    /// zero-pads the rest; the read cursor advances only past consumed
    /// samples, so an under-run costs silence, never a skip. A consumer
    /// that fell more than one ring behind jumps forward to the oldest
    /// sample still present.
    pub fn read(&self, dest: &mut [i16]) {
        let buffer = self.buffer.lock();
        let capacity = buffer.len();
        let mask = capacity - 1;
        let write = self.write_pos.load(Ordering::Acquire);
        let mut read = self.read_pos.load(Ordering::Acquire);

        if write - read > capacity {
            read = write - capacity;
        }

        let available = (write - read).min(dest.len());
        let start = read & mask;
        let first = available.min(capacity - start);
        dest[..first].copy_from_slice(&buffer[start..start + first]);
        dest[first..available].copy_from_slice(&buffer[..available - first]);

        if available < dest.len() {
            dest[available..].fill(0);
            debug!(
                "[monitor] under-run: padded {} of {} frames",
                dest.len() - available,
                dest.len()
            );
        }

        self.read_pos.store(read + available, Ordering::Release);
    }

    /// Zeroes the ring and rewinds both cursors. Runs under the buffer
    /// lock, so in-flight reads and writes complete on the old contents
    /// before the ring comes back empty.
    pub fn reset(&self) {
        let mut buffer = self.buffer.lock();
        buffer.fill(0);
        self.write_pos.store(0, Ordering::Release);
        self.read_pos.store(0, Ordering::Release);
    }

    /// Re-sizes the ring for a new sample rate and leaves it empty.
    pub fn reconfigure(&self, sample_rate: f32) {
        let mut buffer = self.buffer.lock();
        let capacity = frames_for(sample_rate);
        buffer.clear();
        buffer.resize(capacity, 0);
        self.write_pos.store(0, Ordering::Release);
        self.read_pos.store(0, Ordering::Release);
    }
}
