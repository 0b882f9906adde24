//! Hardware sample ring.
//!
//! A fixed-size single-producer/single-consumer ring of mono `i16`
//! samples. The engine worker is the only producer; the consumer is a
//! drain thread that advances the read index at wall-clock rate,
//! emulating a DMA-driven codec on host. On target hardware the DMA
//! completion handler advances the read index instead; nothing else in
//! the system may assume more than "read advances monotonically at the
//! sink sample rate".
//!
//! One slot is kept as a sentinel so a full ring stays distinguishable
//! from an empty one: `used <= RING_SIZE - 1` always.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use crate::types::Sample;

/// Ring capacity in samples (one slot reserved as sentinel).
pub const RING_SIZE: usize = 16384;

/// Samples faded to zero by a flush.
pub const FADE_SAMPLES: usize = 200;

/// Sink rate applied when a zero rate is requested.
pub const DEFAULT_SAMPLE_RATE: u32 = 128_000;

struct RingShared {
    buf: UnsafeCell<[Sample; RING_SIZE]>,
    write: AtomicUsize,
    read: AtomicUsize,
    sample_rate: AtomicU32,
    started: AtomicBool,
    shutdown: AtomicBool,
}

// SAFETY: `buf` is only written through the producer handle (`HwRing`,
// which requires `&mut self` for sample access) and only read through the
// consumer side. Producer and consumer operate on disjoint index ranges
// guarded by the acquire/release pairing on `write` and `read`.
unsafe impl Send for RingShared {}
unsafe impl Sync for RingShared {}

impl RingShared {
    fn used(&self) -> usize {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Acquire);
        if w >= r {
            w - r
        } else {
            RING_SIZE - r + w
        }
    }

    fn free_space(&self) -> usize {
        RING_SIZE - 1 - self.used()
    }
}

/// Two-segment writable view into the ring.
///
/// `first` starts at the write index and runs to the ring boundary (or the
/// end of free space); `second` is the wrapped remainder. The resampler
/// writes across both without any intermediate buffer.
pub struct WriteRegion<'a> {
    pub first: &'a mut [Sample],
    pub second: &'a mut [Sample],
}

impl WriteRegion<'_> {
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.second.is_empty()
    }
}

/// Producer handle and lifecycle owner for the hardware ring.
pub struct HwRing {
    shared: Arc<RingShared>,
    drain: Option<JoinHandle<()>>,
}

impl HwRing {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RingShared {
                buf: UnsafeCell::new([0; RING_SIZE]),
                write: AtomicUsize::new(0),
                read: AtomicUsize::new(0),
                sample_rate: AtomicU32::new(DEFAULT_SAMPLE_RATE),
                started: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
            drain: None,
        }
    }

    /// Set the sink sample rate. Zero selects the default.
    pub fn set_sample_rate(&self, rate: u32) {
        let rate = if rate == 0 { DEFAULT_SAMPLE_RATE } else { rate };
        debug!("sink sample rate set to {rate} Hz");
        self.shared.sample_rate.store(rate, Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Relaxed)
    }

    /// Reset both indices and launch the drain thread if it is not
    /// already running.
    pub fn start(&mut self) {
        if self.shared.started.load(Ordering::Relaxed) {
            return;
        }
        self.shared.write.store(0, Ordering::Relaxed);
        self.shared.read.store(0, Ordering::Relaxed);
        self.shared.started.store(true, Ordering::Release);
        if self.drain.is_none() {
            let shared = Arc::clone(&self.shared);
            self.drain = Some(
                thread::Builder::new()
                    .name("hw-ring-drain".into())
                    .spawn(move || drain_loop(shared))
                    .expect("spawn ring drain thread"),
            );
        }
    }

    /// Stop consumption. The drain thread idles until `start` again.
    pub fn stop(&self) {
        self.shared.started.store(false, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Relaxed)
    }

    /// Samples currently buffered.
    pub fn used(&self) -> usize {
        self.shared.used()
    }

    /// Writable samples remaining (one slot sentinel excluded).
    pub fn free_space(&self) -> usize {
        self.shared.free_space()
    }

    /// Block in 1 ms ticks until at least `min_samples` of space is free,
    /// the timeout expires, or the ring is stopped. On success the region
    /// covers all free space, not just `min_samples`; on timeout it is
    /// empty.
    pub fn acquire_write(&mut self, min_samples: usize, timeout: Duration) -> WriteRegion<'_> {
        let mut waited = Duration::ZERO;
        while self.shared.free_space() < min_samples {
            if !self.is_started() || waited >= timeout {
                return WriteRegion { first: &mut [], second: &mut [] };
            }
            thread::sleep(Duration::from_millis(1));
            waited += Duration::from_millis(1);
        }

        let avail = self.shared.free_space();
        if avail == 0 {
            return WriteRegion { first: &mut [], second: &mut [] };
        }
        let w = self.shared.write.load(Ordering::Relaxed);
        let to_end = RING_SIZE - w;

        // SAFETY: [w, w + avail) is the free region; the consumer only
        // touches [read, write) and `&mut self` excludes any other
        // producer. The two slices never overlap.
        let base = self.shared.buf.get() as *mut Sample;
        unsafe {
            if to_end >= avail {
                WriteRegion {
                    first: std::slice::from_raw_parts_mut(base.add(w), avail),
                    second: &mut [],
                }
            } else {
                WriteRegion {
                    first: std::slice::from_raw_parts_mut(base.add(w), to_end),
                    second: std::slice::from_raw_parts_mut(base, avail - to_end),
                }
            }
        }
    }

    /// Publish `written` samples; pairs with a preceding `acquire_write`.
    pub fn commit_write(&self, written: usize) {
        let w = self.shared.write.load(Ordering::Relaxed);
        self.shared
            .write
            .store((w + written) % RING_SIZE, Ordering::Release);
    }

    /// Drop all pending samples. With `fade_out` the last
    /// [`FADE_SAMPLES`] written samples are first ramped linearly to zero
    /// in place, so the cut lands softly on source switches.
    pub fn flush(&mut self, fade_out: bool) {
        if fade_out {
            let w = self.shared.write.load(Ordering::Relaxed);
            // SAFETY: exclusive producer access via &mut self; the host
            // consumer advances indices without dereferencing samples.
            let base = self.shared.buf.get() as *mut Sample;
            for i in 0..FADE_SAMPLES.min(RING_SIZE) {
                let idx = (w + RING_SIZE - 1 - i) % RING_SIZE;
                let scale = (FADE_SAMPLES - i) as i32;
                unsafe {
                    let s = base.add(idx);
                    *s = (i32::from(*s) * scale / FADE_SAMPLES as i32) as Sample;
                }
            }
        }
        let r = self.shared.read.load(Ordering::Acquire);
        self.shared.write.store(r, Ordering::Release);
        trace!("ring flushed (fade={fade_out})");
    }

    /// Consumer-side read: copy up to `dst.len()` buffered samples out and
    /// advance the read index. This is what a DMA completion handler does
    /// on target; on host it exists for tests and capture tools. Must not
    /// run concurrently with the drain thread, which is the usual
    /// consumer.
    pub fn consume(&self, dst: &mut [Sample]) -> usize {
        let avail = self.shared.used();
        let count = dst.len().min(avail);
        if count == 0 {
            return 0;
        }
        let r = self.shared.read.load(Ordering::Relaxed);
        let first = count.min(RING_SIZE - r);
        // SAFETY: [r, r + count) holds committed samples the producer will
        // not touch until the read index moves past them.
        let base = self.shared.buf.get() as *const Sample;
        unsafe {
            std::ptr::copy_nonoverlapping(base.add(r), dst.as_mut_ptr(), first);
            if count > first {
                std::ptr::copy_nonoverlapping(base, dst[first..].as_mut_ptr(), count - first);
            }
        }
        self.shared
            .read
            .store((r + count) % RING_SIZE, Ordering::Release);
        count
    }
}

impl Default for HwRing {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HwRing {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.drain.take() {
            let _ = handle.join();
        }
    }
}

/// Wall-clock consumer: every millisecond, discard one millisecond of
/// audio at the configured sink rate.
fn drain_loop(shared: Arc<RingShared>) {
    debug!("ring drain thread running");
    while !shared.shutdown.load(Ordering::Acquire) {
        if !shared.started.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(10));
            continue;
        }
        let rate = shared.sample_rate.load(Ordering::Relaxed);
        let budget = (rate / 1000).max(1) as usize;

        let w = shared.write.load(Ordering::Acquire);
        let r = shared.read.load(Ordering::Relaxed);
        let avail = if w >= r { w - r } else { RING_SIZE - r + w };

        let consume = budget.min(avail);
        if consume > 0 {
            shared.read.store((r + consume) % RING_SIZE, Ordering::Release);
        }
        thread::sleep(Duration::from_millis(1));
    }
    debug!("ring drain thread exiting");
}
