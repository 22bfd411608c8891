//! Elapsed-budget bandwidth throttle.
//!
//! One [`Throttle`] lives for one transfer. It remembers when the window
//! started and how many bytes were let through since; before each chunk it
//! computes how far ahead of the cap the transfer would be and sleeps off the
//! excess. Long-run throughput stays at or under the cap without fixed time
//! slices.
//!
//! ```text
//! expected = elapsed_secs * cap
//! sent + c <= expected  → emit now
//! otherwise             → sleep ((sent + c) - expected) / cap, then emit
//! ```
//!
//! Chunk size follows the cap so throttling stays smooth: an uncapped
//! transfer uses the configured default chunk, a capped one roughly a tenth
//! of the per-second budget.

use tokio::time::{Duration, Instant};

/// Default chunk for uncapped transfers (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 65_536;

/// Smallest chunk handed to a copy loop, whatever the cap.
pub const MIN_CHUNK_SIZE: usize = 4_096;

/// Chunk size for a transfer running under `cap` bytes/sec.
///
/// `default_chunk` is the uncapped size and also the upper bound for capped
/// transfers.
pub fn chunk_size_for(cap: Option<u64>, default_chunk: usize) -> usize {
    let default_chunk = default_chunk.max(MIN_CHUNK_SIZE);
    match cap {
        None => default_chunk,
        Some(bps) => {
            let tenth = usize::try_from(bps / 10).unwrap_or(usize::MAX);
            tenth.clamp(MIN_CHUNK_SIZE, default_chunk)
        }
    }
}

/// Per-transfer throttle state.
#[derive(Debug)]
pub struct Throttle {
    cap: Option<u64>,
    window: Option<Window>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    sent: u64,
}

impl Throttle {
    pub fn new(cap: Option<u64>) -> Self {
        Self { cap, window: None }
    }

    pub fn cap(&self) -> Option<u64> {
        self.cap
    }

    /// Switch to a new cap. A change restarts the accounting window so the
    /// new rate applies from now on rather than retroactively.
    pub fn set_cap(&mut self, cap: Option<u64>) {
        if cap != self.cap {
            self.cap = cap;
            self.window = None;
        }
    }

    /// How long to wait before emitting a chunk of `len` bytes at `now`.
    /// Records the chunk as sent.
    pub fn delay_for(&mut self, len: usize, now: Instant) -> Duration {
        let Some(cap) = self.cap.filter(|c| *c > 0) else {
            return Duration::ZERO;
        };
        let window = self.window.get_or_insert(Window { started: now, sent: 0 });

        let elapsed = now.saturating_duration_since(window.started).as_secs_f64();
        let expected = elapsed * cap as f64;
        let after = (window.sent + len as u64) as f64;
        window.sent += len as u64;

        if after <= expected {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((after - expected) / cap as f64)
        }
    }

    /// Wait as long as the cap requires before a chunk of `len` bytes.
    pub async fn admit(&mut self, len: usize) {
        let delay = self.delay_for(len, Instant::now());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
