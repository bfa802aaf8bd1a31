//! Frame-rate pacing.
//!
//! Pacing is per step: before each read the producer waits for whatever is
//! left of the target frame delay since the previous read completed. Drift
//! across frames is not compensated.
//!
//! All time goes through [`Clock`] so retry delays and pacing waits can be
//! observed in tests without sleeping.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of time and blocking waits for a producer.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block the calling producer for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant::now` and `std::thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Manually driven clock. `sleep` advances time instantly and records the
/// requested duration.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualClockState>,
}

#[derive(Debug, Default)]
struct ManualClockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualClockState::default()),
        }
    }

    /// Move time forward without recording a sleep (simulates work).
    pub fn advance(&self, duration: Duration) {
        self.lock().elapsed += duration;
    }

    /// Total time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualClockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().elapsed
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

/// Target delay between frames for `target_fps`. Zero disables pacing.
pub fn frame_delay(target_fps: f64) -> Duration {
    if target_fps.is_finite() && target_fps > 0.0 {
        Duration::from_secs_f64(1.0 / target_fps)
    } else {
        Duration::ZERO
    }
}

/// Remaining wait given the time `elapsed` since the last read.
pub fn wait_duration(elapsed: Duration, target_delay: Duration) -> Duration {
    target_delay.saturating_sub(elapsed)
}

/// Per-producer pacing state.
#[derive(Clone, Debug)]
pub struct Pacer {
    frame_delay: Duration,
    last_frame_at: Option<Instant>,
}

impl Pacer {
    pub fn new(target_fps: f64) -> Self {
        Self {
            frame_delay: frame_delay(target_fps),
            last_frame_at: None,
        }
    }

    pub fn frame_delay(&self) -> Duration {
        self.frame_delay
    }

    /// How long to wait at `now` before the next read may start.
    ///
    /// The first read has no predecessor and is never delayed.
    pub fn next_frame_deadline(&self, now: Instant) -> Duration {
        match self.last_frame_at {
            Some(last) => wait_duration(now.saturating_duration_since(last), self.frame_delay),
            None => Duration::ZERO,
        }
    }

    /// Block on `clock` until the next read is due.
    pub fn wait(&self, clock: &dyn Clock) {
        let remaining = self.next_frame_deadline(clock.now());
        if !remaining.is_zero() {
            clock.sleep(remaining);
        }
    }

    /// Record the completion of a read attempt.
    pub fn mark_frame(&mut self, at: Instant) {
        self.last_frame_at = Some(at);
    }

    pub fn reset(&mut self) {
        self.last_frame_at = None;
    }
}
