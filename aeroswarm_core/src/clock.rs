//! Virtual time for the simulation kernel.
//!
//! Every subsystem reads time exclusively through [`SimClock`]; there are no
//! direct host-clock calls inside the core. Two implementations exist:
//!
//! - [`SteppableClock`] advances only when `step()` is called, by exactly one
//!   period. Driving the kernel with it makes a run fully deterministic.
//! - [`ScalableClock`] tracks wall time multiplied by a scale factor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic virtual time in nanoseconds since simulation start.
pub type TimePoint = u64;

/// Signed duration in nanoseconds.
pub type TimeDelta = i64;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Converts seconds to a nanosecond duration.
pub fn sec_to_nanos(seconds: f64) -> TimeDelta {
    (seconds * NANOS_PER_SEC) as TimeDelta
}

/// Converts a nanosecond duration to seconds.
pub fn nanos_to_sec(nanos: TimeDelta) -> f64 {
    nanos as f64 / NANOS_PER_SEC
}

/// The clock interface every subsystem reads time through.
pub trait SimClock: Send + Sync {
    /// Current virtual time.
    fn now(&self) -> TimePoint;

    /// Blocks (or advances virtual time) for the given number of simulated
    /// seconds. Never called while any lock is held.
    fn sleep_for(&self, seconds: f64);

    /// Rewinds the clock to zero. The only permitted non-monotonic motion.
    fn reset_time(&self);

    /// Signed delta between two time points, `later - earlier`.
    fn elapsed_between(&self, later: TimePoint, earlier: TimePoint) -> TimeDelta {
        later as TimeDelta - earlier as TimeDelta
    }

    /// Seconds elapsed since `earlier`.
    fn elapsed_since(&self, earlier: TimePoint) -> f64 {
        nanos_to_sec(self.elapsed_between(self.now(), earlier))
    }

    /// Returns the delta since `last` and stores the current time into it.
    fn update_since(&self, last: &mut TimePoint) -> TimeDelta {
        let now = self.now();
        let delta = self.elapsed_between(now, *last);
        *last = now;
        delta
    }
}

/// Clock that advances only on explicit `step()` calls.
///
/// Clock-speed policy: a speed below 1.0 scales the step period itself (each
/// step advances `period * speed`), while a speed of 1.0 or above leaves the
/// step period intact and the driving loop is expected to shorten its wall
/// pacing instead. Tests pin this behavior.
pub struct SteppableClock {
    current_ns: AtomicU64,
    period_ns: u64,
    clock_speed: f64,
}

impl SteppableClock {
    /// Default physics period, about 3 ms.
    pub const DEFAULT_PERIOD_NS: u64 = 3_000_000;

    /// Creates a steppable clock with the given step period and speed.
    pub fn new(period_ns: u64, clock_speed: f64) -> Self {
        Self {
            current_ns: AtomicU64::new(0),
            period_ns,
            clock_speed,
        }
    }

    /// Nanoseconds one `step()` advances the clock by.
    pub fn step_delta(&self) -> u64 {
        if self.clock_speed < 1.0 {
            (self.period_ns as f64 * self.clock_speed) as u64
        } else {
            self.period_ns
        }
    }

    /// Advances virtual time by exactly one period.
    pub fn step(&self) {
        self.current_ns.fetch_add(self.step_delta(), Ordering::SeqCst);
    }

    /// Advances virtual time by an arbitrary nanosecond amount.
    pub fn step_by(&self, delta_ns: u64) {
        self.current_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }

    /// The configured step period in nanoseconds, unscaled.
    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    /// The configured clock speed.
    pub fn clock_speed(&self) -> f64 {
        self.clock_speed
    }
}

impl Default for SteppableClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERIOD_NS, 1.0)
    }
}

impl SimClock for SteppableClock {
    fn now(&self) -> TimePoint {
        self.current_ns.load(Ordering::SeqCst)
    }

    fn sleep_for(&self, seconds: f64) {
        // Under a steppable clock, sleeping is just advancing virtual time.
        self.step_by(sec_to_nanos(seconds).max(0) as u64);
    }

    fn reset_time(&self) {
        self.current_ns.store(0, Ordering::SeqCst);
    }
}

/// Clock that tracks wall time, multiplied by a scale factor.
pub struct ScalableClock {
    epoch: Mutex<Instant>,
    scale: f64,
}

impl ScalableClock {
    /// Creates a clock running at `scale` times wall speed.
    pub fn new(scale: f64) -> Self {
        Self {
            epoch: Mutex::new(Instant::now()),
            scale,
        }
    }

    /// The configured scale factor.
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Default for ScalableClock {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SimClock for ScalableClock {
    fn now(&self) -> TimePoint {
        let epoch = self.epoch.lock().unwrap();
        (epoch.elapsed().as_nanos() as f64 * self.scale) as TimePoint
    }

    fn sleep_for(&self, seconds: f64) {
        // A simulated second takes 1/scale wall seconds.
        std::thread::sleep(Duration::from_secs_f64(seconds / self.scale));
    }

    fn reset_time(&self) {
        *self.epoch.lock().unwrap() = Instant::now();
    }
}
