//! FIFO delay line used to model sensor output latency.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::clock::{SimClock, TimeDelta, TimePoint};
use crate::error::SimError;
use crate::updatable::{Lifecycle, Updatable};

/// A queue of values that become visible only after a fixed delay.
///
/// A pushed value exits once `now - push_time >= delay`; outputs are emitted
/// in FIFO order, at most one per update. Until the first value exits, the
/// output is `T::default()`.
pub struct DelayLine<T> {
    lifecycle: Lifecycle,
    clock: Arc<dyn SimClock>,
    delay: TimeDelta,
    values: VecDeque<T>,
    times: VecDeque<TimePoint>,
    last_value: T,
    last_time: TimePoint,
}

impl<T: Clone + Default> DelayLine<T> {
    /// Creates a delay line with the given delay in seconds.
    pub fn new(clock: Arc<dyn SimClock>, delay_sec: f64) -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            clock,
            delay: crate::clock::sec_to_nanos(delay_sec),
            values: VecDeque::new(),
            times: VecDeque::new(),
            last_value: T::default(),
            last_time: 0,
        }
    }

    pub fn delay_sec(&self) -> f64 {
        crate::clock::nanos_to_sec(self.delay)
    }

    /// Queues a value stamped `time_offset` nanoseconds into the future.
    pub fn push(&mut self, value: T, time_offset: TimeDelta) {
        self.values.push_back(value);
        self.times
            .push_back((self.clock.now() as TimeDelta + time_offset) as TimePoint);
    }

    /// The most recently emitted value.
    pub fn get_output(&self) -> T {
        self.last_value.clone()
    }

    /// Time stamp of the most recently emitted value.
    pub fn output_time(&self) -> TimePoint {
        self.last_time
    }

    pub fn queued(&self) -> usize {
        self.values.len()
    }
}

impl<T: Clone + Default> Updatable for DelayLine<T> {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.values.clear();
        self.times.clear();
        self.last_value = T::default();
        self.last_time = 0;
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("delay line")?;
        if let Some(&front_time) = self.times.front() {
            if self.clock.elapsed_between(self.clock.now(), front_time) >= self.delay {
                self.last_value = self.values.pop_front().unwrap_or_default();
                self.last_time = front_time;
                self.times.pop_front();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SteppableClock;

    #[test]
    fn test_output_respects_delay() {
        // delay=0.1s; push v1 at t=0, v2 at t=0.05; expect v1 at t=0.11 and
        // v2 at t=0.16.
        let clock = Arc::new(SteppableClock::new(10_000_000, 1.0)); // 10 ms steps
        let mut line: DelayLine<i32> = DelayLine::new(clock.clone(), 0.1);
        line.reset();

        line.push(1, 0);
        for _ in 0..5 {
            clock.step();
            line.update().unwrap();
        }
        // t = 0.05
        line.push(2, 0);
        assert_eq!(line.get_output(), 0, "nothing due before the delay elapses");

        for _ in 0..6 {
            clock.step();
            line.update().unwrap();
        }
        // t = 0.11
        assert_eq!(line.get_output(), 1);

        for _ in 0..5 {
            clock.step();
            line.update().unwrap();
        }
        // t = 0.16
        assert_eq!(line.get_output(), 2);
    }

    #[test]
    fn test_emits_in_fifo_order() {
        let clock = Arc::new(SteppableClock::new(1_000_000, 1.0));
        let mut line: DelayLine<i32> = DelayLine::new(clock.clone(), 0.0);
        line.reset();
        line.push(10, 0);
        line.push(20, 0);
        clock.step();
        line.update().unwrap();
        assert_eq!(line.get_output(), 10);
        line.update().unwrap();
        assert_eq!(line.get_output(), 20);
    }

    #[test]
    fn test_reset_clears_queue_and_output() {
        let clock = Arc::new(SteppableClock::new(1_000_000, 1.0));
        let mut line: DelayLine<i32> = DelayLine::new(clock.clone(), 0.0);
        line.reset();
        line.push(7, 0);
        clock.step();
        line.update().unwrap();
        assert_eq!(line.get_output(), 7);
        line.reset();
        assert_eq!(line.get_output(), 0);
        assert_eq!(line.queued(), 0);
    }
}
