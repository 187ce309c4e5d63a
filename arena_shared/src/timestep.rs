//! Fixed-timestep accumulator.
//!
//! Elapsed wall-clock time is accumulated and converted into whole simulation
//! steps of constant length. The leftover fraction is carried over to the next
//! call instead of being reset, so irregular callback intervals neither lose
//! nor gain time. The same type drives the server room and the client loop.

use std::{convert::Infallible, time::Duration};

use tracing::warn;

/// Fixed-step scheduler.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: Duration,
    accumulator: Duration,
    /// Safety cap on steps executed by a single `advance`.
    max_steps: Option<u32>,
    ticks: u64,
    stopped: bool,
}

impl FixedTimestep {
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.max(Duration::from_nanos(1)),
            accumulator: Duration::ZERO,
            max_steps: None,
            ticks: 0,
            stopped: false,
        }
    }

    /// Step length of `1s / hz`.
    pub fn from_hz(hz: u32) -> Self {
        Self::new(Duration::from_nanos(1_000_000_000 / u64::from(hz.max(1))))
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps.max(1));
        self
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Time accumulated but not yet consumed by a step.
    pub fn accumulated(&self) -> Duration {
        self.accumulator
    }

    /// Number of steps run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Stops the scheduler for good. Later `advance` calls run nothing.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.accumulator = Duration::ZERO;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Adds `delta` and runs `on_step` once per whole step now due.
    ///
    /// Returns the number of steps run.
    pub fn advance<F: FnMut(u64)>(&mut self, delta: Duration, mut on_step: F) -> u32 {
        match self.try_advance(delta, |tick| {
            on_step(tick);
            Ok::<(), Infallible>(())
        }) {
            Ok(n) => n,
            Err(never) => match never {},
        }
    }

    /// Like [`advance`](Self::advance) but stops at the first failing step.
    ///
    /// On error the remaining accumulated time is left in place.
    pub fn try_advance<E, F>(&mut self, delta: Duration, mut on_step: F) -> Result<u32, E>
    where
        F: FnMut(u64) -> Result<(), E>,
    {
        if self.stopped {
            return Ok(0);
        }

        self.accumulator += delta;
        let mut steps = 0u32;
        while self.accumulator >= self.step {
            if self.max_steps.is_some_and(|cap| steps >= cap) {
                self.drop_backlog();
                break;
            }
            self.accumulator -= self.step;
            self.ticks += 1;
            steps += 1;
            on_step(self.ticks)?;
        }
        Ok(steps)
    }

    /// Discards whole steps beyond the cap, keeping the sub-step remainder.
    fn drop_backlog(&mut self) {
        let step_ns = self.step.as_nanos();
        let acc_ns = self.accumulator.as_nanos();
        let dropped = acc_ns / step_ns;
        self.accumulator = Duration::from_nanos((acc_ns % step_ns) as u64);
        warn!(
            dropped_steps = dropped as u64,
            cap = self.max_steps.unwrap_or_default(),
            "Fixed timestep fell behind, dropping backlog"
        );
    }
}
