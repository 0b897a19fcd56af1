//! Simulation clock.
//!
//! Converts wall-clock time into a whole number of fixed physics steps.
//! Elapsed time accumulates as lag; each tick consumes as many fixed steps as
//! the lag covers, up to `max_sub_steps`. When the clamp kicks in the excess
//! lag is dropped, so a stalled scheduler never causes an unbounded catch-up
//! burst. Resuming or resetting re-anchors the clock at the current instant
//! and clears the lag, so a paused interval is never fast-forwarded.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Running,
    Paused,
}

#[derive(Debug, Clone)]
pub struct SimulationClock {
    fixed_step: f64,
    max_sub_steps: u32,
    state: ClockState,
    last_step: Option<Instant>,
    lag: f64,
}

impl SimulationClock {
    pub fn new(fixed_step: f64, max_sub_steps: u32) -> Self {
        Self {
            fixed_step,
            max_sub_steps: max_sub_steps.max(1),
            state: ClockState::Running,
            last_step: None,
            lag: 0.0,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == ClockState::Paused
    }

    pub fn fixed_step(&self) -> f64 {
        self.fixed_step
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.fixed_step)
    }

    /// Unconsumed wall time in seconds.
    pub fn lag(&self) -> f64 {
        self.lag
    }

    /// Returns how many fixed steps to run for this tick.
    pub fn advance(&mut self, now: Instant) -> u32 {
        if self.state == ClockState::Paused {
            return 0;
        }
        let Some(last) = self.last_step.replace(now) else {
            return 0;
        };
        self.lag += now.saturating_duration_since(last).as_secs_f64();

        let due = (self.lag / self.fixed_step).floor();
        if due > f64::from(self.max_sub_steps) {
            self.lag %= self.fixed_step;
            self.max_sub_steps
        } else {
            let steps = due as u32;
            self.lag -= f64::from(steps) * self.fixed_step;
            steps
        }
    }

    /// Running -> Paused. Returns `false` if already paused.
    pub fn pause(&mut self) -> bool {
        if self.state == ClockState::Paused {
            return false;
        }
        self.state = ClockState::Paused;
        true
    }

    /// Paused -> Running, discarding any lag. Returns `false` if already
    /// running.
    pub fn resume(&mut self, now: Instant) -> bool {
        if self.state == ClockState::Running {
            return false;
        }
        self.state = ClockState::Running;
        self.reanchor(now);
        true
    }

    /// Any state -> Running with no lag.
    pub fn reset(&mut self, now: Instant) {
        self.state = ClockState::Running;
        self.reanchor(now);
    }

    fn reanchor(&mut self, now: Instant) {
        self.lag = 0.0;
        self.last_step = Some(now);
    }
}
