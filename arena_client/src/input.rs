//! Input handling.
//!
//! Device polling lives outside this crate; it only has to implement
//! [`InputSource`]. Each local fixed tick samples the source once and turns
//! the result into a tick-tagged `InputCommand`.

use arena_shared::movement::{Buttons, InputCommand};

/// Raw directional state at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl InputState {
    pub const IDLE: Self = Self {
        left: false,
        right: false,
        up: false,
        down: false,
    };

    pub const LEFT: Self = Self {
        left: true,
        ..Self::IDLE
    };

    pub const RIGHT: Self = Self {
        right: true,
        ..Self::IDLE
    };

    pub fn buttons(self) -> Buttons {
        Buttons::from_flags(self.left, self.right, self.up, self.down)
    }
}

/// Anything that can be polled for directional state once per tick.
pub trait InputSource {
    fn sample(&mut self) -> InputState;
}

impl<F: FnMut() -> InputState> InputSource for F {
    fn sample(&mut self) -> InputState {
        self()
    }
}

/// Plays back `(state, ticks)` segments in a loop.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    segments: Vec<(InputState, u32)>,
    index: usize,
    remaining: u32,
}

impl ScriptedInput {
    pub fn new(segments: Vec<(InputState, u32)>) -> Self {
        let remaining = segments.first().map_or(0, |(_, n)| *n);
        Self {
            segments,
            index: 0,
            remaining,
        }
    }

    /// Walks left then right, pausing in between.
    pub fn patrol(ticks: u32) -> Self {
        Self::new(vec![
            (InputState::LEFT, ticks),
            (InputState::IDLE, ticks / 2),
            (InputState::RIGHT, ticks),
            (InputState::IDLE, ticks / 2),
        ])
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self) -> InputState {
        if self.segments.is_empty() {
            return InputState::IDLE;
        }
        // Skip zero-length segments; bounded by one full lap.
        for _ in 0..=self.segments.len() {
            if self.remaining > 0 {
                break;
            }
            self.index = (self.index + 1) % self.segments.len();
            self.remaining = self.segments[self.index].1;
        }
        if self.remaining == 0 {
            return InputState::IDLE;
        }
        self.remaining -= 1;
        self.segments[self.index].0
    }
}

/// Turns sampled input into a command for a tick.
pub fn build_command(tick: u32, input: InputState) -> InputCommand {
    InputCommand::new(input.buttons(), tick)
}
