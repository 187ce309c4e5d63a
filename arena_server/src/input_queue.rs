//! Per-session input buffering.
//!
//! Commands are appended in arrival order and drained front-first by the
//! simulation. Nothing is reordered or dropped; the queue is only discarded
//! wholesale when its session leaves.

use std::collections::VecDeque;

use arena_shared::movement::InputCommand;

/// FIFO of pending commands for one session.
#[derive(Debug, Default)]
pub struct InputQueue {
    pending: VecDeque<InputCommand>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: InputCommand) {
        self.pending.push_back(cmd);
    }

    /// Removes up to `limit` commands from the front (all of them for `None`).
    pub fn drain(&mut self, limit: Option<usize>) -> impl Iterator<Item = InputCommand> + '_ {
        let n = limit.map_or(self.pending.len(), |l| l.min(self.pending.len()));
        self.pending.drain(..n)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
