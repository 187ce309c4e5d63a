//! Client-side prediction.
//!
//! The local entity is moved by the same rule the server applies, the moment
//! input is sampled, and the tagged command is sent without waiting for an
//! acknowledgment. Authoritative echoes only move a debug marker: there is
//! no rollback or resimulation, so a lost command leaves a permanent offset.

use arena_shared::{
    config::ArenaConfig,
    math::{Bounds, Vec2},
    movement::{step_position, InputCommand, Motion, MovementState, Transitions},
    net::PositionUpdate,
};

use crate::input::{build_command, InputState};

/// Result of one predicted tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicted {
    /// Command to transmit.
    pub command: InputCommand,
    /// Local edges, already applied to the predicted entity.
    pub transitions: Transitions,
}

/// Predicted state of the locally owned entity.
#[derive(Debug, Clone)]
pub struct ClientPredictor {
    position: Vec2,
    motion: Motion,
    /// Last tick number handed out.
    tick: u32,
    velocity: f32,
    bounds: Bounds,
    authoritative: Option<PositionUpdate>,
}

impl ClientPredictor {
    pub fn new(spawn: Vec2, facing_left: bool, cfg: &ArenaConfig) -> Self {
        Self {
            position: spawn,
            motion: Motion::new(facing_left),
            tick: 0,
            velocity: cfg.velocity,
            bounds: cfg.map.bounds(),
            authoritative: None,
        }
    }

    /// Runs one local fixed tick for `input`.
    pub fn tick(&mut self, input: InputState) -> Predicted {
        self.tick = self.tick.wrapping_add(1);
        let command = build_command(self.tick, input);
        self.position = step_position(self.position, command.buttons, self.velocity, &self.bounds);
        let transitions = self.motion.apply(command.buttons);
        Predicted {
            command,
            transitions,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn facing_left(&self) -> bool {
        self.motion.facing_left
    }

    pub fn movement_state(&self) -> MovementState {
        self.motion.state
    }

    /// Tick number of the last command produced.
    pub fn current_tick(&self) -> u32 {
        self.tick
    }

    /// Remembers the server's view of us. Never moves the predicted entity.
    pub fn record_authoritative(&mut self, update: PositionUpdate) {
        self.authoritative = Some(update);
    }

    /// Where the server last placed us.
    pub fn authoritative_marker(&self) -> Option<Vec2> {
        self.authoritative.map(|u| Vec2::new(u.x, u.y))
    }

    /// Number of sent commands the server has not confirmed yet.
    pub fn unacknowledged(&self) -> u32 {
        let acked = self.authoritative.map_or(0, |u| u.tick);
        self.tick.wrapping_sub(acked)
    }
}

#[cfg(test)]
mod tests {
    use arena_shared::net::SessionId;

    use super::*;

    fn predictor() -> ClientPredictor {
        ClientPredictor::new(Vec2::new(350.0, 400.0), false, &ArenaConfig::default())
    }

    #[test]
    fn applies_input_immediately_and_tags_ticks() {
        let mut p = predictor();
        let first = p.tick(InputState::LEFT);
        let second = p.tick(InputState::LEFT);
        assert_eq!(first.command.tick, 1);
        assert_eq!(second.command.tick, 2);
        assert_eq!(p.position(), Vec2::new(344.0, 400.0));
        assert_eq!(first.transitions.flip, Some(true));
        assert_eq!(first.transitions.state, Some(MovementState::Walking));
        assert!(second.transitions.is_empty());
    }

    #[test]
    fn uses_server_bounds() {
        let mut p = predictor();
        for _ in 0..200 {
            p.tick(InputState {
                up: true,
                ..InputState::LEFT
            });
        }
        assert_eq!(p.position(), Vec2::new(80.0, 340.0));
    }

    #[test]
    fn authoritative_echo_does_not_correct_prediction() {
        let mut p = predictor();
        for _ in 0..5 {
            p.tick(InputState::RIGHT);
        }
        p.record_authoritative(PositionUpdate {
            session_id: SessionId(1),
            x: 353.0,
            y: 400.0,
            tick: 1,
        });
        assert_eq!(p.position(), Vec2::new(365.0, 400.0));
        assert_eq!(p.authoritative_marker(), Some(Vec2::new(353.0, 400.0)));
        assert_eq!(p.unacknowledged(), 4);
    }
}
