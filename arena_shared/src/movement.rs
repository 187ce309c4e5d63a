//! Movement rules shared by the authoritative simulation and client prediction.
//!
//! Both sides run exactly the same function on the same command, so a client
//! that predicts locally lands on the same position the server will compute,
//! as long as no command is lost.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    error::RoomError,
    math::{Bounds, Vec2},
    net::InputPayload,
};

bitflags! {
    /// Directional buttons held during one client tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const UP = 1 << 2;
        const DOWN = 1 << 3;
    }
}

impl Buttons {
    pub fn from_flags(left: bool, right: bool, up: bool, down: bool) -> Self {
        let mut b = Buttons::empty();
        b.set(Buttons::LEFT, left);
        b.set(Buttons::RIGHT, right);
        b.set(Buttons::UP, up);
        b.set(Buttons::DOWN, down);
        b
    }

    pub fn is_moving(self) -> bool {
        !self.is_empty()
    }

    /// -1, 0 or +1. Left wins when both horizontal buttons are held.
    pub fn horizontal(self) -> f32 {
        if self.contains(Buttons::LEFT) {
            -1.0
        } else if self.contains(Buttons::RIGHT) {
            1.0
        } else {
            0.0
        }
    }

    /// -1, 0 or +1 (screen space, up is negative). Up wins over down.
    pub fn vertical(self) -> f32 {
        if self.contains(Buttons::UP) {
            -1.0
        } else if self.contains(Buttons::DOWN) {
            1.0
        } else {
            0.0
        }
    }
}

/// One client tick worth of input. Consumed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputCommand {
    pub buttons: Buttons,
    pub tick: u32,
}

impl InputCommand {
    pub fn new(buttons: Buttons, tick: u32) -> Self {
        Self { buttons, tick }
    }
}

impl TryFrom<InputPayload> for InputCommand {
    type Error = RoomError;

    fn try_from(p: InputPayload) -> Result<Self, Self::Error> {
        let tick = p
            .tick
            .ok_or_else(|| RoomError::MalformedCommand("input without tick".to_string()))?;
        Ok(Self {
            buttons: Buttons::from_flags(p.left, p.right, p.up, p.down),
            tick,
        })
    }
}

impl From<InputCommand> for InputPayload {
    fn from(cmd: InputCommand) -> Self {
        Self {
            left: cmd.buttons.contains(Buttons::LEFT),
            right: cmd.buttons.contains(Buttons::RIGHT),
            up: cmd.buttons.contains(Buttons::UP),
            down: cmd.buttons.contains(Buttons::DOWN),
            tick: Some(cmd.tick),
        }
    }
}

/// Animation-facing movement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MovementState {
    #[default]
    Idle,
    Walking,
    /// Reserved by the protocol; the simulation never produces it.
    WalkingBackward,
}

/// Edges produced by applying one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transitions {
    /// New facing, set only when the latch flipped.
    pub flip: Option<bool>,
    /// New state, set only when it changed.
    pub state: Option<MovementState>,
}

impl Transitions {
    pub fn is_empty(&self) -> bool {
        self.flip.is_none() && self.state.is_none()
    }
}

/// Facing latch plus movement state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Motion {
    pub facing_left: bool,
    pub state: MovementState,
}

impl Motion {
    pub fn new(facing_left: bool) -> Self {
        Self {
            facing_left,
            state: MovementState::Idle,
        }
    }

    /// Updates the latch and state for `buttons`, reporting only edges.
    pub fn apply(&mut self, buttons: Buttons) -> Transitions {
        let mut out = Transitions::default();

        let want_left = if buttons.contains(Buttons::LEFT) {
            Some(true)
        } else if buttons.contains(Buttons::RIGHT) {
            Some(false)
        } else {
            None
        };
        if let Some(left) = want_left {
            if self.facing_left != left {
                self.facing_left = left;
                out.flip = Some(left);
            }
        }

        let state = if buttons.is_moving() {
            MovementState::Walking
        } else {
            MovementState::Idle
        };
        if self.state != state {
            self.state = state;
            out.state = Some(state);
        }

        out
    }
}

/// Applies one command's delta and clamps into `bounds`.
pub fn step_position(position: Vec2, buttons: Buttons, velocity: f32, bounds: &Bounds) -> Vec2 {
    let moved = Vec2::new(
        position.x + buttons.horizontal() * velocity,
        position.y + buttons.vertical() * velocity,
    );
    bounds.clamp(moved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane() -> Bounds {
        Bounds::new(Vec2::new(80.0, 340.0), Vec2::new(1000.0, 420.0))
    }

    #[test]
    fn left_wins_over_right_and_up_over_down() {
        let all = Buttons::all();
        let p = step_position(Vec2::new(500.0, 400.0), all, 3.0, &lane());
        assert_eq!(p, Vec2::new(497.0, 397.0));
    }

    #[test]
    fn position_never_leaves_bounds() {
        let b = lane();
        let patterns = [
            Buttons::LEFT,
            Buttons::RIGHT | Buttons::DOWN,
            Buttons::UP,
            Buttons::LEFT | Buttons::UP,
            Buttons::DOWN,
            Buttons::empty(),
        ];
        let mut p = Vec2::new(350.0, 400.0);
        for i in 0..5_000 {
            let buttons = patterns[(i * 7 + i / 13) % patterns.len()];
            p = step_position(p, buttons, 17.5, &b);
            assert!(b.contains(p), "left bounds at step {i}: {p:?}");
        }
    }

    #[test]
    fn facing_latch_flips_only_on_edges() {
        let mut m = Motion::new(false);
        assert_eq!(m.apply(Buttons::LEFT).flip, Some(true));
        assert_eq!(m.apply(Buttons::LEFT).flip, None);
        assert_eq!(m.apply(Buttons::LEFT | Buttons::RIGHT).flip, None);
        assert_eq!(m.apply(Buttons::empty()).flip, None);
        assert_eq!(m.apply(Buttons::UP).flip, None);
        assert!(m.facing_left);
        assert_eq!(m.apply(Buttons::RIGHT).flip, Some(false));
        assert!(!m.facing_left);
    }

    #[test]
    fn movement_state_reports_transitions_once() {
        let mut m = Motion::new(false);
        let walking: Vec<_> = (0..10).map(|_| m.apply(Buttons::DOWN).state).collect();
        assert_eq!(walking[0], Some(MovementState::Walking));
        assert!(walking[1..].iter().all(Option::is_none));
        assert_eq!(m.apply(Buttons::empty()).state, Some(MovementState::Idle));
        assert_eq!(m.apply(Buttons::empty()).state, None);
    }

    #[test]
    fn payload_without_tick_is_malformed() {
        let p = InputPayload {
            left: true,
            ..Default::default()
        };
        assert!(matches!(
            InputCommand::try_from(p),
            Err(RoomError::MalformedCommand(_))
        ));
    }
}
