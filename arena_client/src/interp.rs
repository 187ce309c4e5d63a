//! Interpolation.
//!
//! The server sends discrete position updates at its own tick rate. For every
//! remote entity the latest update becomes a target, and each local fixed tick
//! moves the rendered position a fixed fraction of the way there:
//!
//! `rendered += (target - rendered) * factor`
//!
//! With a static target the remaining distance after `k` ticks is
//! `d0 * (1 - factor)^k`, whatever the cadence of incoming updates.

use std::collections::HashMap;

use arena_shared::{
    math::Vec2,
    movement::MovementState,
    net::{EntityAdded, PositionUpdate, SessionId},
};

/// Render-side state of one remote entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteEntity {
    pub rendered: Vec2,
    pub target: Vec2,
    pub state: MovementState,
    pub facing_left: bool,
    /// Tick of the newest update accepted.
    pub last_tick: u32,
}

/// Smooths every non-local entity.
#[derive(Debug, Default)]
pub struct RemoteInterpolator {
    factor: f32,
    entities: HashMap<SessionId, RemoteEntity>,
}

impl RemoteInterpolator {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
            entities: HashMap::new(),
        }
    }

    pub fn add(&mut self, added: &EntityAdded) {
        let pos = Vec2::new(added.x, added.y);
        self.entities.insert(
            added.session_id,
            RemoteEntity {
                rendered: pos,
                target: pos,
                state: MovementState::Idle,
                facing_left: added.is_facing_left,
                last_tick: 0,
            },
        );
    }

    pub fn remove(&mut self, id: SessionId) -> bool {
        self.entities.remove(&id).is_some()
    }

    /// Stores a new target. Older ticks than the last accepted one are ignored.
    pub fn set_target(&mut self, update: &PositionUpdate) {
        if let Some(e) = self.entities.get_mut(&update.session_id) {
            if update.tick >= e.last_tick {
                e.target = Vec2::new(update.x, update.y);
                e.last_tick = update.tick;
            }
        }
    }

    pub fn set_state(&mut self, id: SessionId, state: MovementState) {
        if let Some(e) = self.entities.get_mut(&id) {
            e.state = state;
        }
    }

    pub fn set_facing(&mut self, id: SessionId, left: bool) {
        if let Some(e) = self.entities.get_mut(&id) {
            e.facing_left = left;
        }
    }

    /// One local tick of smoothing.
    pub fn step(&mut self) {
        for e in self.entities.values_mut() {
            e.rendered = e.rendered.lerp(e.target, self.factor);
        }
    }

    pub fn get(&self, id: SessionId) -> Option<&RemoteEntity> {
        self.entities.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &RemoteEntity)> {
        self.entities.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const B: SessionId = SessionId(2);

    fn with_remote_at(x: f32) -> RemoteInterpolator {
        let mut interp = RemoteInterpolator::new(0.2);
        interp.add(&EntityAdded {
            session_id: B,
            x,
            y: 400.0,
            is_facing_left: true,
        });
        interp
    }

    fn update(x: f32, tick: u32) -> PositionUpdate {
        PositionUpdate {
            session_id: B,
            x,
            y: 400.0,
            tick,
        }
    }

    #[test]
    fn update_sets_target_not_rendered() {
        let mut interp = with_remote_at(650.0);
        interp.set_target(&update(600.0, 3));
        let e = interp.get(B).unwrap();
        assert_eq!(e.rendered.x, 650.0);
        assert_eq!(e.target.x, 600.0);
    }

    #[test]
    fn converges_geometrically() {
        let mut interp = with_remote_at(650.0);
        interp.set_target(&update(150.0, 1));
        let d0 = 500.0f32;
        for k in 1..=30 {
            interp.step();
            let remaining = (interp.get(B).unwrap().rendered.x - 150.0).abs();
            let expected = d0 * 0.8f32.powi(k);
            assert!(
                (remaining - expected).abs() <= expected * 1e-4 + 1e-3,
                "k={k}: {remaining} vs {expected}"
            );
        }
    }

    #[test]
    fn stale_update_is_ignored() {
        let mut interp = with_remote_at(650.0);
        interp.set_target(&update(600.0, 5));
        interp.set_target(&update(640.0, 4));
        assert_eq!(interp.get(B).unwrap().target.x, 600.0);
    }

    #[test]
    fn unknown_entities_are_ignored() {
        let mut interp = RemoteInterpolator::new(0.2);
        interp.set_target(&update(1.0, 1));
        interp.set_state(B, MovementState::Walking);
        assert!(interp.is_empty());
        assert!(!interp.remove(B));
    }
}
