//! Authoritative world state of one room.
//!
//! Entities are kept in join order; with at most a handful of sessions a
//! `Vec` keeps iteration order stable and lookups cheap enough.

use arena_shared::{
    config::SpawnPoint,
    math::{Bounds, Vec2},
    movement::{Motion, MovementState},
    net::{EntityAdded, PositionUpdate, SessionId},
};

use crate::input_queue::InputQueue;

/// Simulated avatar of one session. Owned by the room.
#[derive(Debug)]
pub struct PlayerEntity {
    pub session_id: SessionId,
    /// Join slot; picks the spawn point.
    pub slot: usize,
    pub position: Vec2,
    pub motion: Motion,
    /// Client tick of the last applied command.
    pub last_applied_tick: u32,
    pub queue: InputQueue,
}

impl PlayerEntity {
    pub fn spawn(session_id: SessionId, slot: usize, spawn: &SpawnPoint) -> Self {
        Self {
            session_id,
            slot,
            position: spawn.position(),
            motion: Motion::new(spawn.facing_left),
            last_applied_tick: 0,
            queue: InputQueue::new(),
        }
    }

    pub fn facing_left(&self) -> bool {
        self.motion.facing_left
    }

    pub fn movement_state(&self) -> MovementState {
        self.motion.state
    }

    pub fn added_msg(&self) -> EntityAdded {
        EntityAdded {
            session_id: self.session_id,
            x: self.position.x,
            y: self.position.y,
            is_facing_left: self.motion.facing_left,
        }
    }

    pub fn position_msg(&self) -> PositionUpdate {
        PositionUpdate {
            session_id: self.session_id,
            x: self.position.x,
            y: self.position.y,
            tick: self.last_applied_tick,
        }
    }
}

/// Ordered session → entity mapping plus the room's fixed parameters.
#[derive(Debug)]
pub struct WorldState {
    entities: Vec<PlayerEntity>,
    bounds: Bounds,
    limit: usize,
}

impl WorldState {
    pub fn new(bounds: Bounds, limit: usize) -> Self {
        Self {
            entities: Vec::with_capacity(limit),
            bounds,
            limit,
        }
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entities.len() >= self.limit
    }

    pub fn get(&self, id: SessionId) -> Option<&PlayerEntity> {
        self.entities.iter().find(|e| e.session_id == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut PlayerEntity> {
        self.entities.iter_mut().find(|e| e.session_id == id)
    }

    /// Iterates in join order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerEntity> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerEntity> {
        self.entities.iter_mut()
    }

    /// Lowest slot index not held by a present entity.
    pub fn free_slot(&self) -> Option<usize> {
        (0..self.limit).find(|slot| self.entities.iter().all(|e| e.slot != *slot))
    }

    /// Appends an entity. Callers check occupancy first.
    pub(crate) fn insert(&mut self, entity: PlayerEntity) {
        debug_assert!(!self.is_full());
        self.entities.push(entity);
    }

    /// Removes an entity and with it any queued input.
    pub(crate) fn remove(&mut self, id: SessionId) -> Option<PlayerEntity> {
        let idx = self.entities.iter().position(|e| e.session_id == id)?;
        Some(self.entities.remove(idx))
    }

    pub(crate) fn clear(&mut self) {
        self.entities.clear();
    }
}
