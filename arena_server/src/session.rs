//! Session lifecycle: admission, spawn assignment and departure.

use arena_shared::{
    config::SpawnPoint,
    error::RoomError,
    movement::MovementState,
    net::{NetMsg, SessionId},
};
use tracing::{debug, info};

use crate::{
    replicator::{SessionSink, StateReplicator},
    world::{PlayerEntity, WorldState},
};

/// Admits and removes sessions. Spawn data is indexed by join slot.
#[derive(Debug, Clone)]
pub struct SessionManager {
    spawns: Vec<SpawnPoint>,
}

impl SessionManager {
    pub fn new(spawns: Vec<SpawnPoint>) -> Self {
        Self { spawns }
    }

    /// Spawn point for a slot.
    pub fn spawn_for(&self, slot: usize) -> Option<&SpawnPoint> {
        self.spawns.get(slot)
    }

    /// Admits `id` if there is room.
    ///
    /// The newcomer receives `Welcome`, then one `EntityAdded` per entity
    /// already present (plus its current state when not idle). Everyone,
    /// the newcomer included, then receives the new entity's `EntityAdded`.
    pub fn join(
        &self,
        world: &mut WorldState,
        replicator: &mut StateReplicator,
        id: SessionId,
        sink: Box<dyn SessionSink>,
    ) -> Result<usize, RoomError> {
        let limit = world.limit();
        if world.is_full() {
            return Err(RoomError::RoomFull { limit });
        }
        let slot = world.free_slot().ok_or(RoomError::RoomFull { limit })?;
        let spawn = self.spawn_for(slot).ok_or_else(|| {
            RoomError::InvariantViolation(format!("no spawn point for slot {slot}"))
        })?;
        let entity = PlayerEntity::spawn(id, slot, spawn);

        replicator.attach(id, sink);
        replicator.send_to(id, NetMsg::Welcome { session_id: id, slot });
        for existing in world.iter() {
            replicator.send_to(id, NetMsg::EntityAdded(existing.added_msg()));
            if existing.movement_state() != MovementState::Idle {
                replicator.send_to(
                    id,
                    NetMsg::StateChange {
                        session_id: existing.session_id,
                        state: existing.movement_state(),
                    },
                );
            }
        }
        replicator.entity_added(&entity);

        info!(
            session_id = %id,
            slot,
            x = entity.position.x,
            y = entity.position.y,
            "Session joined"
        );
        world.insert(entity);
        Ok(slot)
    }

    /// Removes `id` and discards its queued input.
    ///
    /// Returns false for an unknown id; a second leave for the same session
    /// therefore emits nothing.
    pub fn leave(
        &self,
        world: &mut WorldState,
        replicator: &mut StateReplicator,
        id: SessionId,
    ) -> bool {
        replicator.detach(id);
        match world.remove(id) {
            Some(entity) => {
                replicator.entity_removed(id);
                info!(
                    session_id = %id,
                    discarded_commands = entity.queue.len(),
                    "Session left"
                );
                true
            }
            None => {
                debug!(session_id = %id, "Leave for unknown session ignored");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use arena_shared::config::ArenaConfig;

    use super::*;
    use crate::replicator::MemorySink;

    fn setup() -> (SessionManager, WorldState, StateReplicator) {
        let cfg = ArenaConfig::default();
        (
            SessionManager::new(cfg.spawns.clone()),
            WorldState::new(cfg.map.bounds(), cfg.max_players),
            StateReplicator::new(),
        )
    }

    #[test]
    fn spawns_are_mirrored_by_slot() {
        let (mgr, mut world, mut rep) = setup();
        let a = SessionId(10);
        let b = SessionId(11);
        assert_eq!(mgr.join(&mut world, &mut rep, a, Box::new(MemorySink::new())), Ok(0));
        assert_eq!(mgr.join(&mut world, &mut rep, b, Box::new(MemorySink::new())), Ok(1));

        let ea = world.get(a).unwrap();
        let eb = world.get(b).unwrap();
        assert_eq!((ea.position.x, ea.position.y, ea.facing_left()), (350.0, 400.0, false));
        assert_eq!((eb.position.x, eb.position.y, eb.facing_left()), (650.0, 400.0, true));
    }

    #[test]
    fn third_join_is_rejected_without_state() {
        let (mgr, mut world, mut rep) = setup();
        for id in 1..=2 {
            mgr.join(&mut world, &mut rep, SessionId(id), Box::new(MemorySink::new()))
                .unwrap();
        }
        let late = MemorySink::new();
        let err = mgr
            .join(&mut world, &mut rep, SessionId(3), Box::new(late.clone()))
            .unwrap_err();
        assert_eq!(err, RoomError::RoomFull { limit: 2 });
        assert_eq!(world.len(), 2);
        assert_eq!(rep.len(), 2);
        assert!(late.take().is_empty());
    }

    #[test]
    fn newcomer_learns_about_existing_entities_first() {
        let (mgr, mut world, mut rep) = setup();
        let first = MemorySink::new();
        let second = MemorySink::new();
        mgr.join(&mut world, &mut rep, SessionId(1), Box::new(first.clone()))
            .unwrap();
        first.take();
        mgr.join(&mut world, &mut rep, SessionId(2), Box::new(second.clone()))
            .unwrap();

        let got = second.take();
        assert_eq!(
            got[0],
            NetMsg::Welcome {
                session_id: SessionId(2),
                slot: 1
            }
        );
        assert!(matches!(&got[1], NetMsg::EntityAdded(e) if e.session_id == SessionId(1)));
        assert!(matches!(&got[2], NetMsg::EntityAdded(e) if e.session_id == SessionId(2)));
        assert_eq!(got.len(), 3);

        let seen_by_first = first.take();
        assert_eq!(seen_by_first.len(), 1);
        assert!(matches!(&seen_by_first[0], NetMsg::EntityAdded(e) if e.session_id == SessionId(2)));
    }

    #[test]
    fn leaving_twice_removes_once() {
        let (mgr, mut world, mut rep) = setup();
        let watcher = MemorySink::new();
        mgr.join(&mut world, &mut rep, SessionId(1), Box::new(watcher.clone()))
            .unwrap();
        mgr.join(&mut world, &mut rep, SessionId(2), Box::new(MemorySink::new()))
            .unwrap();
        watcher.take();

        assert!(mgr.leave(&mut world, &mut rep, SessionId(2)));
        assert!(!mgr.leave(&mut world, &mut rep, SessionId(2)));

        let removals = watcher
            .take()
            .into_iter()
            .filter(|m| matches!(m, NetMsg::EntityRemoved { .. }))
            .count();
        assert_eq!(removals, 1);
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn freed_slot_is_reused() {
        let (mgr, mut world, mut rep) = setup();
        mgr.join(&mut world, &mut rep, SessionId(1), Box::new(MemorySink::new()))
            .unwrap();
        mgr.join(&mut world, &mut rep, SessionId(2), Box::new(MemorySink::new()))
            .unwrap();
        mgr.leave(&mut world, &mut rep, SessionId(1));
        let slot = mgr
            .join(&mut world, &mut rep, SessionId(3), Box::new(MemorySink::new()))
            .unwrap();
        assert_eq!(slot, 0);
        assert_eq!(world.get(SessionId(3)).unwrap().position.x, 350.0);
    }
}
