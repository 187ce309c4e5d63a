//! Room: one isolated world plus its fixed-tick loop.
//!
//! A `Room` is a plain single-writer state machine with no I/O of its own.
//! Joins, leaves and inputs are applied between ticks by whoever owns the
//! room (see `server::run_room`), so the entity collection is never mutated
//! while a tick iterates it.
//!
//! Lifecycle: `Empty -> Filling -> Full`, back and forth on join/leave, and
//! finally `Disposed`. A disposed room rejects everything and never ticks.

use std::time::Duration;

use arena_shared::{
    config::ArenaConfig,
    error::RoomError,
    movement::InputCommand,
    net::{InputPayload, SessionId},
    timestep::FixedTimestep,
};
use tracing::{debug, error, info};

use crate::{
    replicator::{SessionSink, StateReplicator},
    session::SessionManager,
    simulation::{self, StepParams, TickSummary},
    world::{PlayerEntity, WorldState},
};

/// Occupancy-derived lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Empty,
    Filling,
    Full,
    Disposed,
}

/// Authoritative room.
pub struct Room {
    world: WorldState,
    sessions: SessionManager,
    replicator: StateReplicator,
    scheduler: FixedTimestep,
    params: StepParams,
    disposed: bool,
}

impl Room {
    pub fn new(cfg: &ArenaConfig) -> Self {
        Self {
            world: WorldState::new(cfg.map.bounds(), cfg.max_players),
            sessions: SessionManager::new(cfg.spawns.clone()),
            replicator: StateReplicator::new(),
            scheduler: FixedTimestep::from_hz(cfg.tick_hz)
                .with_max_steps(cfg.max_steps_per_advance),
            params: StepParams {
                velocity: cfg.velocity,
                max_commands_per_tick: cfg.max_commands_per_tick,
            },
            disposed: false,
        }
    }

    pub fn phase(&self) -> RoomPhase {
        if self.disposed {
            RoomPhase::Disposed
        } else if self.world.is_empty() {
            RoomPhase::Empty
        } else if self.world.is_full() {
            RoomPhase::Full
        } else {
            RoomPhase::Filling
        }
    }

    pub fn entity(&self, id: SessionId) -> Option<&PlayerEntity> {
        self.world.get(id)
    }

    pub fn session_count(&self) -> usize {
        self.world.len()
    }

    /// Server ticks executed so far.
    pub fn tick(&self) -> u64 {
        self.scheduler.ticks()
    }

    pub fn fixed_step(&self) -> Duration {
        self.scheduler.step()
    }

    /// Admits a session; see [`SessionManager::join`].
    pub fn join(&mut self, id: SessionId, sink: Box<dyn SessionSink>) -> Result<usize, RoomError> {
        if self.disposed {
            return Err(RoomError::Disposed);
        }
        self.sessions
            .join(&mut self.world, &mut self.replicator, id, sink)
    }

    /// Removes a session. Unknown ids are a no-op and return false.
    pub fn leave(&mut self, id: SessionId) -> bool {
        if self.disposed {
            return false;
        }
        self.sessions.leave(&mut self.world, &mut self.replicator, id)
    }

    /// Queues one input for the next tick.
    ///
    /// `UnknownSession` and `MalformedCommand` are per-message failures; the
    /// caller logs and forgets them.
    pub fn on_input(&mut self, id: SessionId, payload: InputPayload) -> Result<(), RoomError> {
        if self.disposed {
            return Err(RoomError::Disposed);
        }
        let cmd = InputCommand::try_from(payload)?;
        let entity = self
            .world
            .get_mut(id)
            .ok_or(RoomError::UnknownSession(id))?;
        entity.queue.push(cmd);
        Ok(())
    }

    /// Feeds elapsed time to the scheduler and runs every due tick.
    ///
    /// An invariant violation disposes the room before the error is returned.
    pub fn advance(&mut self, elapsed: Duration) -> Result<u32, RoomError> {
        let Room {
            world,
            replicator,
            scheduler,
            params,
            ..
        } = self;
        let result = scheduler.try_advance(elapsed, |tick| {
            let summary = simulation::run_tick(world, params, replicator)?;
            log_tick(tick, summary);
            Ok(())
        });
        self.fail_on_fatal(result)
    }

    /// Runs exactly one tick regardless of elapsed time.
    pub fn step_once(&mut self) -> Result<TickSummary, RoomError> {
        if self.disposed {
            return Err(RoomError::Disposed);
        }
        let result = simulation::run_tick(&mut self.world, &self.params, &mut self.replicator);
        self.fail_on_fatal(result)
    }

    fn fail_on_fatal<T>(&mut self, result: Result<T, RoomError>) -> Result<T, RoomError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                error!(error = %e, "Room invariant violated, disposing");
                self.dispose("internal error");
            }
        }
        result
    }

    /// Stops the scheduler, notifies and drops every session.
    pub fn dispose(&mut self, reason: &str) {
        if self.disposed {
            return;
        }
        info!(sessions = self.world.len(), reason, "Room disposing");
        self.disposed = true;
        self.scheduler.stop();
        self.replicator.disconnect_all(reason);
        self.world.clear();
    }

    /// Human-readable status, one line per item.
    pub fn status_lines(&self) -> Vec<String> {
        let mut out = vec![
            format!("Room phase: {:?}", self.phase()),
            format!("Tick: {}", self.tick()),
            format!("Sessions: {}/{}", self.world.len(), self.world.limit()),
        ];
        for e in self.world.iter() {
            out.push(format!(
                "  {}: slot={} pos=({:.1}, {:.1}) state={:?} facing_left={} last_tick={} queued={}",
                e.session_id,
                e.slot,
                e.position.x,
                e.position.y,
                e.movement_state(),
                e.facing_left(),
                e.last_applied_tick,
                e.queue.len()
            ));
        }
        out
    }
}

fn log_tick(tick: u64, summary: TickSummary) {
    if summary.commands_applied > 0 {
        debug!(
            tick,
            commands = summary.commands_applied,
            entities = summary.entities_updated,
            "Tick applied input"
        );
    }
}

#[cfg(test)]
mod tests {
    use arena_shared::net::NetMsg;

    use super::*;
    use crate::replicator::MemorySink;

    fn left(tick: u32) -> InputPayload {
        InputPayload {
            left: true,
            tick: Some(tick),
            ..Default::default()
        }
    }

    #[test]
    fn phases_follow_occupancy() {
        let mut room = Room::new(&ArenaConfig::default());
        assert_eq!(room.phase(), RoomPhase::Empty);
        room.join(SessionId(1), Box::new(MemorySink::new())).unwrap();
        assert_eq!(room.phase(), RoomPhase::Filling);
        room.join(SessionId(2), Box::new(MemorySink::new())).unwrap();
        assert_eq!(room.phase(), RoomPhase::Full);
        room.leave(SessionId(1));
        assert_eq!(room.phase(), RoomPhase::Filling);
        room.dispose("test");
        assert_eq!(room.phase(), RoomPhase::Disposed);
    }

    #[test]
    fn input_for_unknown_session_is_reported_not_applied() {
        let mut room = Room::new(&ArenaConfig::default());
        assert_eq!(
            room.on_input(SessionId(7), left(1)),
            Err(RoomError::UnknownSession(SessionId(7)))
        );
    }

    #[test]
    fn input_after_leave_is_discarded() {
        let mut room = Room::new(&ArenaConfig::default());
        let a = SessionId(1);
        room.join(a, Box::new(MemorySink::new())).unwrap();
        room.on_input(a, left(1)).unwrap();
        room.leave(a);
        assert!(room.on_input(a, left(2)).is_err());
        assert_eq!(room.step_once().unwrap().commands_applied, 0);
    }

    #[test]
    fn malformed_input_does_not_touch_the_queue() {
        let mut room = Room::new(&ArenaConfig::default());
        let a = SessionId(1);
        room.join(a, Box::new(MemorySink::new())).unwrap();
        let err = room
            .on_input(a, InputPayload {
                left: true,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, RoomError::MalformedCommand(_)));
        assert!(room.entity(a).unwrap().queue.is_empty());
    }

    #[test]
    fn advance_runs_whole_ticks_only() {
        let mut room = Room::new(&ArenaConfig::default());
        let a = SessionId(1);
        room.join(a, Box::new(MemorySink::new())).unwrap();
        room.on_input(a, left(1)).unwrap();

        let step = room.fixed_step();
        assert_eq!(room.advance(step / 2).unwrap(), 0);
        assert_eq!(room.entity(a).unwrap().position.x, 350.0);
        assert_eq!(room.advance(step / 2 + step / 2).unwrap(), 1);
        assert_eq!(room.entity(a).unwrap().position.x, 347.0);
    }

    #[test]
    fn disposal_stops_ticks_and_notifies() {
        let mut room = Room::new(&ArenaConfig::default());
        let sink = MemorySink::new();
        let a = SessionId(1);
        room.join(a, Box::new(sink.clone())).unwrap();
        sink.take();

        room.dispose("shutdown");
        assert_eq!(
            sink.take(),
            vec![NetMsg::Disconnect {
                reason: "shutdown".into()
            }]
        );
        assert_eq!(room.advance(Duration::from_secs(5)).unwrap(), 0);
        assert_eq!(room.tick(), 0);
        assert_eq!(
            room.join(SessionId(2), Box::new(MemorySink::new())),
            Err(RoomError::Disposed)
        );
        assert_eq!(room.session_count(), 0);
    }

    #[test]
    fn invariant_violation_disposes_the_room() {
        let cfg = ArenaConfig {
            velocity: f32::INFINITY,
            ..Default::default()
        };
        let mut room = Room::new(&cfg);
        let a = SessionId(1);
        room.join(a, Box::new(MemorySink::new())).unwrap();
        // The idle axis computes 0 * inf, which is NaN.
        room.on_input(a, left(1)).unwrap();
        let _ = room.step_once();
        assert_eq!(room.phase(), RoomPhase::Disposed);
    }
}
