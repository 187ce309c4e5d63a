//! Fixed-tick simulation step.
//!
//! Each tick drains every active entity's input queue front-first and applies
//! the shared movement rules command by command. This is the only place that
//! mutates entity state while the room is running.

use arena_shared::{error::RoomError, movement::step_position};

use crate::{replicator::StateReplicator, world::WorldState};

/// Per-room constants for the step.
#[derive(Debug, Clone, Copy)]
pub struct StepParams {
    pub velocity: f32,
    /// `None` drains whole queues, which lets a flooding client move several
    /// times within one tick.
    pub max_commands_per_tick: Option<usize>,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub commands_applied: usize,
    pub entities_updated: usize,
}

/// Advances every entity by its queued input and replicates the results.
pub fn run_tick(
    world: &mut WorldState,
    params: &StepParams,
    replicator: &mut StateReplicator,
) -> Result<TickSummary, RoomError> {
    let bounds = *world.bounds();
    let mut summary = TickSummary::default();

    for entity in world.iter_mut() {
        let id = entity.session_id;
        let mut applied = 0usize;

        for cmd in entity.queue.drain(params.max_commands_per_tick) {
            entity.position = step_position(entity.position, cmd.buttons, params.velocity, &bounds);
            entity.last_applied_tick = cmd.tick;
            let edges = entity.motion.apply(cmd.buttons);
            if !edges.is_empty() {
                replicator.transitions(id, edges);
            }
            applied += 1;
        }

        if !entity.position.is_finite() || !bounds.contains(entity.position) {
            return Err(RoomError::InvariantViolation(format!(
                "session {id} at {:?} outside {:?}",
                entity.position, bounds
            )));
        }

        if applied > 0 {
            replicator.position_update(entity);
            summary.commands_applied += applied;
            summary.entities_updated += 1;
        }
    }

    Ok(summary)
}
