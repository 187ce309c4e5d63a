//! Client-side world.
//!
//! Holds everything the local loop touches between network reads: the
//! predicted local entity, the interpolated remote entities, and the
//! messages received since the last tick. Inbound messages are only applied
//! at the start of a local fixed tick, never in the middle of one.

use std::{collections::VecDeque, time::Duration};

use arena_shared::{
    config::ArenaConfig,
    math::Vec2,
    movement::{InputCommand, MovementState},
    net::{NetMsg, SessionId},
    timestep::FixedTimestep,
};
use tracing::{debug, info};

use crate::{
    input::InputSource,
    interp::RemoteInterpolator,
    predictor::ClientPredictor,
};

/// What a renderer needs for one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedEntity {
    pub session_id: SessionId,
    pub position: Vec2,
    pub state: MovementState,
    pub facing_left: bool,
    pub local: bool,
}

pub struct LocalWorld {
    session_id: SessionId,
    cfg: ArenaConfig,
    timestep: FixedTimestep,
    predictor: Option<ClientPredictor>,
    remotes: RemoteInterpolator,
    pending: VecDeque<NetMsg>,
    disconnect_reason: Option<String>,
}

impl LocalWorld {
    pub fn new(session_id: SessionId, cfg: &ArenaConfig) -> Self {
        Self {
            session_id,
            cfg: cfg.clone(),
            timestep: FixedTimestep::from_hz(cfg.tick_hz).with_max_steps(cfg.max_steps_per_advance),
            predictor: None,
            remotes: RemoteInterpolator::new(cfg.interp_factor),
            pending: VecDeque::new(),
            disconnect_reason: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Queues a server message for the next tick.
    pub fn buffer(&mut self, msg: NetMsg) {
        self.pending.push_back(msg);
    }

    /// Feeds render-loop time in; returns the commands to transmit, in order.
    pub fn frame(&mut self, delta: Duration, input: &mut dyn InputSource) -> Vec<InputCommand> {
        // Count due steps first; each one needs the whole world mutably.
        let due = self.timestep.advance(delta, |_| {});
        (0..due).filter_map(|_| self.fixed_tick(input)).collect()
    }

    /// One local tick: apply inbound, predict, smooth remotes.
    pub fn fixed_tick(&mut self, input: &mut dyn InputSource) -> Option<InputCommand> {
        while let Some(msg) = self.pending.pop_front() {
            self.apply(msg);
        }

        let command = self.predictor.as_mut().map(|p| {
            let predicted = p.tick(input.sample());
            if !predicted.transitions.is_empty() {
                debug!(transitions = ?predicted.transitions, tick = predicted.command.tick, "Local transition");
            }
            predicted.command
        });

        self.remotes.step();
        command
    }

    fn apply(&mut self, msg: NetMsg) {
        let me = self.session_id;
        match msg {
            NetMsg::EntityAdded(added) if added.session_id == me => {
                info!(session = %me, x = added.x, y = added.y, "Local entity spawned");
                self.predictor = Some(ClientPredictor::new(
                    Vec2::new(added.x, added.y),
                    added.is_facing_left,
                    &self.cfg,
                ));
            }
            NetMsg::EntityAdded(added) => {
                info!(session = %added.session_id, "Remote entity added");
                self.remotes.add(&added);
            }
            NetMsg::EntityRemoved { session_id } if session_id == me => {
                self.predictor = None;
            }
            NetMsg::EntityRemoved { session_id } => {
                if self.remotes.remove(session_id) {
                    info!(session = %session_id, "Remote entity removed");
                }
            }
            NetMsg::PositionUpdate(update) if update.session_id == me => {
                if let Some(p) = self.predictor.as_mut() {
                    p.record_authoritative(update);
                }
            }
            NetMsg::PositionUpdate(update) => self.remotes.set_target(&update),
            // Own edges were already applied locally when predicting.
            NetMsg::StateChange { session_id, .. } | NetMsg::FlipChange { session_id, .. }
                if session_id == me => {}
            NetMsg::StateChange { session_id, state } => self.remotes.set_state(session_id, state),
            NetMsg::FlipChange {
                session_id,
                is_facing_left,
            } => self.remotes.set_facing(session_id, is_facing_left),
            NetMsg::Disconnect { reason } => {
                info!(reason = %reason, "Server closed the session");
                self.disconnect_reason = Some(reason);
            }
            other => debug!(kind = other.kind(), "Ignoring message"),
        }
    }

    pub fn predictor(&self) -> Option<&ClientPredictor> {
        self.predictor.as_ref()
    }

    pub fn remotes(&self) -> &RemoteInterpolator {
        &self.remotes
    }

    pub fn disconnect_reason(&self) -> Option<&str> {
        self.disconnect_reason.as_deref()
    }

    /// Local entity first, then remotes by session.
    pub fn entities(&self) -> Vec<RenderedEntity> {
        let mut out: Vec<RenderedEntity> = self
            .remotes
            .iter()
            .map(|(id, e)| RenderedEntity {
                session_id: id,
                position: e.rendered,
                state: e.state,
                facing_left: e.facing_left,
                local: false,
            })
            .collect();
        out.sort_by_key(|e| e.session_id);
        if let Some(p) = &self.predictor {
            out.insert(
                0,
                RenderedEntity {
                    session_id: self.session_id,
                    position: p.position(),
                    state: p.movement_state(),
                    facing_left: p.facing_left(),
                    local: true,
                },
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use arena_shared::net::{EntityAdded, PositionUpdate};

    use super::*;
    use crate::input::{InputState, ScriptedInput};

    const ME: SessionId = SessionId(1);
    const OTHER: SessionId = SessionId(2);

    fn world_with_both() -> LocalWorld {
        let mut w = LocalWorld::new(ME, &ArenaConfig::default());
        w.buffer(NetMsg::EntityAdded(EntityAdded {
            session_id: OTHER,
            x: 650.0,
            y: 400.0,
            is_facing_left: true,
        }));
        w.buffer(NetMsg::EntityAdded(EntityAdded {
            session_id: ME,
            x: 350.0,
            y: 400.0,
            is_facing_left: false,
        }));
        w
    }

    #[test]
    fn no_commands_before_local_spawn() {
        let mut w = LocalWorld::new(ME, &ArenaConfig::default());
        let mut input = ScriptedInput::new(vec![(InputState::LEFT, 10)]);
        assert!(w.frame(Duration::from_millis(100), &mut input).is_empty());
    }

    #[test]
    fn messages_wait_for_next_tick() {
        let mut w = LocalWorld::new(ME, &ArenaConfig::default());
        w.buffer(NetMsg::EntityAdded(EntityAdded {
            session_id: ME,
            x: 350.0,
            y: 400.0,
            is_facing_left: false,
        }));
        assert!(w.predictor().is_none());

        let mut idle = || InputState::IDLE;
        let cmd = w.fixed_tick(&mut idle).unwrap();
        assert_eq!(cmd.tick, 1);
        assert!(w.predictor().is_some());
    }

    #[test]
    fn frame_runs_whole_ticks_and_keeps_fraction() {
        let mut w = world_with_both();
        let mut left = || InputState::LEFT;
        // 40ms at 60Hz is two ticks with 6.67ms left over.
        let cmds = w.frame(Duration::from_millis(40), &mut left);
        assert_eq!(cmds.iter().map(|c| c.tick).collect::<Vec<_>>(), vec![1, 2]);
        let cmds = w.frame(Duration::from_millis(10), &mut left);
        assert_eq!(cmds.len(), 1);
        assert_eq!(w.predictor().unwrap().position(), Vec2::new(341.0, 400.0));
    }

    #[test]
    fn own_echoes_do_not_touch_prediction() {
        let mut w = world_with_both();
        let mut left = || InputState::LEFT;
        w.fixed_tick(&mut left);

        w.buffer(NetMsg::PositionUpdate(PositionUpdate {
            session_id: ME,
            x: 100.0,
            y: 400.0,
            tick: 1,
        }));
        w.buffer(NetMsg::StateChange {
            session_id: ME,
            state: MovementState::Idle,
        });
        w.fixed_tick(&mut left);

        let p = w.predictor().unwrap();
        assert_eq!(p.position(), Vec2::new(344.0, 400.0));
        assert_eq!(p.movement_state(), MovementState::Walking);
        assert_eq!(p.authoritative_marker(), Some(Vec2::new(100.0, 400.0)));
    }

    #[test]
    fn remote_updates_are_smoothed() {
        let mut w = world_with_both();
        let mut idle = || InputState::IDLE;
        w.fixed_tick(&mut idle);

        w.buffer(NetMsg::PositionUpdate(PositionUpdate {
            session_id: OTHER,
            x: 600.0,
            y: 400.0,
            tick: 1,
        }));
        w.buffer(NetMsg::FlipChange {
            session_id: OTHER,
            is_facing_left: false,
        });
        w.fixed_tick(&mut idle);

        let remote = w.remotes().get(OTHER).unwrap();
        assert!((remote.rendered.x - 640.0).abs() < 1e-3);
        assert!(!remote.facing_left);

        let entities = w.entities();
        assert!(entities[0].local);
        assert_eq!(entities[1].session_id, OTHER);
    }

    #[test]
    fn removal_and_disconnect() {
        let mut w = world_with_both();
        w.buffer(NetMsg::EntityRemoved { session_id: OTHER });
        w.buffer(NetMsg::Disconnect {
            reason: "server shutdown".into(),
        });
        let mut idle = || InputState::IDLE;
        w.fixed_tick(&mut idle);
        assert!(w.remotes().is_empty());
        assert_eq!(w.disconnect_reason(), Some("server shutdown"));
    }
}
