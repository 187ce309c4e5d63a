//! State replication.
//!
//! Two channels leave the room:
//! - continuous: `PositionUpdate` for every entity a tick mutated, once per
//!   tick, after that entity's queue was drained;
//! - discrete: `FlipChange` / `StateChange`, once per transition edge.
//!
//! Everything is delivered to every attached session, the origin included.
//! Clients filter their own transitions.

use std::sync::{Arc, Mutex};

use arena_shared::{
    movement::Transitions,
    net::{NetMsg, SessionId},
};
use tracing::debug;

use crate::world::PlayerEntity;

/// Outbound side of one session's connection.
///
/// The transport owns the connection; the room only holds this handle.
pub trait SessionSink: Send {
    /// Queues a message. An error means the connection is already gone.
    fn deliver(&mut self, msg: NetMsg) -> anyhow::Result<()>;
}

/// Sink that records messages in memory, for tests and local observers.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    log: Arc<Mutex<Vec<NetMsg>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes everything recorded so far.
    pub fn take(&self) -> Vec<NetMsg> {
        self.log
            .lock()
            .map(|mut log| std::mem::take(&mut *log))
            .unwrap_or_default()
    }
}

impl SessionSink for MemorySink {
    fn deliver(&mut self, msg: NetMsg) -> anyhow::Result<()> {
        self.log
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))?
            .push(msg);
        Ok(())
    }
}

/// Fans room output out to attached sessions.
#[derive(Default)]
pub struct StateReplicator {
    sinks: Vec<(SessionId, Box<dyn SessionSink>)>,
}

impl StateReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, id: SessionId, sink: Box<dyn SessionSink>) {
        self.sinks.push((id, sink));
    }

    /// Returns false if the session was not attached.
    pub fn detach(&mut self, id: SessionId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sid, _)| *sid != id);
        self.sinks.len() != before
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn send_to(&mut self, id: SessionId, msg: NetMsg) {
        if let Some((_, sink)) = self.sinks.iter_mut().find(|(sid, _)| *sid == id) {
            if let Err(e) = sink.deliver(msg) {
                debug!(session_id = %id, error = %e, "Dropping message for closed session");
            }
        }
    }

    pub fn broadcast(&mut self, msg: NetMsg) {
        for (id, sink) in &mut self.sinks {
            if let Err(e) = sink.deliver(msg.clone()) {
                debug!(session_id = %id, error = %e, "Dropping message for closed session");
            }
        }
    }

    pub fn entity_added(&mut self, entity: &PlayerEntity) {
        self.broadcast(NetMsg::EntityAdded(entity.added_msg()));
    }

    pub fn entity_removed(&mut self, id: SessionId) {
        self.broadcast(NetMsg::EntityRemoved { session_id: id });
    }

    pub fn position_update(&mut self, entity: &PlayerEntity) {
        self.broadcast(NetMsg::PositionUpdate(entity.position_msg()));
    }

    /// Emits the edges of one applied command, facing first.
    pub fn transitions(&mut self, id: SessionId, t: Transitions) {
        if let Some(left) = t.flip {
            self.broadcast(NetMsg::FlipChange {
                session_id: id,
                is_facing_left: left,
            });
        }
        if let Some(state) = t.state {
            self.broadcast(NetMsg::StateChange {
                session_id: id,
                state,
            });
        }
    }

    /// Tells every session why the room goes away and drops all sinks.
    pub fn disconnect_all(&mut self, reason: &str) {
        self.broadcast(NetMsg::Disconnect {
            reason: reason.to_string(),
        });
        self.sinks.clear();
    }
}

#[cfg(test)]
mod tests {
    use arena_shared::movement::MovementState;

    use super::*;

    #[test]
    fn broadcast_reaches_origin_and_others() {
        let (a, b) = (MemorySink::new(), MemorySink::new());
        let mut rep = StateReplicator::new();
        rep.attach(SessionId(1), Box::new(a.clone()));
        rep.attach(SessionId(2), Box::new(b.clone()));

        rep.transitions(
            SessionId(1),
            Transitions {
                flip: Some(true),
                state: Some(MovementState::Walking),
            },
        );

        for sink in [&a, &b] {
            assert_eq!(
                sink.take(),
                vec![
                    NetMsg::FlipChange {
                        session_id: SessionId(1),
                        is_facing_left: true
                    },
                    NetMsg::StateChange {
                        session_id: SessionId(1),
                        state: MovementState::Walking
                    },
                ]
            );
        }
    }

    #[test]
    fn detach_is_reported_once() {
        let mut rep = StateReplicator::new();
        rep.attach(SessionId(1), Box::new(MemorySink::new()));
        assert!(rep.detach(SessionId(1)));
        assert!(!rep.detach(SessionId(1)));
        assert!(rep.is_empty());
    }
}
