//! `arena_server`
//!
//! Server-side systems:
//! - Per-session input queues
//! - Fixed-timestep authoritative simulation
//! - State replication (continuous positions + discrete transition events)
//! - Session lifecycle with an occupancy limit
//!
//! Networking model:
//! - One ordered, reliable TCP stream per session
//! - One task per room; all world mutation happens inside it

pub mod input_queue;
pub mod latency;
pub mod replicator;
pub mod room;
pub mod server;
pub mod session;
pub mod simulation;
pub mod world;

pub use room::Room;
pub use server::GameServer;
