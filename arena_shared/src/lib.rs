//! `arena_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Deterministic: the movement rules and the fixed-step scheduler behave
//!   identically on both sides of the wire.
//! - Clear separation of concerns (config, math, movement, timestep, net).
//! - No `unsafe`.

pub mod config;
pub mod error;
pub mod math;
pub mod movement;
pub mod net;
pub mod timestep;
