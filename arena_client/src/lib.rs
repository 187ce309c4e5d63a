//! `arena_client`
//!
//! Client-side systems:
//! - Connection management over one reliable stream
//! - Input capture and tick-tagged command generation
//! - Local prediction of the owned entity
//! - Interpolation for remote entities
//! - Character animation driven by state edges

pub mod animation;
pub mod client;
pub mod input;
pub mod interp;
pub mod predictor;
pub mod world;

pub use client::GameClient;
