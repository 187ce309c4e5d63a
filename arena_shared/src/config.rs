//! Configuration system.
//!
//! Loads arena configuration from JSON strings/files. Server and client read
//! the same file so that tick rate, velocity and bounds agree on both sides.

use std::path::Path;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::math::{Bounds, Vec2};

/// Upper bound for the artificial outbound delay.
pub const MAX_SIMULATED_LATENCY_MS: u64 = 5_000;

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate, identical on server and client.
    pub tick_hz: u32,
    /// Occupancy limit per room.
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Distance moved per applied command, per axis.
    #[serde(default = "default_velocity")]
    pub velocity: f32,
    #[serde(default)]
    pub map: MapConfig,
    /// Spawn point per join slot.
    #[serde(default = "default_spawns")]
    pub spawns: Vec<SpawnPoint>,
    /// Upper bound on fixed steps run by one scheduler advance.
    #[serde(default = "default_max_steps_per_advance")]
    pub max_steps_per_advance: u32,
    /// Per-entity drain cap per tick. `None` drains every queued command.
    #[serde(default)]
    pub max_commands_per_tick: Option<usize>,
    /// Fraction of the remaining distance covered per client tick.
    #[serde(default = "default_interp_factor")]
    pub interp_factor: f32,
    /// Artificial outbound delay applied by the server.
    #[serde(default)]
    pub simulated_latency_ms: u64,
}

/// Playfield description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub width: f32,
    pub height: f32,
    /// Left margin; x never drops below it.
    pub margin_x: f32,
    /// Walkable lane, top edge.
    pub lane_top: f32,
    /// Walkable lane, bottom edge.
    pub lane_bottom: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 550.0,
            margin_x: 80.0,
            lane_top: 340.0,
            lane_bottom: 420.0,
        }
    }
}

impl MapConfig {
    /// Region every entity position is clamped into.
    pub fn bounds(&self) -> Bounds {
        Bounds::new(
            Vec2::new(self.margin_x, self.lane_top),
            Vec2::new(self.width, self.lane_bottom),
        )
    }
}

/// Spawn position and default facing for one join slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
    pub facing_left: bool,
}

impl SpawnPoint {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

fn default_max_players() -> usize {
    2
}

fn default_velocity() -> f32 {
    3.0
}

fn default_spawns() -> Vec<SpawnPoint> {
    vec![
        SpawnPoint {
            x: 350.0,
            y: 400.0,
            facing_left: false,
        },
        SpawnPoint {
            x: 650.0,
            y: 400.0,
            facing_left: true,
        },
    ]
}

fn default_max_steps_per_advance() -> u32 {
    8
}

fn default_interp_factor() -> f32 {
    0.2
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 60,
            max_players: default_max_players(),
            velocity: default_velocity(),
            map: MapConfig::default(),
            spawns: default_spawns(),
            max_steps_per_advance: default_max_steps_per_advance(),
            max_commands_per_tick: None,
            interp_factor: default_interp_factor(),
            simulated_latency_ms: 0,
        }
    }
}

impl ArenaConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and validates a JSON config file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::from_json_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks values the simulation relies on.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.tick_hz > 0, "tick_hz must be positive");
        ensure!(self.max_players > 0, "max_players must be positive");
        ensure!(
            self.velocity.is_finite() && self.velocity >= 0.0,
            "velocity must be finite and non-negative, got {}",
            self.velocity
        );
        ensure!(
            self.map.bounds().is_valid(),
            "map bounds are empty or non-finite: {:?}",
            self.map
        );
        ensure!(
            self.interp_factor > 0.0 && self.interp_factor <= 1.0,
            "interp_factor must be in (0, 1], got {}",
            self.interp_factor
        );
        ensure!(
            self.spawns.len() >= self.max_players,
            "{} spawn points for {} players",
            self.spawns.len(),
            self.max_players
        );
        ensure!(
            self.max_commands_per_tick != Some(0),
            "max_commands_per_tick must be positive when set"
        );
        ensure!(
            self.simulated_latency_ms <= MAX_SIMULATED_LATENCY_MS,
            "simulated_latency_ms must be at most {MAX_SIMULATED_LATENCY_MS}, got {}",
            self.simulated_latency_ms
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ArenaConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = ArenaConfig::from_json_str(
            r#"{ "server_addr": "0.0.0.0:5000", "tick_hz": 30, "velocity": 2.0 }"#,
        )
        .unwrap();
        assert_eq!(cfg.tick_hz, 30);
        assert_eq!(cfg.velocity, 2.0);
        assert_eq!(cfg.max_players, 2);
        assert_eq!(cfg.spawns.len(), 2);
        assert_eq!(cfg.map, MapConfig::default());
    }

    #[test]
    fn default_bounds_match_lane() {
        let b = MapConfig::default().bounds();
        assert_eq!(b.min, Vec2::new(80.0, 340.0));
        assert_eq!(b.max, Vec2::new(1000.0, 420.0));
    }

    #[test]
    fn rejects_too_few_spawns() {
        let cfg = ArenaConfig {
            max_players: 3,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unbounded_latency() {
        let capped = ArenaConfig {
            simulated_latency_ms: MAX_SIMULATED_LATENCY_MS,
            ..Default::default()
        };
        assert!(capped.validate().is_ok());

        let huge = ArenaConfig {
            simulated_latency_ms: u64::MAX,
            ..Default::default()
        };
        assert!(huge.validate().is_err());
    }
}
