//! Configuration system.
//!
//! Loads server configuration from JSON strings (file IO left to the binary).
//! Everything is read once at startup; there is no hot reload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::Vec3;

/// Tunables for the simulation server and its physics backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for HTTP + WebSocket, e.g. `0.0.0.0:3000`.
    pub listen_addr: String,
    /// Fixed simulation and replication rate.
    pub tick_hz: u32,
    /// Upper bound on catch-up sub-steps within one tick.
    pub max_sub_steps: u32,
    pub gravity: Vec3,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Lets the physics backend put resting bodies to sleep. Sleeping bodies
    /// are still replicated.
    pub allow_sleep: bool,
    /// Installs the permanent ground plane at `y = 0`.
    pub ground_plane: bool,
    /// Outbound frames buffered per session before it is dropped as too slow.
    pub session_queue: usize,
    /// Pending messages for the world actor.
    pub command_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            tick_hz: 60,
            max_sub_steps: 3,
            gravity: Vec3::new(0.0, -50.0, 0.0),
            friction: 0.7,
            restitution: 0.3,
            linear_damping: 0.3,
            angular_damping: 0.5,
            allow_sleep: true,
            ground_plane: true,
            session_queue: 256,
            command_queue: 1024,
        }
    }
}

/// Highest supported tick rate. Faster rates would round the tick period
/// down to nothing.
pub const MAX_TICK_HZ: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("tick_hz must be in 1..=1000")]
    TickRate,
    #[error("max_sub_steps must be positive")]
    SubSteps,
    #[error("{0} must be finite and non-negative")]
    Material(&'static str),
    #[error("gravity must be finite")]
    Gravity,
    #[error("{0} must be positive")]
    Queue(&'static str),
}

impl ServerConfig {
    /// Parses config from JSON. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Length of one fixed step in seconds.
    pub fn fixed_step(&self) -> f64 {
        1.0 / f64::from(self.tick_hz.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TICK_HZ).contains(&self.tick_hz) {
            return Err(ConfigError::TickRate);
        }
        if self.max_sub_steps == 0 {
            return Err(ConfigError::SubSteps);
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::Gravity);
        }
        for (name, value) in [
            ("friction", self.friction),
            ("restitution", self.restitution),
            ("linear_damping", self.linear_damping),
            ("angular_damping", self.angular_damping),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Material(name));
            }
        }
        if self.session_queue == 0 {
            return Err(ConfigError::Queue("session_queue"));
        }
        if self.command_queue == 0 {
            return Err(ConfigError::Queue("command_queue"));
        }
        Ok(())
    }
}
