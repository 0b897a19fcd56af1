//! Physics capability.
//!
//! The server never does collision or contact math itself. It only creates
//! and removes bodies, asks the backend to take fixed steps, and reads poses
//! back. Anything implementing [`PhysicsBackend`] can drive the world.

use std::fmt::Debug;

use sim_shared::{
    body::ShapeParams,
    config::ServerConfig,
    math::{Pose, Vec3},
};
use thiserror::Error;

/// Surface and damping parameters applied to new bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for Material {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            friction: cfg.friction,
            restitution: cfg.restitution,
            linear_damping: cfg.linear_damping,
            angular_damping: cfg.angular_damping,
        }
    }
}

/// World-wide physics parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    pub material: Material,
    pub allow_sleep: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for PhysicsConfig {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            gravity: cfg.gravity,
            material: Material::from(cfg),
            allow_sleep: cfg.allow_sleep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// A registered handle is unknown to the backend.
    #[error("backend lost body {0}")]
    MissingBody(String),
    #[error("step failed: {0}")]
    Step(String),
}

/// Opaque rigid-body engine.
pub trait PhysicsBackend: Send {
    type Handle: Copy + Eq + Debug + Send;

    /// Adds a body. `mass == 0` makes it static.
    fn add_body(&mut self, shape: &ShapeParams, mass: f32, pose: Pose) -> Self::Handle;

    fn remove_body(&mut self, handle: Self::Handle);

    /// Advances the simulation by exactly `dt` seconds.
    fn step(&mut self, dt: f32) -> Result<(), PhysicsError>;

    fn pose(&self, handle: Self::Handle) -> Option<Pose>;

    fn body_count(&self) -> usize;
}
