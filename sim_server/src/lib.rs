//! `sim_server`
//!
//! Authoritative rigid-body simulation server:
//! - Entity registry paired one-to-one with physics bodies
//! - Fixed-step simulation clock with sub-step clamping
//! - Session manager with backpressure-aware fan-out
//! - Single-owner world actor that ticks, snapshots and broadcasts
//!
//! Networking model:
//! - HTTP: `GET /status` liveness probe
//! - WebSocket: JSON commands in, JSON events out

pub mod clock;
pub mod handler;
pub mod physics;
pub mod rapier;
pub mod registry;
pub mod replication;
pub mod server;
pub mod session;
pub mod transport;
pub mod world;

pub use server::SimServer;
