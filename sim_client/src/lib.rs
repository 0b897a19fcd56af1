//! `sim_client`
//!
//! Observer-side systems:
//! - WebSocket connection to the simulation server
//! - Command helpers (create/remove bodies, reset, pause, resume)
//! - A local mirror of the replicated world

pub mod client;
pub mod mirror;

pub use client::WorldClient;
pub use mirror::WorldMirror;
