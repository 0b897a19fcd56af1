//! `sim_shared`
//!
//! Types shared by the simulation server and its observers.
//!
//! Design goals:
//! - One wire protocol definition used on both ends.
//! - Invalid body parameters are rejected at the type level.
//! - No `unsafe`.

pub mod body;
pub mod config;
pub mod math;
pub mod protocol;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::body::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::protocol::*;
}
