//! Command/event protocol handler.
//!
//! Decoding happens on the connection tasks so malformed frames never reach
//! the world. Everything here runs on the world actor: apply a command,
//! encode the resulting event once and fan it out.

use std::{sync::Arc, time::Instant};

use sim_shared::protocol::{self, ClientCommand, ProtocolError, ServerEvent};
use tracing::{debug, error, warn};

use crate::{
    physics::PhysicsBackend,
    session::{Frame, SessionId, SessionManager},
    world::World,
};

/// Serializes an event into a shareable frame.
pub fn encode(event: &ServerEvent) -> Result<Frame, ProtocolError> {
    protocol::encode_event(event).map(Arc::from)
}

/// Parses an inbound text frame. Failures are logged and swallowed; the
/// connection stays open.
pub fn decode(session: SessionId, text: &str) -> Option<ClientCommand> {
    match protocol::decode_command(text) {
        Ok(command) => Some(command),
        Err(e) => {
            warn!(session = ?session, error = %e, "Dropping malformed command");
            None
        }
    }
}

/// Applies a command from `from` and broadcasts the resulting event to every
/// session, the sender included.
pub fn handle_command<P: PhysicsBackend>(
    world: &mut World<P>,
    sessions: &mut SessionManager,
    from: SessionId,
    command: ClientCommand,
    now: Instant,
) {
    let name = command.name();
    let Some(event) = world.apply(command, now) else {
        debug!(session = ?from, command = name, "Command had no effect");
        return;
    };
    debug!(session = ?from, command = name, event = event.name(), "Command applied");
    broadcast(sessions, &event);
}

/// Encodes `event` once and queues it for all sessions.
pub fn broadcast(sessions: &mut SessionManager, event: &ServerEvent) {
    match encode(event) {
        Ok(frame) => {
            sessions.broadcast(&frame);
        }
        Err(e) => error!(event = event.name(), error = %e, "Failed to encode event"),
    }
}

/// The private `initialState` frame for a joining session.
pub fn initial_state<P: PhysicsBackend>(world: &World<P>) -> Result<Frame, ProtocolError> {
    encode(&ServerEvent::InitialState {
        bodies: world.snapshot(),
    })
}
