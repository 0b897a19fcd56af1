//! The simulated world: registry, clock and physics backend behind one owner.
//!
//! `World` is plain synchronous state. It is driven by the replication actor,
//! which guarantees that commands and ticks never interleave.

use std::time::Instant;

use sim_shared::{
    body::BodySpec,
    protocol::{Bodies, ClientCommand, EntityId, ServerEvent},
};
use tracing::{debug, info, warn};

use crate::{
    clock::{ClockState, SimulationClock},
    physics::{PhysicsBackend, PhysicsError},
    registry::{EntityRegistry, RegistryError},
};

/// Result of one [`World::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tick {
    /// Fixed steps applied.
    pub steps: u32,
    /// Bodies removed because the backend produced a non-finite pose for
    /// them. Observers must be told with `bodyRemoved`.
    pub evicted: Vec<EntityId>,
}

pub struct World<P: PhysicsBackend> {
    physics: P,
    registry: EntityRegistry<P::Handle>,
    clock: SimulationClock,
}

impl<P: PhysicsBackend> World<P> {
    pub fn new(physics: P, fixed_step: f64, max_sub_steps: u32) -> Self {
        Self {
            physics,
            registry: EntityRegistry::default(),
            clock: SimulationClock::new(fixed_step, max_sub_steps),
        }
    }

    /// Adds the permanent ground plane.
    pub fn with_ground(mut self) -> Self {
        self.registry.install_ground(&mut self.physics);
        self
    }

    pub fn create_body(&mut self, spec: BodySpec) -> EntityId {
        let id = self.registry.create(&mut self.physics, spec);
        info!(id = %id, kind = ?spec.kind(), mass = spec.mass(), "Body created");
        id
    }

    pub fn remove_body(&mut self, id: EntityId) -> Result<(), RegistryError> {
        self.registry.remove(&mut self.physics, id)?;
        info!(id = %id, "Body removed");
        Ok(())
    }

    pub fn reset(&mut self, now: Instant) -> Vec<EntityId> {
        let removed = self.registry.reset_all(&mut self.physics);
        self.clock.reset(now);
        info!(removed = removed.len(), "World reset");
        removed
    }

    /// Applies one command and returns the event to broadcast, if any.
    pub fn apply(&mut self, command: ClientCommand, now: Instant) -> Option<ServerEvent> {
        match command {
            ClientCommand::CreateBody { body } => {
                let id = self.create_body(body);
                Some(ServerEvent::body_created(id, body.kind(), body.pose()))
            }
            ClientCommand::RemoveBody { id } => match self.remove_body(id) {
                Ok(()) => Some(ServerEvent::BodyRemoved { id }),
                Err(e) => {
                    debug!(error = %e, "Remove ignored");
                    None
                }
            },
            ClientCommand::ResetWorld => {
                self.reset(now);
                Some(ServerEvent::WorldReset)
            }
            ClientCommand::Pause => {
                if self.clock.pause() {
                    info!("Simulation paused");
                }
                Some(ServerEvent::Pause)
            }
            ClientCommand::Resume => {
                if self.clock.resume(now) {
                    info!("Simulation resumed");
                }
                Some(ServerEvent::Resume)
            }
        }
    }

    /// Runs the fixed steps due at `now` and refreshes the pose mirror.
    /// Bodies that came out of the step with a non-finite pose are removed so
    /// they cannot stall the rest of the world. On error the mirror keeps its
    /// last good poses.
    pub fn tick(&mut self, now: Instant) -> Result<Tick, PhysicsError> {
        let steps = self.clock.advance(now);
        if steps == 0 {
            return Ok(Tick::default());
        }
        let dt = self.clock.fixed_step() as f32;
        for _ in 0..steps {
            self.physics.step(dt)?;
        }
        let evicted = self.registry.sync_poses(&self.physics)?;
        for &id in &evicted {
            // Ids come straight from the registry, so removal cannot miss.
            if let Err(e) = self.registry.remove(&mut self.physics, id) {
                debug!(id = %id, error = %e, "Eviction skipped");
                continue;
            }
            warn!(id = %id, "Body evicted after non-finite pose");
        }
        Ok(Tick { steps, evicted })
    }

    pub fn snapshot(&self) -> Bodies {
        self.registry.snapshot()
    }

    pub fn registry(&self) -> &EntityRegistry<P::Handle> {
        &self.registry
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn is_paused(&self) -> bool {
        self.clock.state() == ClockState::Paused
    }

    pub fn physics(&self) -> &P {
        &self.physics
    }
}
