//! Entity registry.
//!
//! Owns the identity and lifecycle of every simulated body. Each entry is
//! paired with exactly one physics handle: the two are added and removed in
//! the same call, so the registry and the backend never diverge.
//!
//! Poses are owned by the physics backend. The registry keeps a read-only
//! mirror that [`EntityRegistry::sync_poses`] refreshes after each step.
//! Entities whose backend pose turns non-finite keep their last good pose and
//! are reported back so the caller can evict them.

use std::collections::BTreeMap;

use sim_shared::{
    body::{BodyKind, BodySpec, ShapeParams},
    math::Pose,
    protocol::{Bodies, BodyState, EntityId},
};
use thiserror::Error;
use tracing::debug;

use crate::physics::{PhysicsBackend, PhysicsError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("entity {0} not found")]
    NotFound(EntityId),
    #[error("entity {0} is permanent")]
    Permanent(EntityId),
}

/// A live simulated body.
#[derive(Debug, Clone)]
pub struct Entity<H> {
    pub id: EntityId,
    pub kind: BodyKind,
    /// Mirror of the backend pose as of the last sync.
    pub pose: Pose,
    handle: H,
}

#[derive(Debug)]
pub struct EntityRegistry<H> {
    next_id: u64,
    entities: BTreeMap<EntityId, Entity<H>>,
    ground: Option<H>,
}

impl<H> Default for EntityRegistry<H> {
    fn default() -> Self {
        Self {
            next_id: EntityId::GROUND.0 + 1,
            entities: BTreeMap::new(),
            ground: None,
        }
    }
}

impl<H: Copy> EntityRegistry<H> {
    /// Creates the permanent ground entity. Later calls are no-ops.
    pub fn install_ground<P>(&mut self, physics: &mut P) -> EntityId
    where
        P: PhysicsBackend<Handle = H>,
    {
        if self.ground.is_none() {
            let handle = physics.add_body(&ShapeParams::Ground, 0.0, Pose::default());
            self.ground = Some(handle);
            debug!("Ground entity installed");
        }
        EntityId::GROUND
    }

    pub fn has_ground(&self) -> bool {
        self.ground.is_some()
    }

    /// Adds a body and its physics counterpart. `BodySpec` is already
    /// validated, so this cannot fail on parameters.
    pub fn create<P>(&mut self, physics: &mut P, spec: BodySpec) -> EntityId
    where
        P: PhysicsBackend<Handle = H>,
    {
        let id = EntityId(self.next_id);
        self.next_id += 1;

        let handle = physics.add_body(&spec.shape(), spec.mass(), spec.pose());
        self.entities.insert(
            id,
            Entity {
                id,
                kind: spec.kind(),
                pose: spec.pose(),
                handle,
            },
        );
        id
    }

    pub fn remove<P>(&mut self, physics: &mut P, id: EntityId) -> Result<(), RegistryError>
    where
        P: PhysicsBackend<Handle = H>,
    {
        if id == EntityId::GROUND && self.ground.is_some() {
            return Err(RegistryError::Permanent(id));
        }
        let entity = self
            .entities
            .remove(&id)
            .ok_or(RegistryError::NotFound(id))?;
        physics.remove_body(entity.handle);
        Ok(())
    }

    /// Removes every entity except the ground. Returns the removed ids in
    /// ascending order. Ids are not recycled.
    pub fn reset_all<P>(&mut self, physics: &mut P) -> Vec<EntityId>
    where
        P: PhysicsBackend<Handle = H>,
    {
        let removed = std::mem::take(&mut self.entities);
        removed
            .into_values()
            .map(|entity| {
                physics.remove_body(entity.handle);
                entity.id
            })
            .collect()
    }

    /// Copies current poses out of the backend and returns the ids whose pose
    /// is non-finite; those keep their previous pose. A body missing from the
    /// backend is an error and leaves the whole mirror untouched.
    pub fn sync_poses<P>(&mut self, physics: &P) -> Result<Vec<EntityId>, PhysicsError>
    where
        P: PhysicsBackend<Handle = H>,
    {
        let mut fresh = Vec::with_capacity(self.entities.len());
        for entity in self.entities.values() {
            let pose = physics
                .pose(entity.handle)
                .ok_or_else(|| PhysicsError::MissingBody(entity.id.to_string()))?;
            fresh.push(pose);
        }
        let mut poisoned = Vec::new();
        for (entity, pose) in self.entities.values_mut().zip(fresh) {
            if pose.is_finite() {
                entity.pose = pose;
            } else {
                poisoned.push(entity.id);
            }
        }
        Ok(poisoned)
    }

    /// Consistent view of every non-ground body, ordered by id.
    pub fn snapshot(&self) -> Bodies {
        self.entities
            .values()
            .map(|e| (e.id, BodyState::new(e.kind, e.pose)))
            .collect()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity<H>> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of non-ground entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
