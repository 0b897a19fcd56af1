//! Client-side world mirror.
//!
//! Replays the server's event stream into a local copy of the body table.
//! This is everything a renderer or a protocol bridge needs; neither ever
//! sees registry or clock internals.

use sim_shared::protocol::{Bodies, BodyState, EntityId, ServerEvent};

#[derive(Debug, Default, Clone)]
pub struct WorldMirror {
    bodies: Bodies,
    paused: bool,
    /// Set once `initialState` has been seen.
    synced: bool,
    snapshots: u64,
}

impl WorldMirror {
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::InitialState { bodies } => {
                self.bodies = bodies.clone();
                self.synced = true;
            }
            ServerEvent::WorldState { bodies } => {
                self.bodies = bodies.clone();
                self.snapshots += 1;
            }
            ServerEvent::BodyCreated {
                id,
                kind,
                position,
                quaternion,
            } => {
                self.bodies.insert(
                    *id,
                    BodyState {
                        position: *position,
                        quaternion: *quaternion,
                        kind: *kind,
                    },
                );
            }
            ServerEvent::BodyRemoved { id } => {
                self.bodies.remove(id);
            }
            ServerEvent::WorldReset => self.bodies.clear(),
            ServerEvent::Pause => self.paused = true,
            ServerEvent::Resume => self.paused = false,
        }
    }

    pub fn bodies(&self) -> &Bodies {
        &self.bodies
    }

    pub fn get(&self, id: EntityId) -> Option<&BodyState> {
        self.bodies.get(&id)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Number of `worldState` snapshots applied.
    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }
}

#[cfg(test)]
mod tests {
    use sim_shared::{body::BodyKind, math::Pose};

    use super::*;

    #[test]
    fn replays_lifecycle_events() {
        let mut mirror = WorldMirror::default();
        mirror.apply(&ServerEvent::InitialState {
            bodies: Bodies::new(),
        });
        assert!(mirror.is_synced());

        mirror.apply(&ServerEvent::body_created(EntityId(1), BodyKind::Box, Pose::default()));
        mirror.apply(&ServerEvent::body_created(EntityId(2), BodyKind::Sphere, Pose::default()));
        mirror.apply(&ServerEvent::BodyRemoved { id: EntityId(1) });
        assert!(mirror.get(EntityId(1)).is_none());
        assert_eq!(mirror.get(EntityId(2)).unwrap().kind, BodyKind::Sphere);

        mirror.apply(&ServerEvent::Pause);
        assert!(mirror.is_paused());
        mirror.apply(&ServerEvent::WorldReset);
        assert!(mirror.bodies().is_empty());
        mirror.apply(&ServerEvent::Resume);
        assert!(!mirror.is_paused());
    }

    #[test]
    fn world_state_replaces_everything() {
        let mut mirror = WorldMirror::default();
        mirror.apply(&ServerEvent::body_created(EntityId(5), BodyKind::Box, Pose::default()));
        let mut bodies = Bodies::new();
        bodies.insert(EntityId(6), BodyState::new(BodyKind::Cylinder, Pose::default()));
        mirror.apply(&ServerEvent::WorldState { bodies });
        assert_eq!(mirror.bodies().keys().copied().collect::<Vec<_>>(), vec![EntityId(6)]);
        assert_eq!(mirror.snapshots(), 1);
    }
}
