//! `rapier3d` backend.

use rapier3d::na::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use sim_shared::{
    body::ShapeParams,
    math::{Pose, Quat, Vec3},
};
use tracing::debug;

use crate::physics::{PhysicsBackend, PhysicsConfig, PhysicsError};

/// Rigid-body world backed by rapier's physics pipeline.
pub struct RapierPhysics {
    cfg: PhysicsConfig,
    gravity: Vector3<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    query: QueryPipeline,
}

impl RapierPhysics {
    pub fn new(cfg: PhysicsConfig) -> Self {
        let gravity = Vector3::new(cfg.gravity.x, cfg.gravity.y, cfg.gravity.z);
        Self {
            cfg,
            gravity,
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query: QueryPipeline::new(),
        }
    }

    fn collider(&self, shape: &ShapeParams, mass: f32) -> Collider {
        let builder = match *shape {
            ShapeParams::Box { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            ShapeParams::Sphere { radius } => ColliderBuilder::ball(radius),
            ShapeParams::Cylinder { radius, height } => {
                ColliderBuilder::cylinder(height / 2.0, radius)
            }
            ShapeParams::Ground => ColliderBuilder::halfspace(Vector3::y_axis()),
        };
        let builder = builder
            .friction(self.cfg.material.friction)
            .restitution(self.cfg.material.restitution);
        if mass > 0.0 {
            builder.mass(mass).build()
        } else {
            builder.build()
        }
    }
}

impl Default for RapierPhysics {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

fn to_isometry(pose: Pose) -> Isometry3<Real> {
    let p = pose.position;
    let q = pose.orientation;
    Isometry3::from_parts(
        Translation3::new(p.x, p.y, p.z),
        UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z)),
    )
}

impl PhysicsBackend for RapierPhysics {
    type Handle = RigidBodyHandle;

    fn add_body(&mut self, shape: &ShapeParams, mass: f32, pose: Pose) -> RigidBodyHandle {
        let builder = if mass > 0.0 {
            RigidBodyBuilder::dynamic()
                .linear_damping(self.cfg.material.linear_damping)
                .angular_damping(self.cfg.material.angular_damping)
                .can_sleep(self.cfg.allow_sleep)
        } else {
            RigidBodyBuilder::fixed()
        };
        let body = builder.position(to_isometry(pose)).build();
        let handle = self.bodies.insert(body);
        let collider = self.collider(shape, mass);
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        debug!(?handle, ?shape, mass, "Rapier body added");
        handle
    }

    fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    fn step(&mut self, dt: f32) -> Result<(), PhysicsError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PhysicsError::Step(format!("invalid step length {dt}")));
        }
        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query),
            &(),
            &(),
        );
        Ok(())
    }

    fn pose(&self, handle: RigidBodyHandle) -> Option<Pose> {
        let body = self.bodies.get(handle)?;
        let t = body.translation();
        let r = body.rotation();
        Some(Pose::new(
            Vec3::new(t.x, t.y, t.z),
            Quat::new(r.i, r.j, r.k, r.w),
        ))
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}
