//! Rigid body descriptions.
//!
//! `BodyData` is what arrives on the wire; `BodySpec` is the validated form the
//! server acts on. A `BodySpec` can only be obtained through [`BodySpec::new`]
//! or by deserializing a `BodyData`, so every instance is finite and
//! physically meaningful.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{Pose, Quat, Vec3};

/// Accepted mass range for dynamic bodies. Mass `0` (static) is always valid.
pub const MASS_RANGE: std::ops::RangeInclusive<f32> = 1.0e-3..=1.0e6;
/// Accepted range for every shape dimension.
pub const DIMENSION_RANGE: std::ops::RangeInclusive<f32> = 1.0e-3..=1.0e3;
/// Largest accepted absolute position coordinate.
pub const MAX_COORDINATE: f32 = 1.0e4;

/// Closed set of creatable body kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    Box,
    Sphere,
    Cylinder,
}

/// Kind-specific dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeParams {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Cylinder { radius: f32, height: f32 },
    /// Infinite upward-facing half-space at `y = 0`. Only the server's ground
    /// entity uses it; it cannot be requested by clients.
    Ground,
}

impl ShapeParams {
    /// Maps a wire `scale` onto the dimensions of `kind`.
    pub fn from_scale(kind: BodyKind, scale: Scale) -> Self {
        match (kind, scale) {
            (BodyKind::Box, Scale::Uniform(s)) => ShapeParams::Box {
                half_extents: Vec3::new(s, s, s),
            },
            (BodyKind::Box, Scale::Extents(v)) => ShapeParams::Box { half_extents: v },
            (BodyKind::Sphere, Scale::Uniform(r)) => ShapeParams::Sphere { radius: r },
            (BodyKind::Sphere, Scale::Extents(v)) => ShapeParams::Sphere { radius: v.x },
            (BodyKind::Cylinder, Scale::Uniform(r)) => ShapeParams::Cylinder {
                radius: r,
                height: r * 2.0,
            },
            (BodyKind::Cylinder, Scale::Extents(v)) => ShapeParams::Cylinder {
                radius: v.x,
                height: v.y * 2.0,
            },
        }
    }

    /// Kind this shape belongs to, `None` for the ground.
    pub fn kind(&self) -> Option<BodyKind> {
        match self {
            ShapeParams::Box { .. } => Some(BodyKind::Box),
            ShapeParams::Sphere { .. } => Some(BodyKind::Sphere),
            ShapeParams::Cylinder { .. } => Some(BodyKind::Cylinder),
            ShapeParams::Ground => None,
        }
    }

    fn dimensions(&self) -> Vec<f32> {
        match *self {
            ShapeParams::Box { half_extents } => half_extents.to_array().to_vec(),
            ShapeParams::Sphere { radius } => vec![radius],
            ShapeParams::Cylinder { radius, height } => vec![radius, height],
            ShapeParams::Ground => Vec::new(),
        }
    }
}

/// Wire `scale`: either a single number or a per-axis vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scale {
    Uniform(f32),
    Extents(Vec3),
}

impl Default for Scale {
    fn default() -> Self {
        Scale::Uniform(1.0)
    }
}

/// `bodyData` payload of a `createBody` command, as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyData {
    #[serde(rename = "type")]
    pub kind: BodyKind,
    pub mass: f32,
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Quat,
    #[serde(default)]
    pub scale: Scale,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BodySpecError {
    #[error("mass must be 0 or lie in [1e-3, 1e6], got {0}")]
    Mass(f32),
    #[error("position coordinates must be within ±1e4")]
    Position,
    #[error("orientation must be a finite, non-zero quaternion")]
    Orientation,
    #[error("shape dimensions must lie in [1e-3, 1e3]")]
    Shape,
    #[error("shape does not match body kind {0:?}")]
    KindMismatch(BodyKind),
}

/// Validated body creation request.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "BodyData")]
pub struct BodySpec {
    kind: BodyKind,
    mass: f32,
    pose: Pose,
    shape: ShapeParams,
}

impl BodySpec {
    /// Validates the inputs. The orientation is normalized; mass `0` denotes a
    /// static body. Finite but extreme values are rejected too: the physics
    /// backend cannot integrate them.
    pub fn new(
        kind: BodyKind,
        mass: f32,
        position: Vec3,
        orientation: Quat,
        shape: ShapeParams,
    ) -> Result<Self, BodySpecError> {
        if mass != 0.0 && !MASS_RANGE.contains(&mass) {
            return Err(BodySpecError::Mass(mass));
        }
        if !position.is_finite()
            || position
                .to_array()
                .iter()
                .any(|c| c.abs() > MAX_COORDINATE)
        {
            return Err(BodySpecError::Position);
        }
        let orientation = orientation
            .normalized()
            .ok_or(BodySpecError::Orientation)?;
        if shape.kind() != Some(kind) {
            return Err(BodySpecError::KindMismatch(kind));
        }
        if shape
            .dimensions()
            .iter()
            .any(|d| !DIMENSION_RANGE.contains(d))
        {
            return Err(BodySpecError::Shape);
        }
        Ok(Self {
            kind,
            mass,
            pose: Pose::new(position, orientation),
            shape,
        })
    }

    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn shape(&self) -> ShapeParams {
        self.shape
    }

    pub fn is_static(&self) -> bool {
        self.mass == 0.0
    }
}

impl TryFrom<BodyData> for BodySpec {
    type Error = BodySpecError;

    fn try_from(data: BodyData) -> Result<Self, Self::Error> {
        BodySpec::new(
            data.kind,
            data.mass,
            data.position,
            data.rotation,
            ShapeParams::from_scale(data.kind, data.scale),
        )
    }
}

impl From<BodySpec> for BodyData {
    fn from(spec: BodySpec) -> Self {
        let scale = match spec.shape {
            ShapeParams::Box { half_extents } => Scale::Extents(half_extents),
            ShapeParams::Sphere { radius } => Scale::Uniform(radius),
            ShapeParams::Cylinder { radius, height } => {
                Scale::Extents(Vec3::new(radius, height / 2.0, radius))
            }
            ShapeParams::Ground => Scale::default(),
        };
        BodyData {
            kind: spec.kind,
            mass: spec.mass,
            position: spec.pose.position,
            rotation: spec.pose.orientation,
            scale,
        }
    }
}
