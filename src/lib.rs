pub mod math;
pub use math::{uv, Angle, Interval, Vec2};

pub mod physics;
pub use physics::{
    aabb::AABB,
    body::{Edge, ForceMode, Mass, Material, Mode, RigidBody, Vertex},
    bvh::{AabbTree, LeafHandle},
    collision::{self, Manifold},
    error::{BodyError, WorldError},
    params::WorldParams,
    runner::SharedWorld,
    solver::Correction,
    BodyKey, BodySnapshot, StepStats, World, WorldSnapshot, WorldState,
};

pub(crate) mod util;
