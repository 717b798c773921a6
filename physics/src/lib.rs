//! Rigid-body physics and collision detection.
//!
//! A [`PhysicsSystem`] owns bodies, collision skins, constraints and
//! controllers and advances them with [`PhysicsSystem::integrate`].

pub mod collision;
pub mod constants;
pub mod dynamics;
pub mod error;
pub mod math;
pub mod settings;
pub mod system;

pub use collision::{
    BroadPhase, CollisionInfo, CollisionSkin, MaterialId, MaterialProperties, Primitive, Segment,
    SegmentHit, SkinHandle,
};
pub use dynamics::{
    Body, BodyHandle, BodyHooks, Constraint, ConstraintHandle, Controller, ControllerHandle,
    HingeDesc,
};
pub use error::{PhysicsError, Result};
pub use math::{Quat, Transform, Vec3};
pub use settings::{BroadPhaseKind, GridParams, PhysicsConfig, SolverType};
pub use system::PhysicsSystem;
