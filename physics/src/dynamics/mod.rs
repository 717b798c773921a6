/*!
Rigid-body dynamics: bodies, constraints, controllers and the contact solvers.

- body:          `Body` state, impulses, forces, integration and activity
- constraint:    point, max-distance, world-point and velocity constraints
- joint:         controllers, including the hinge joint built from constraints
- island:        flood-filled groups of touching bodies for sleep decisions
- contact_cache: per body-pair impulse cache for warm starting
- solver:        the four sequential-impulse contact strategies and shock processing
*/

pub mod body;
pub mod constraint;
pub mod contact_cache;
pub mod island;
pub mod joint;
pub mod solver;

pub use body::{Activity, Body, BodyHandle, BodyHooks, BodySet};
pub use constraint::{
    Constraint, ConstraintHandle, ConstraintKind, ConstraintSet, MaxDistanceConstraint,
    PointConstraint, ReferenceFrame, VelocityConstraint, WorldPointConstraint,
};
pub use contact_cache::{BodyPairKey, CachedImpulse, ContactCache};
pub use island::{CollisionIsland, build_islands};
pub use joint::{Controller, ControllerFn, ControllerHandle, HingeDesc, HingeJoint};
pub use solver::ContactSolver;
