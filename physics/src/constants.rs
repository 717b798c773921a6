/*!
Solver and integration tuning constants.

Distances are in meters, time in seconds, angles in radians unless the name
says otherwise. Per-world settings that callers commonly change live in
`settings::PhysicsConfig`; the values here are fixed tuning parameters.
*/

/// Generic small value for divisions, normalization and denominators.
pub const EPSILON: f32 = 1.0e-6;

/// Maximum contact points stored per collision record. Extra points are dropped.
pub const MAX_CONTACT_POINTS: usize = 10;

/// Gravity magnitude in meters per second squared (positive value).
pub const GRAVITY_MPS2: f32 = 9.81;

/// Component-wise cap on linear velocity (m/s).
pub const MAX_LINEAR_VELOCITY: f32 = 100.0;

/// Magnitude cap on angular velocity (rad/s).
pub const MAX_ANGULAR_VELOCITY: f32 = 50.0;

/// Angular velocity multiplier applied per step while a body has live collisions.
pub const COLLIDING_ANGULAR_DAMPING: f32 = 0.99;

/// Fraction of the auxiliary velocity kept on the axes perpendicular to gravity.
pub const AUX_CROSS_GRAVITY_DAMPING: f32 = 0.1;

/// Default seconds a body must stay below its activity thresholds before sleeping.
pub const DEFAULT_DEACTIVATION_TIME: f32 = 1.0;

/// Default linear activity threshold (m/s).
pub const DEFAULT_VELOCITY_ACTIVITY_THRESHOLD: f32 = 0.3;

/// Default angular activity threshold (degrees per second).
pub const DEFAULT_ANG_VELOCITY_ACTIVITY_THRESHOLD_DEG: f32 = 20.0;

/// Fraction of the deactivation time after which near-idle bodies start being damped.
pub const DEACTIVATION_DAMPING_START: f32 = 0.5;

/// Relative velocities below this are ignored by the contact solvers.
pub const MIN_VEL_FOR_PROCESSING: f32 = 0.001;

/// Lower bound for the effective-mass denominator of a contact point.
pub const MIN_CONTACT_DENOMINATOR: f32 = 1.0e-4;

/// Cap on the separation velocity requested for penetration recovery (m/s).
pub const MAX_PENETRATION_RECOVERY_VEL: f32 = 0.5;

/// Cap on the separation velocity requested by the shock step (m/s).
pub const MAX_SHOCK_RECOVERY_VEL: f32 = 0.05;

/// Timesteps over which the shock step removes penetration.
pub const SHOCK_RELAXATION_TIMESTEPS: f32 = 10.0;

/// Iterations of the shock contact routine per collision.
pub const SHOCK_ITERATIONS: usize = 5;

/// Squared distance under which a new contact inherits a cached impulse (m^2).
pub const CONTACT_CACHE_MATCH_DIST_SQ: f32 = 0.04;

/// Relative velocities below this are ignored by joint constraints.
pub const CONSTRAINT_MIN_VEL_FOR_PROCESSING: f32 = 0.01;

/// Cap on the corrective relative velocity a joint constraint may request (m/s).
pub const CONSTRAINT_MAX_VEL: f32 = 20.0;

/// Hinge joints with a forward limit above this (degrees) are treated as unlimited.
pub const HINGE_UNLIMITED_ANGLE_DEG: f32 = 150.0;

/// Allowed drift of the hinge mid-point before correction (meters).
pub const HINGE_MID_ALLOWED_DISTANCE: f32 = 0.005;

/// Relaxation time of the hinge mid-point constraint (seconds).
pub const HINGE_TIMESCALE: f32 = 1.0 / 20.0;
