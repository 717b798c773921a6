//! Rigid bodies.
//!
//! A body keeps three transform/velocity snapshots:
//! - current: what the integrator advances,
//! - old: the pose at the start of the step (contact offsets are relative to it),
//! - stored: scratch used for speculative integration and null updates.
//!
//! Penetration recovery writes to a separate auxiliary velocity that is folded
//! into the position update and then discarded, so it never shows up as
//! momentum.

use std::fmt;

use slotmap::SlotMap;

use crate::collision::{CollisionId, SkinHandle};
use crate::constants::{
    AUX_CROSS_GRAVITY_DAMPING, COLLIDING_ANGULAR_DAMPING, DEACTIVATION_DAMPING_START,
    DEFAULT_ANG_VELOCITY_ACTIVITY_THRESHOLD_DEG, DEFAULT_DEACTIVATION_TIME,
    DEFAULT_VELOCITY_ACTIVITY_THRESHOLD, MAX_ANGULAR_VELOCITY, MAX_LINEAR_VELOCITY,
};
use crate::dynamics::ConstraintHandle;
use crate::math::{Mat3, Quat, Transform, TransformRate, Vec3, rotate_tensor, safe_inv, safe_inv_diagonal};

slotmap::new_key_type! {
    pub struct BodyHandle;
}

pub type BodySet = SlotMap<BodyHandle, Body>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Activity {
    #[default]
    Active,
    Inactive,
}

/// Per-body callbacks run by the integrator.
pub trait BodyHooks {
    fn pre_physics(&mut self, _body: &mut Body, _dt: f32) {}
    /// Runs after the body's forces were cleared and gravity was added.
    fn add_external_forces(&mut self, _body: &mut Body, _dt: f32) {}
    fn post_physics(&mut self, _body: &mut Body, _dt: f32) {}
}

#[derive(Clone, Debug)]
struct MovementActivation {
    stored_position: Vec3,
    threshold_sq: f32,
    bodies: Vec<BodyHandle>,
}

/// Full kinematic state, used to undo a step in null-update mode.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BodySnapshot {
    transform: Transform,
    old_transform: Transform,
    rate: TransformRate,
    old_rate: TransformRate,
    activity: Activity,
    inactive_time: f32,
}

pub struct Body {
    transform: Transform,
    old_transform: Transform,
    stored_transform: Transform,
    rate: TransformRate,
    old_rate: TransformRate,
    stored_rate: TransformRate,
    rate_aux: TransformRate,

    mass: f32,
    inv_mass: f32,
    body_inertia: Mat3,
    body_inv_inertia: Mat3,
    world_inertia: Mat3,
    world_inv_inertia: Mat3,

    force: Vec3,
    torque: Vec3,

    activity: Activity,
    inactive_time: f32,
    deactivation_time: f32,
    sqr_velocity_activity_threshold: f32,
    sqr_ang_velocity_activity_threshold: f32,

    immovable: bool,
    orig_immovable: bool,
    allow_freezing: bool,
    do_shock_processing: bool,
    velocity_changed: bool,
    enabled: bool,

    skin: Option<SkinHandle>,
    pub(crate) constraints: Vec<ConstraintHandle>,
    pub(crate) collisions: Vec<CollisionId>,
    movement_activation: Option<MovementActivation>,
    hooks: Option<Box<dyn BodyHooks>>,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("transform", &self.transform)
            .field("rate", &self.rate)
            .field("mass", &self.mass)
            .field("activity", &self.activity)
            .field("immovable", &self.immovable)
            .field("skin", &self.skin)
            .finish_non_exhaustive()
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::new()
    }
}

impl Body {
    /// A unit-mass, unit-inertia body at the origin.
    pub fn new() -> Self {
        let mut body = Self {
            transform: Transform::identity(),
            old_transform: Transform::identity(),
            stored_transform: Transform::identity(),
            rate: TransformRate::zero(),
            old_rate: TransformRate::zero(),
            stored_rate: TransformRate::zero(),
            rate_aux: TransformRate::zero(),
            mass: 1.0,
            inv_mass: 1.0,
            body_inertia: Mat3::identity(),
            body_inv_inertia: Mat3::identity(),
            world_inertia: Mat3::identity(),
            world_inv_inertia: Mat3::identity(),
            force: Vec3::zeros(),
            torque: Vec3::zeros(),
            activity: Activity::Active,
            inactive_time: 0.0,
            deactivation_time: DEFAULT_DEACTIVATION_TIME,
            sqr_velocity_activity_threshold: 0.0,
            sqr_ang_velocity_activity_threshold: 0.0,
            immovable: false,
            orig_immovable: false,
            allow_freezing: true,
            do_shock_processing: true,
            velocity_changed: false,
            enabled: false,
            skin: None,
            constraints: Vec::new(),
            collisions: Vec::new(),
            movement_activation: None,
            hooks: None,
        };
        body.set_activity_threshold(
            DEFAULT_VELOCITY_ACTIVITY_THRESHOLD,
            DEFAULT_ANG_VELOCITY_ACTIVITY_THRESHOLD_DEG,
        );
        body
    }

    /// A movable body at `position` with the given mass.
    pub fn at(position: Vec3, mass: f32) -> Self {
        let mut body = Self::new();
        body.set_mass(mass);
        body.move_to(position, Quat::identity());
        body
    }

    // ----------------------------------------------------------------------
    // Pose and velocity

    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[inline]
    pub fn old_transform(&self) -> &Transform {
        &self.old_transform
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    #[inline]
    pub fn old_position(&self) -> Vec3 {
        self.old_transform.position
    }

    #[inline]
    pub fn orientation(&self) -> Quat {
        self.transform.orientation
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.transform.orientation = orientation;
        self.update_world_inertia();
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.rate.velocity
    }

    #[inline]
    pub fn ang_velocity(&self) -> Vec3 {
        self.rate.ang_velocity
    }

    #[inline]
    pub fn old_velocity(&self) -> Vec3 {
        self.old_rate.velocity
    }

    /// Ignored on immovable bodies, like the impulse family.
    pub fn set_velocity(&mut self, v: Vec3) {
        if self.immovable {
            return;
        }
        self.rate.velocity = v;
        self.velocity_changed = true;
    }

    pub fn set_ang_velocity(&mut self, w: Vec3) {
        if self.immovable {
            return;
        }
        self.rate.ang_velocity = w;
        self.velocity_changed = true;
    }

    #[inline]
    pub fn velocity_aux(&self) -> Vec3 {
        self.rate_aux.velocity
    }

    #[inline]
    pub fn ang_velocity_aux(&self) -> Vec3 {
        self.rate_aux.ang_velocity
    }

    pub fn set_velocity_aux(&mut self, v: Vec3) {
        self.rate_aux.velocity = v;
    }

    pub fn set_ang_velocity_aux(&mut self, w: Vec3) {
        self.rate_aux.ang_velocity = w;
    }

    /// Velocity of the point at world offset `r` from the body position.
    #[inline]
    pub fn velocity_at(&self, r: &Vec3) -> Vec3 {
        self.rate.velocity + self.rate.ang_velocity.cross(r)
    }

    /// Auxiliary velocity of the point at world offset `r`.
    #[inline]
    pub fn velocity_aux_at(&self, r: &Vec3) -> Vec3 {
        self.rate_aux.velocity + self.rate_aux.ang_velocity.cross(r)
    }

    /// Teleport to `position`/`orientation`, zeroing velocity and waking the body.
    ///
    /// Callers owning the body through a `PhysicsSystem` should use
    /// `PhysicsSystem::move_body_to`, which also moves the skin.
    pub fn move_to(&mut self, position: Vec3, orientation: Quat) {
        if self.enabled && !self.is_active() {
            self.set_active(1.0);
        }
        self.transform = Transform::new(position, orientation);
        self.rate = TransformRate::zero();
        self.rate_aux = TransformRate::zero();
        self.copy_current_state_to_old();
        self.update_world_inertia();
    }

    pub fn copy_current_state_to_old(&mut self) {
        self.old_transform = self.transform;
        self.old_rate = self.rate;
    }

    pub fn store_state(&mut self) {
        self.stored_transform = self.transform;
        self.stored_rate = self.rate;
    }

    pub fn restore_state(&mut self) {
        self.transform = self.stored_transform;
        self.rate = self.stored_rate;
        self.update_world_inertia();
    }

    pub(crate) fn snapshot(&self) -> BodySnapshot {
        BodySnapshot {
            transform: self.transform,
            old_transform: self.old_transform,
            rate: self.rate,
            old_rate: self.old_rate,
            activity: self.activity,
            inactive_time: self.inactive_time,
        }
    }

    pub(crate) fn restore_snapshot(&mut self, snap: &BodySnapshot) {
        self.transform = snap.transform;
        self.old_transform = snap.old_transform;
        self.rate = snap.rate;
        self.old_rate = snap.old_rate;
        self.rate_aux = TransformRate::zero();
        self.activity = snap.activity;
        self.inactive_time = snap.inactive_time;
        self.update_world_inertia();
    }

    // ----------------------------------------------------------------------
    // Mass and inertia

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Effective inverse mass: zero while immovable.
    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        if self.immovable { 0.0 } else { self.inv_mass }
    }

    /// Non-positive masses are rejected; use `set_immovable` for infinite mass.
    pub fn set_mass(&mut self, mass: f32) {
        if !(mass > 0.0 && mass.is_finite()) {
            log::warn!("ignoring invalid body mass {mass}");
            return;
        }
        self.mass = mass;
        self.inv_mass = safe_inv(mass);
    }

    pub fn set_inverse_mass(&mut self, inv_mass: f32) {
        if !(inv_mass > 0.0 && inv_mass.is_finite()) {
            log::warn!("ignoring invalid inverse mass {inv_mass}");
            return;
        }
        self.inv_mass = inv_mass;
        self.mass = safe_inv(inv_mass);
    }

    /// Principal moments in body space.
    pub fn set_body_inertia(&mut self, xx: f32, yy: f32, zz: f32) {
        let d = Vec3::new(xx, yy, zz);
        self.body_inertia = Mat3::from_diagonal(&d);
        self.body_inv_inertia = Mat3::from_diagonal(&safe_inv_diagonal(&d));
        self.update_world_inertia();
    }

    /// Full body-space tensor. A singular tensor yields a zero inverse.
    pub fn set_body_inertia_matrix(&mut self, inertia: Mat3) {
        self.body_inertia = inertia;
        self.body_inv_inertia = inertia.try_inverse().unwrap_or_else(Mat3::zeros);
        self.update_world_inertia();
    }

    pub fn set_body_inv_inertia(&mut self, xx: f32, yy: f32, zz: f32) {
        let d = Vec3::new(xx, yy, zz);
        self.body_inv_inertia = Mat3::from_diagonal(&d);
        self.body_inertia = Mat3::from_diagonal(&safe_inv_diagonal(&d));
        self.update_world_inertia();
    }

    #[inline]
    pub fn body_inertia(&self) -> &Mat3 {
        &self.body_inertia
    }

    #[inline]
    pub fn world_inertia(&self) -> &Mat3 {
        &self.world_inertia
    }

    /// Effective world inverse inertia: zero while immovable.
    #[inline]
    pub fn world_inv_inertia(&self) -> Mat3 {
        if self.immovable { Mat3::zeros() } else { self.world_inv_inertia }
    }

    fn update_world_inertia(&mut self) {
        let q = self.transform.orientation;
        self.world_inertia = rotate_tensor(&q, &self.body_inertia);
        self.world_inv_inertia = rotate_tensor(&q, &self.body_inv_inertia);
    }

    #[inline]
    pub fn is_immovable(&self) -> bool {
        self.immovable
    }

    pub fn set_immovable(&mut self, immovable: bool) {
        self.immovable = immovable;
        self.orig_immovable = immovable;
        if immovable {
            self.activity = Activity::Inactive;
            self.rate = TransformRate::zero();
            self.rate_aux = TransformRate::zero();
        } else {
            self.set_active(1.0);
        }
    }

    /// Temporary immovability used by the shock step.
    pub(crate) fn internal_set_immovable(&mut self) {
        self.immovable = true;
    }

    pub(crate) fn internal_restore_immovable(&mut self) {
        self.immovable = self.orig_immovable;
    }

    // ----------------------------------------------------------------------
    // Activity

    #[inline]
    pub fn activity(&self) -> Activity {
        self.activity
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.activity == Activity::Active
    }

    /// Wake the body. `activity_factor` in `[0, 1]` sets how much of the
    /// deactivation time is left before it may sleep again.
    pub fn set_active(&mut self, activity_factor: f32) {
        if self.orig_immovable {
            return;
        }
        self.activity = Activity::Active;
        self.inactive_time = (1.0 - activity_factor.clamp(0.0, 1.0)) * self.deactivation_time;
    }

    /// Put the body to sleep if both it and the system allow freezing.
    /// Sleeping bodies hold zero velocity.
    pub fn set_inactive(&mut self, freezing_enabled: bool) {
        if !self.allow_freezing || !freezing_enabled {
            return;
        }
        self.activity = Activity::Inactive;
        self.inactive_time = self.deactivation_time;
        self.rate = TransformRate::zero();
        self.rate_aux = TransformRate::zero();
    }

    pub fn allows_freezing(&self) -> bool {
        self.allow_freezing
    }

    pub fn set_allow_freezing(&mut self, allow: bool) {
        self.allow_freezing = allow;
        if !allow && !self.orig_immovable {
            self.set_active(1.0);
        }
    }

    pub fn set_deactivation_time(&mut self, seconds: f32) {
        self.deactivation_time = seconds.max(0.0);
    }

    #[inline]
    pub fn deactivation_time(&self) -> f32 {
        self.deactivation_time
    }

    #[inline]
    pub fn inactive_time(&self) -> f32 {
        self.inactive_time
    }

    /// Linear threshold in m/s, angular threshold in degrees per second.
    pub fn set_activity_threshold(&mut self, velocity: f32, ang_velocity_deg: f32) {
        self.sqr_velocity_activity_threshold = velocity * velocity;
        let w = ang_velocity_deg.to_radians();
        self.sqr_ang_velocity_activity_threshold = w * w;
    }

    /// True when either velocity exceeds its activity threshold.
    pub fn exceeds_activity_threshold(&self) -> bool {
        self.rate.velocity.norm_squared() > self.sqr_velocity_activity_threshold
            || self.rate.ang_velocity.norm_squared() > self.sqr_ang_velocity_activity_threshold
    }

    /// Reset the inactivity timer when moving, otherwise advance it.
    pub fn update_deactivation(&mut self, dt: f32) {
        if self.exceeds_activity_threshold() {
            self.inactive_time = 0.0;
        } else {
            self.inactive_time += dt;
        }
    }

    #[inline]
    pub fn should_be_active(&self) -> bool {
        self.inactive_time < self.deactivation_time
    }

    /// Scale velocities down as the body approaches deactivation.
    pub fn damp_for_deactivation(&mut self) {
        if self.deactivation_time <= 0.0 {
            return;
        }
        let frac = self.inactive_time / self.deactivation_time;
        let r = DEACTIVATION_DAMPING_START;
        if frac < r {
            return;
        }
        let scale = (1.0 - (frac - r) / (1.0 - r)).clamp(0.0, 1.0);
        self.rate.velocity *= scale;
        self.rate.ang_velocity *= scale;
    }

    #[inline]
    pub fn do_shock_processing(&self) -> bool {
        self.do_shock_processing
    }

    pub fn set_do_shock_processing(&mut self, enabled: bool) {
        self.do_shock_processing = enabled;
    }

    #[inline]
    pub fn velocity_changed(&self) -> bool {
        self.velocity_changed
    }

    pub(crate) fn clear_velocity_changed(&mut self) {
        self.velocity_changed = false;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    // ----------------------------------------------------------------------
    // Integration

    /// Apply accumulated force and torque over `dt`.
    pub fn update_velocity(&mut self, dt: f32) {
        if self.immovable || !self.is_active() {
            return;
        }
        self.rate.velocity += self.force * (dt * self.inv_mass);
        self.rate.ang_velocity += self.world_inv_inertia * self.torque * dt;
        if !self.collisions.is_empty() {
            self.rate.ang_velocity *= COLLIDING_ANGULAR_DAMPING;
        }
    }

    /// Advance the pose by the current velocity, conserving angular momentum.
    pub fn update_position(&mut self, dt: f32) {
        if self.immovable || !self.is_active() {
            return;
        }
        let ang_mom = self.world_inertia * self.rate.ang_velocity;
        let rate = self.rate;
        self.transform.apply_rate(&rate, dt);
        self.update_world_inertia();
        self.rate.ang_velocity = self.world_inv_inertia * ang_mom;
    }

    /// Advance the pose by velocity plus auxiliary velocity, then discard the
    /// auxiliary part. Sideways (non-gravity) aux velocity is mostly damped.
    pub fn update_position_with_aux(&mut self, dt: f32, gravity_axis: Option<usize>) {
        if self.immovable || !self.is_active() {
            self.rate_aux = TransformRate::zero();
            return;
        }
        if let Some(ga) = gravity_axis {
            self.rate_aux.velocity[(ga + 1) % 3] *= AUX_CROSS_GRAVITY_DAMPING;
            self.rate_aux.velocity[(ga + 2) % 3] *= AUX_CROSS_GRAVITY_DAMPING;
        }
        let ang_mom = self.world_inertia * self.rate.ang_velocity;
        let rate = self.rate.sum(&self.rate_aux);
        self.transform.apply_rate(&rate, dt);
        self.rate_aux = TransformRate::zero();
        self.update_world_inertia();
        self.rate.ang_velocity = self.world_inv_inertia * ang_mom;
    }

    /// Clamp linear velocity per component and angular velocity by magnitude.
    pub fn limit_velocities(&mut self) {
        let v = &mut self.rate.velocity;
        for i in 0..3 {
            v[i] = v[i].clamp(-MAX_LINEAR_VELOCITY, MAX_LINEAR_VELOCITY);
        }
        let w = self.rate.ang_velocity.norm();
        if w > MAX_ANGULAR_VELOCITY {
            self.rate.ang_velocity *= MAX_ANGULAR_VELOCITY / w;
        }
    }

    // ----------------------------------------------------------------------
    // Impulses

    pub fn apply_world_impulse(&mut self, impulse: &Vec3) {
        if self.immovable {
            return;
        }
        self.rate.velocity += impulse * self.inv_mass;
        self.velocity_changed = true;
    }

    pub fn apply_negated_world_impulse(&mut self, impulse: &Vec3) {
        self.apply_world_impulse(&-impulse);
    }

    /// Impulse applied at a world position.
    pub fn apply_world_impulse_at(&mut self, impulse: &Vec3, world_pos: &Vec3) {
        let delta = world_pos - self.transform.position;
        self.apply_body_world_impulse(impulse, &delta);
    }

    pub fn apply_negated_world_impulse_at(&mut self, impulse: &Vec3, world_pos: &Vec3) {
        self.apply_world_impulse_at(&-impulse, world_pos);
    }

    /// World impulse at world offset `delta` from the body position.
    pub fn apply_body_world_impulse(&mut self, impulse: &Vec3, delta: &Vec3) {
        if self.immovable {
            return;
        }
        self.rate.velocity += impulse * self.inv_mass;
        self.rate.ang_velocity += self.world_inv_inertia * delta.cross(impulse);
        self.velocity_changed = true;
    }

    pub fn apply_negated_body_world_impulse(&mut self, impulse: &Vec3, delta: &Vec3) {
        self.apply_body_world_impulse(&-impulse, delta);
    }

    pub fn apply_world_impulse_aux(&mut self, impulse: &Vec3) {
        if self.immovable {
            return;
        }
        self.rate_aux.velocity += impulse * self.inv_mass;
    }

    pub fn apply_body_world_impulse_aux(&mut self, impulse: &Vec3, delta: &Vec3) {
        if self.immovable {
            return;
        }
        self.rate_aux.velocity += impulse * self.inv_mass;
        self.rate_aux.ang_velocity += self.world_inv_inertia * delta.cross(impulse);
    }

    pub fn apply_negated_body_world_impulse_aux(&mut self, impulse: &Vec3, delta: &Vec3) {
        self.apply_body_world_impulse_aux(&-impulse, delta);
    }

    /// Impulse expressed in body space, through the centre of mass.
    pub fn apply_body_impulse(&mut self, impulse: &Vec3) {
        let world = self.transform.orientation * impulse;
        self.apply_world_impulse(&world);
    }

    /// Body-space impulse at a body-space point.
    pub fn apply_body_impulse_at(&mut self, impulse: &Vec3, body_pos: &Vec3) {
        let world = self.transform.orientation * impulse;
        let delta = self.transform.orientation * body_pos;
        self.apply_body_world_impulse(&world, &delta);
    }

    pub fn apply_world_angular_impulse(&mut self, angular: &Vec3) {
        if self.immovable {
            return;
        }
        self.rate.ang_velocity += self.world_inv_inertia * angular;
        self.velocity_changed = true;
    }

    // ----------------------------------------------------------------------
    // Forces

    #[inline]
    pub fn force(&self) -> Vec3 {
        self.force
    }

    #[inline]
    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    pub fn add_world_force(&mut self, force: &Vec3) {
        if self.immovable {
            return;
        }
        self.force += force;
        self.velocity_changed = true;
    }

    pub fn add_world_force_at(&mut self, force: &Vec3, world_pos: &Vec3) {
        if self.immovable {
            return;
        }
        self.force += force;
        self.torque += (world_pos - self.transform.position).cross(force);
        self.velocity_changed = true;
    }

    pub fn add_body_force(&mut self, force: &Vec3) {
        let world = self.transform.orientation * force;
        self.add_world_force(&world);
    }

    pub fn add_body_force_at(&mut self, force: &Vec3, body_pos: &Vec3) {
        let world = self.transform.orientation * force;
        let pos = self.transform.transform_point(body_pos);
        self.add_world_force_at(&world, &pos);
    }

    pub fn add_world_torque(&mut self, torque: &Vec3) {
        if self.immovable {
            return;
        }
        self.torque += torque;
        self.velocity_changed = true;
    }

    pub fn add_body_torque(&mut self, torque: &Vec3) {
        let world = self.transform.orientation * torque;
        self.add_world_torque(&world);
    }

    pub fn clear_forces(&mut self) {
        self.force = Vec3::zeros();
        self.torque = Vec3::zeros();
    }

    /// Add the weight of the body for the given gravity.
    pub fn add_gravity(&mut self, gravity: &Vec3) {
        if self.immovable {
            return;
        }
        self.force += gravity * self.mass;
    }

    // ----------------------------------------------------------------------
    // Links

    #[inline]
    pub fn skin(&self) -> Option<SkinHandle> {
        self.skin
    }

    pub(crate) fn set_skin(&mut self, skin: Option<SkinHandle>) {
        self.skin = skin;
    }

    /// Collisions involving this body during the current step.
    #[inline]
    pub fn collisions(&self) -> &[CollisionId] {
        &self.collisions
    }

    #[inline]
    pub fn constraints(&self) -> &[ConstraintHandle] {
        &self.constraints
    }

    /// Wake `other` once this body has moved more than `distance` from `position`.
    pub fn add_movement_activation(&mut self, position: Vec3, distance: f32, other: BodyHandle) {
        let entry = self.movement_activation.get_or_insert_with(|| MovementActivation {
            stored_position: position,
            threshold_sq: distance * distance,
            bodies: Vec::new(),
        });
        entry.stored_position = position;
        entry.threshold_sq = distance * distance;
        if !entry.bodies.contains(&other) {
            entry.bodies.push(other);
        }
    }

    /// Bodies to wake if the movement threshold was crossed (clears the list).
    pub(crate) fn take_triggered_activations(&mut self) -> Vec<BodyHandle> {
        let triggered = self.movement_activation.as_ref().is_some_and(|m| {
            (self.transform.position - m.stored_position).norm_squared() > m.threshold_sq
        });
        if triggered {
            self.movement_activation
                .take()
                .map(|m| m.bodies)
                .unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    pub fn set_hooks(&mut self, hooks: impl BodyHooks + 'static) {
        self.hooks = Some(Box::new(hooks));
    }

    pub fn clear_hooks(&mut self) {
        self.hooks = None;
    }

    pub(crate) fn take_hooks(&mut self) -> Option<Box<dyn BodyHooks>> {
        self.hooks.take()
    }

    pub(crate) fn put_hooks(&mut self, hooks: Box<dyn BodyHooks>) {
        self.hooks = Some(hooks);
    }
}
