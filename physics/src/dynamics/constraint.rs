//! Velocity-level constraints between bodies.
//!
//! Every constraint works in two phases per solver pass: `pre_apply` caches
//! world-space lever arms and targets, `apply` pushes one corrective impulse
//! and reports whether it did anything. The solver loop re-runs unsatisfied
//! constraints until nothing changes or it runs out of iterations.

use slotmap::SlotMap;

use crate::collision::ContactPool;
use crate::constants::{CONSTRAINT_MAX_VEL, CONSTRAINT_MIN_VEL_FOR_PROCESSING, EPSILON};
use crate::dynamics::body::{Body, BodyHandle, BodySet};
use crate::math::{Mat3, Vec3};

slotmap::new_key_type! {
    pub struct ConstraintHandle;
}

pub type ConstraintSet = SlotMap<ConstraintHandle, Constraint>;

const WORLD_POINT_ALLOWED_DEVIATION: f32 = 0.01;
const WORLD_POINT_TIMESCALE_STEPS: f32 = 4.0;
const WORLD_POINT_MIN_VEL: f32 = 0.001;

/// Two body points that should coincide, corrected softly over `timescale`.
#[derive(Clone, Debug)]
pub struct PointConstraint {
    pub body0: BodyHandle,
    pub body1: BodyHandle,
    /// Body-space anchor on `body0`.
    pub body0_pos: Vec3,
    pub body1_pos: Vec3,
    pub allowed_distance: f32,
    pub timescale: f32,
    r0: Vec3,
    r1: Vec3,
    world_pos0: Vec3,
    world_pos1: Vec3,
    vr_extra: Vec3,
}

/// Two body points that may not separate beyond `max_distance`.
#[derive(Clone, Debug)]
pub struct MaxDistanceConstraint {
    pub body0: BodyHandle,
    pub body1: BodyHandle,
    pub body0_pos: Vec3,
    pub body1_pos: Vec3,
    pub max_distance: f32,
    r0: Vec3,
    r1: Vec3,
    current_rel_pos: Vec3,
}

/// A body point pinned to a fixed world position.
#[derive(Clone, Debug)]
pub struct WorldPointConstraint {
    pub body: BodyHandle,
    pub point_on_body: Vec3,
    pub world_position: Vec3,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReferenceFrame {
    #[default]
    World,
    Body,
}

/// Drives a body's velocity toward a target, smoothed over `tau` seconds.
#[derive(Clone, Debug)]
pub struct VelocityConstraint {
    pub body: BodyHandle,
    pub frame: ReferenceFrame,
    pub target_velocity: Option<Vec3>,
    pub target_ang_velocity: Option<Vec3>,
    pub tau: f32,
    velocity: Vec3,
    ang_velocity: Vec3,
    initialised: bool,
}

#[derive(Clone, Debug)]
pub enum ConstraintKind {
    Point(PointConstraint),
    MaxDistance(MaxDistanceConstraint),
    WorldPoint(WorldPointConstraint),
    Velocity(VelocityConstraint),
}

#[derive(Clone, Debug)]
pub struct Constraint {
    kind: ConstraintKind,
    enabled: bool,
    satisfied: bool,
}

impl Constraint {
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            kind,
            enabled: false,
            satisfied: false,
        }
    }

    pub fn point(
        body0: BodyHandle,
        body0_pos: Vec3,
        body1: BodyHandle,
        body1_pos: Vec3,
        allowed_distance: f32,
        timescale: f32,
    ) -> Self {
        Self::new(ConstraintKind::Point(PointConstraint {
            body0,
            body1,
            body0_pos,
            body1_pos,
            allowed_distance,
            timescale,
            r0: Vec3::zeros(),
            r1: Vec3::zeros(),
            world_pos0: Vec3::zeros(),
            world_pos1: Vec3::zeros(),
            vr_extra: Vec3::zeros(),
        }))
    }

    pub fn max_distance(
        body0: BodyHandle,
        body0_pos: Vec3,
        body1: BodyHandle,
        body1_pos: Vec3,
        max_distance: f32,
    ) -> Self {
        Self::new(ConstraintKind::MaxDistance(MaxDistanceConstraint {
            body0,
            body1,
            body0_pos,
            body1_pos,
            max_distance,
            r0: Vec3::zeros(),
            r1: Vec3::zeros(),
            current_rel_pos: Vec3::zeros(),
        }))
    }

    pub fn world_point(body: BodyHandle, point_on_body: Vec3, world_position: Vec3) -> Self {
        Self::new(ConstraintKind::WorldPoint(WorldPointConstraint {
            body,
            point_on_body,
            world_position,
        }))
    }

    /// `None` targets leave that channel alone.
    pub fn velocity(
        body: BodyHandle,
        frame: ReferenceFrame,
        target_velocity: Option<Vec3>,
        target_ang_velocity: Option<Vec3>,
        tau: f32,
    ) -> Self {
        Self::new(ConstraintKind::Velocity(VelocityConstraint {
            body,
            frame,
            target_velocity,
            target_ang_velocity,
            tau,
            velocity: Vec3::zeros(),
            ang_velocity: Vec3::zeros(),
            initialised: false,
        }))
    }

    #[inline]
    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    #[inline]
    pub fn kind_mut(&mut self) -> &mut ConstraintKind {
        &mut self.kind
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    pub(crate) fn set_unsatisfied(&mut self) {
        self.satisfied = false;
    }

    /// The bodies this constraint touches.
    pub fn bodies(&self) -> (BodyHandle, Option<BodyHandle>) {
        match &self.kind {
            ConstraintKind::Point(c) => (c.body0, Some(c.body1)),
            ConstraintKind::MaxDistance(c) => (c.body0, Some(c.body1)),
            ConstraintKind::WorldPoint(c) => (c.body, None),
            ConstraintKind::Velocity(c) => (c.body, None),
        }
    }

    pub fn pre_apply(&mut self, bodies: &BodySet, dt: f32) {
        self.satisfied = false;
        match &mut self.kind {
            ConstraintKind::Point(c) => c.pre_apply(bodies),
            ConstraintKind::MaxDistance(c) => c.pre_apply(bodies),
            ConstraintKind::WorldPoint(_) => {}
            ConstraintKind::Velocity(c) => c.pre_apply(bodies, dt),
        }
    }

    /// Apply one impulse. Returns `true` when the bodies' velocities changed,
    /// in which case the caller marks everything touching them unsatisfied.
    pub fn apply(&mut self, bodies: &mut BodySet, pool: &ContactPool, dt: f32) -> bool {
        self.satisfied = true;
        match &mut self.kind {
            ConstraintKind::Point(c) => c.apply(bodies),
            ConstraintKind::MaxDistance(c) => c.apply(bodies, dt),
            ConstraintKind::WorldPoint(c) => c.apply(bodies, dt),
            ConstraintKind::Velocity(c) => c.apply(bodies, pool),
        }
    }
}

/// `N · ((I⁻¹ (r × N)) × r)`
#[inline]
fn angular_term(inv_inertia: &Mat3, r: &Vec3, n: &Vec3) -> f32 {
    n.dot(&(inv_inertia * r.cross(n)).cross(r))
}

fn pair_denominator(b0: &Body, r0: &Vec3, b1: &Body, r1: &Vec3, n: &Vec3) -> f32 {
    b0.inverse_mass()
        + b1.inverse_mass()
        + angular_term(&b0.world_inv_inertia(), r0, n)
        + angular_term(&b1.world_inv_inertia(), r1, n)
}

/// Clamp a relative velocity to the solver maximum. `None` when it is too
/// small to be worth an impulse.
fn limit_relative_velocity(vr: Vec3) -> Option<(Vec3, f32)> {
    let speed = vr.norm();
    if speed < CONSTRAINT_MIN_VEL_FOR_PROCESSING {
        return None;
    }
    if speed > CONSTRAINT_MAX_VEL {
        return Some((vr / speed, CONSTRAINT_MAX_VEL));
    }
    Some((vr / speed, speed))
}

impl PointConstraint {
    fn pre_apply(&mut self, bodies: &BodySet) {
        let (Some(b0), Some(b1)) = (bodies.get(self.body0), bodies.get(self.body1)) else {
            return;
        };
        self.r0 = b0.orientation() * self.body0_pos;
        self.r1 = b1.orientation() * self.body1_pos;
        self.world_pos0 = b0.position() + self.r0;
        self.world_pos1 = b1.position() + self.r1;

        let deviation = self.world_pos0 - self.world_pos1;
        let amount = deviation.norm();
        self.vr_extra = if amount > self.allowed_distance {
            deviation * ((amount - self.allowed_distance) / (amount * self.timescale.max(EPSILON)))
        } else {
            Vec3::zeros()
        };
    }

    fn apply(&mut self, bodies: &mut BodySet) -> bool {
        let Some([b0, b1]) = bodies.get_disjoint_mut([self.body0, self.body1]) else {
            return false;
        };
        let vr = self.vr_extra + b0.velocity_at(&self.r0) - b1.velocity_at(&self.r1);
        let Some((n, normal_vel)) = limit_relative_velocity(vr) else {
            return false;
        };
        let denominator = pair_denominator(b0, &self.r0, b1, &self.r1, &n);
        if denominator < EPSILON {
            return false;
        }
        let impulse = n * (-normal_vel / denominator);
        b0.apply_body_world_impulse(&impulse, &self.r0);
        b1.apply_negated_body_world_impulse(&impulse, &self.r1);
        true
    }
}

impl MaxDistanceConstraint {
    fn pre_apply(&mut self, bodies: &BodySet) {
        let (Some(b0), Some(b1)) = (bodies.get(self.body0), bodies.get(self.body1)) else {
            return;
        };
        self.r0 = b0.orientation() * self.body0_pos;
        self.r1 = b1.orientation() * self.body1_pos;
        self.current_rel_pos = (b0.position() + self.r0) - (b1.position() + self.r1);
    }

    fn apply(&mut self, bodies: &mut BodySet, dt: f32) -> bool {
        if dt <= EPSILON {
            return false;
        }
        let Some([b0, b1]) = bodies.get_disjoint_mut([self.body0, self.body1]) else {
            return false;
        };
        let rel_vel = b0.velocity_at(&self.r0) - b1.velocity_at(&self.r1);
        let predicted = self.current_rel_pos + rel_vel * dt;
        let predicted_len = predicted.norm();
        if predicted_len <= EPSILON {
            return false;
        }
        let clamped = if predicted_len > self.max_distance {
            predicted * (self.max_distance / predicted_len)
        } else {
            predicted
        };
        let desired = (clamped - self.current_rel_pos) / dt;
        let Some((n, normal_vel)) = limit_relative_velocity(rel_vel - desired) else {
            return false;
        };
        let denominator = pair_denominator(b0, &self.r0, b1, &self.r1, &n);
        if denominator < EPSILON {
            return false;
        }
        let impulse = n * (-normal_vel / denominator);
        b0.apply_body_world_impulse(&impulse, &self.r0);
        b1.apply_negated_body_world_impulse(&impulse, &self.r1);
        true
    }
}

impl WorldPointConstraint {
    fn apply(&mut self, bodies: &mut BodySet, dt: f32) -> bool {
        let Some(body) = bodies.get_mut(self.body) else {
            return false;
        };
        let r = body.orientation() * self.point_on_body;
        let world_pos = body.position() + r;
        let current_vel = body.velocity_at(&r);

        let deviation = world_pos - self.world_position;
        let distance = deviation.norm();
        let desired_vel = if distance > WORLD_POINT_ALLOWED_DEVIATION {
            let timescale = (WORLD_POINT_TIMESCALE_STEPS * dt).max(EPSILON);
            deviation * ((WORLD_POINT_ALLOWED_DEVIATION - distance) / (distance * timescale))
        } else {
            Vec3::zeros()
        };

        let vr = current_vel - desired_vel;
        let normal_vel = vr.norm();
        if normal_vel < WORLD_POINT_MIN_VEL {
            return false;
        }
        let n = vr / normal_vel;
        let denominator = body.inverse_mass() + angular_term(&body.world_inv_inertia(), &r, &n);
        if denominator < EPSILON {
            return false;
        }
        body.apply_body_world_impulse(&(n * (-normal_vel / denominator)), &r);
        true
    }
}

impl VelocityConstraint {
    fn pre_apply(&mut self, bodies: &BodySet, dt: f32) {
        let Some(body) = bodies.get(self.body) else {
            return;
        };
        if !self.initialised {
            self.velocity = body.velocity();
            self.ang_velocity = body.ang_velocity();
            if self.frame == ReferenceFrame::Body {
                let inv = body.orientation().inverse();
                self.velocity = inv * self.velocity;
                self.ang_velocity = inv * self.ang_velocity;
            }
            self.initialised = true;
        }
        let frac = if self.tau > EPSILON { (dt / self.tau).min(1.0) } else { 1.0 };
        if let Some(target) = self.target_velocity {
            self.velocity = self.velocity * (1.0 - frac) + target * frac;
        }
        if let Some(target) = self.target_ang_velocity {
            self.ang_velocity = self.ang_velocity * (1.0 - frac) + target * frac;
        }
    }

    fn apply(&mut self, bodies: &mut BodySet, pool: &ContactPool) -> bool {
        let Some(body) = bodies.get_mut(self.body) else {
            return false;
        };
        if body.is_immovable() {
            return false;
        }
        let q = body.orientation();
        let (mut vel, ang_vel) = match self.frame {
            ReferenceFrame::World => (self.velocity, self.ang_velocity),
            ReferenceFrame::Body => (q * self.velocity, q * self.ang_velocity),
        };

        // Never drive the body into static geometry it is touching.
        for info in body.collisions().iter().filter_map(|id| pool.get(*id)) {
            if info.body1.is_some() {
                continue;
            }
            let n = info.normal_towards(self.body);
            let into = vel.dot(&n);
            if into < 0.0 {
                vel -= n * into;
            }
        }

        let mut changed = false;
        if self.target_velocity.is_some()
            && (vel - body.velocity()).norm() > CONSTRAINT_MIN_VEL_FOR_PROCESSING
        {
            body.set_velocity(vel);
            changed = true;
        }
        if self.target_ang_velocity.is_some()
            && (ang_vel - body.ang_velocity()).norm() > CONSTRAINT_MIN_VEL_FOR_PROCESSING
        {
            body.set_ang_velocity(ang_vel);
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bodies(separation: f32) -> (BodySet, BodyHandle, BodyHandle) {
        let mut bodies = BodySet::with_key();
        let a = bodies.insert(Body::at(Vec3::zeros(), 1.0));
        let b = bodies.insert(Body::at(Vec3::new(separation, 0.0, 0.0), 1.0));
        (bodies, a, b)
    }

    #[test]
    fn max_distance_pulls_bodies_back_within_one_step() {
        let (mut bodies, a, b) = two_bodies(3.0);
        let pool = ContactPool::new();
        let dt = 0.1;
        let mut c = Constraint::max_distance(a, Vec3::zeros(), b, Vec3::zeros(), 2.0);
        c.pre_apply(&bodies, dt);
        assert!(c.apply(&mut bodies, &pool, dt));
        for body in bodies.values_mut() {
            body.update_position(dt);
        }
        let d = (bodies[b].position() - bodies[a].position()).norm();
        assert!(d <= 2.0 + 1.0e-3, "separation {d}");
    }

    #[test]
    fn max_distance_is_slack_when_within_limit() {
        let (mut bodies, a, b) = two_bodies(1.0);
        let pool = ContactPool::new();
        let mut c = Constraint::max_distance(a, Vec3::zeros(), b, Vec3::zeros(), 2.0);
        c.pre_apply(&bodies, 0.1);
        assert!(!c.apply(&mut bodies, &pool, 0.1));
        assert!(c.is_satisfied());
    }

    #[test]
    fn point_constraint_draws_anchors_together() {
        let (mut bodies, a, b) = two_bodies(1.0);
        let pool = ContactPool::new();
        let mut c = Constraint::point(a, Vec3::new(0.5, 0.0, 0.0), b, Vec3::zeros(), 0.0, 0.05);
        c.pre_apply(&bodies, 0.01);
        assert!(c.apply(&mut bodies, &pool, 0.01));
        // Anchor on a sits at x = 0.5, b's at x = 1.0: they close the gap.
        assert!(bodies[a].velocity().x > 0.0);
        assert!(bodies[b].velocity().x < 0.0);
    }

    #[test]
    fn world_point_pulls_body_toward_pin() {
        let mut bodies = BodySet::with_key();
        let a = bodies.insert(Body::at(Vec3::new(0.0, 1.0, 0.0), 1.0));
        let pool = ContactPool::new();
        let mut c = Constraint::world_point(a, Vec3::zeros(), Vec3::zeros());
        c.pre_apply(&bodies, 0.01);
        assert!(c.apply(&mut bodies, &pool, 0.01));
        assert!(bodies[a].velocity().y < 0.0);
    }

    #[test]
    fn velocity_constraint_is_smoothed() {
        let mut bodies = BodySet::with_key();
        let a = bodies.insert(Body::at(Vec3::zeros(), 1.0));
        let pool = ContactPool::new();
        let mut c = Constraint::velocity(
            a,
            ReferenceFrame::World,
            Some(Vec3::new(4.0, 0.0, 0.0)),
            None,
            0.4,
        );
        c.pre_apply(&bodies, 0.1);
        assert!(c.apply(&mut bodies, &pool, 0.1));
        assert!((bodies[a].velocity().x - 1.0).abs() < 1.0e-5);
        // Applying again without a new pre-apply changes nothing.
        assert!(!c.apply(&mut bodies, &pool, 0.1));
    }

    #[test]
    fn velocity_constraint_cannot_move_an_immovable_body() {
        let mut bodies = BodySet::with_key();
        let a = bodies.insert(Body::at(Vec3::zeros(), 1.0));
        bodies[a].set_immovable(true);
        let pool = ContactPool::new();
        let mut c = Constraint::velocity(
            a,
            ReferenceFrame::World,
            Some(Vec3::new(4.0, 0.0, 0.0)),
            Some(Vec3::new(0.0, 1.0, 0.0)),
            1.0,
        );
        c.pre_apply(&bodies, 0.1);
        assert!(!c.apply(&mut bodies, &pool, 0.1));
        assert_eq!(bodies[a].velocity(), Vec3::zeros());
        assert_eq!(bodies[a].ang_velocity(), Vec3::zeros());
    }

    #[test]
    fn immovable_pair_cannot_be_corrected() {
        let (mut bodies, a, b) = two_bodies(3.0);
        bodies[a].set_immovable(true);
        bodies[b].set_immovable(true);
        let pool = ContactPool::new();
        let mut c = Constraint::max_distance(a, Vec3::zeros(), b, Vec3::zeros(), 2.0);
        c.pre_apply(&bodies, 0.1);
        assert!(!c.apply(&mut bodies, &pool, 0.1));
    }
}
