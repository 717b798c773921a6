//! Controllers: per-step force/impulse injectors.
//!
//! A controller runs once per step after external forces. Joints are
//! controllers that also own a set of constraints in the system's constraint
//! set; enabling or disabling the joint toggles those constraints.

use std::fmt;

use crate::constants::{
    EPSILON, HINGE_MID_ALLOWED_DISTANCE, HINGE_TIMESCALE, HINGE_UNLIMITED_ANGLE_DEG,
};
use crate::dynamics::body::{BodyHandle, BodySet};
use crate::dynamics::constraint::{Constraint, ConstraintHandle};
use crate::error::{PhysicsError, Result};
use crate::math::{Quat, Vec3, any_perpendicular, try_normalize};

slotmap::new_key_type! {
    pub struct ControllerHandle;
}

/// User-supplied controller logic.
pub trait ControllerFn {
    fn update_controller(&mut self, bodies: &mut BodySet, dt: f32);
}

impl<F> ControllerFn for F
where
    F: FnMut(&mut BodySet, f32),
{
    fn update_controller(&mut self, bodies: &mut BodySet, dt: f32) {
        self(bodies, dt)
    }
}

pub enum Controller {
    Hinge(HingeJoint),
    Custom(Box<dyn ControllerFn>),
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hinge(h) => f.debug_tuple("Hinge").field(h).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Controller {
    pub fn custom(f: impl ControllerFn + 'static) -> Self {
        Self::Custom(Box::new(f))
    }

    pub fn update_controller(&mut self, bodies: &mut BodySet, dt: f32) {
        match self {
            Self::Hinge(h) => h.update_controller(bodies, dt),
            Self::Custom(c) => c.update_controller(bodies, dt),
        }
    }

    /// Constraints owned by this controller.
    pub fn constraints(&self) -> Vec<ConstraintHandle> {
        match self {
            Self::Hinge(h) => h.constraints().collect(),
            Self::Custom(_) => Vec::new(),
        }
    }
}

/// Hinge construction parameters. Positions and the axis are in world space
/// at the moment the joint is created.
#[derive(Clone, Copy, Debug)]
pub struct HingeDesc {
    pub body0: BodyHandle,
    pub body1: BodyHandle,
    pub hinge_axis: Vec3,
    /// Hinge centre relative to `body0`'s position.
    pub hinge_pos_rel0: Vec3,
    pub half_width: f32,
    /// Allowed rotation either side of the rest pose, in degrees. Angles above
    /// 150 degrees leave the hinge unlimited.
    pub fwd_angle_deg: f32,
    pub bck_angle_deg: f32,
    /// Side anchors may drift apart by this fraction of `half_width`.
    pub sideways_slack: f32,
    /// Fraction of the relative spin about the hinge removed per step. `0`
    /// disables damping.
    pub damping: f32,
}

impl HingeDesc {
    pub fn new(body0: BodyHandle, body1: BodyHandle, hinge_axis: Vec3, hinge_pos_rel0: Vec3) -> Self {
        Self {
            body0,
            body1,
            hinge_axis,
            hinge_pos_rel0,
            half_width: 0.5,
            fwd_angle_deg: 180.0,
            bck_angle_deg: 180.0,
            sideways_slack: 0.0,
            damping: 0.0,
        }
    }
}

#[derive(Debug)]
pub struct HingeJoint {
    body0: BodyHandle,
    body1: BodyHandle,
    /// Hinge axis in `body0` space.
    local_axis: Vec3,
    damping: Option<f32>,
    extra_torque: f32,
    mid: ConstraintHandle,
    sides: [ConstraintHandle; 2],
    limit: Option<ConstraintHandle>,
}

impl HingeJoint {
    /// Create the joint's constraints through `add` and assemble the joint.
    pub fn build(
        desc: &HingeDesc,
        bodies: &BodySet,
        mut add: impl FnMut(Constraint) -> ConstraintHandle,
    ) -> Result<Self> {
        let b0 = bodies.get(desc.body0).ok_or(PhysicsError::UnknownBody(desc.body0))?;
        let b1 = bodies.get(desc.body1).ok_or(PhysicsError::UnknownBody(desc.body1))?;
        if desc.body0 == desc.body1 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "hinge needs two distinct bodies",
            });
        }
        let axis = try_normalize(&desc.hinge_axis).ok_or(PhysicsError::InvalidConfiguration {
            reason: "hinge axis has zero length",
        })?;
        if desc.half_width <= 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "hinge half width must be positive",
            });
        }

        let q0_inv = b0.orientation().inverse();
        let q1_inv = b1.orientation().inverse();
        let rel0 = desc.hinge_pos_rel0;
        let rel1 = b0.position() + rel0 - b1.position();
        let to_local0 = |v: Vec3| q0_inv * v;
        let to_local1 = |v: Vec3| q1_inv * v;

        let side = axis * desc.half_width;
        let allowed_side = desc.sideways_slack * desc.half_width;
        let sides = [
            add(Constraint::max_distance(
                desc.body0,
                to_local0(rel0 + side),
                desc.body1,
                to_local1(rel1 + side),
                allowed_side,
            )),
            add(Constraint::max_distance(
                desc.body0,
                to_local0(rel0 - side),
                desc.body1,
                to_local1(rel1 - side),
                allowed_side,
            )),
        ];
        let mid = add(Constraint::point(
            desc.body0,
            to_local0(rel0),
            desc.body1,
            to_local1(rel1),
            HINGE_MID_ALLOWED_DISTANCE,
            HINGE_TIMESCALE,
        ));

        let limit = if desc.fwd_angle_deg <= HINGE_UNLIMITED_ANGLE_DEG {
            // Two anchors on a lever perpendicular to the hinge; their
            // separation limit approximates the angular range.
            let perp = any_perpendicular(&axis);
            let len = 10.0 * desc.half_width;
            let anchor0 = perp * len;
            let to_middle = 0.5 * (desc.fwd_angle_deg - desc.bck_angle_deg);
            let rot = Quat::from_scaled_axis(axis * (-to_middle).to_radians());
            let anchor1 = rot * anchor0;
            let half_angle = 0.5 * (desc.fwd_angle_deg + desc.bck_angle_deg);
            let allowed = len * 2.0 * (0.5 * half_angle).to_radians().sin();

            let hinge_pos = b0.position() + rel0;
            let rel0c = hinge_pos + anchor0 - b0.position();
            let rel1c = hinge_pos + anchor1 - b1.position();
            Some(add(Constraint::max_distance(
                desc.body0,
                to_local0(rel0c),
                desc.body1,
                to_local1(rel1c),
                allowed,
            )))
        } else {
            None
        };

        let damping = (desc.damping > 0.0).then(|| desc.damping.min(1.0));
        log::debug!(
            "hinge between {:?} and {:?}: limit {}, damping {:?}",
            desc.body0,
            desc.body1,
            limit.is_some(),
            damping
        );
        Ok(Self {
            body0: desc.body0,
            body1: desc.body1,
            local_axis: to_local0(axis),
            damping,
            extra_torque: 0.0,
            mid,
            sides,
            limit,
        })
    }

    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.body0, self.body1)
    }

    pub fn constraints(&self) -> impl Iterator<Item = ConstraintHandle> + '_ {
        std::iter::once(self.mid)
            .chain(self.sides.iter().copied())
            .chain(self.limit)
    }

    #[inline]
    pub fn has_limit(&self) -> bool {
        self.limit.is_some()
    }

    #[inline]
    pub fn extra_torque(&self) -> f32 {
        self.extra_torque
    }

    /// Torque applied about the hinge axis every step, equal and opposite on
    /// the two bodies.
    pub fn set_extra_torque(&mut self, torque: f32) {
        self.extra_torque = torque;
    }

    pub fn update_controller(&mut self, bodies: &mut BodySet, _dt: f32) {
        let Some([b0, b1]) = bodies.get_disjoint_mut([self.body0, self.body1]) else {
            return;
        };

        if let Some(damping) = self.damping {
            // The effective axis is the direction of relative spin.
            if let Some(axis) = try_normalize(&(b1.ang_velocity() - b0.ang_velocity())) {
                let rot0 = b0.ang_velocity().dot(&axis);
                let rot1 = b1.ang_velocity().dot(&axis);
                let avg = 0.5 * (rot0 + rot1);
                let frac = 1.0 - damping;
                let new_rot0 = avg + (rot0 - avg) * frac;
                let new_rot1 = avg + (rot1 - avg) * frac;
                if (new_rot0 - rot0).abs() > EPSILON {
                    b0.set_ang_velocity(b0.ang_velocity() + axis * (new_rot0 - rot0));
                }
                if (new_rot1 - rot1).abs() > EPSILON {
                    b1.set_ang_velocity(b1.ang_velocity() + axis * (new_rot1 - rot1));
                }
            }
        }

        if self.extra_torque != 0.0 {
            let torque = (b0.orientation() * self.local_axis) * self.extra_torque;
            b0.add_world_torque(&torque);
            b1.add_world_torque(&-torque);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::Body;
    use crate::dynamics::constraint::{ConstraintKind, ConstraintSet};

    fn setup() -> (BodySet, BodyHandle, BodyHandle) {
        let mut bodies = BodySet::with_key();
        let a = bodies.insert(Body::at(Vec3::zeros(), 1.0));
        let b = bodies.insert(Body::at(Vec3::new(1.0, 0.0, 0.0), 1.0));
        (bodies, a, b)
    }

    #[test]
    fn unlimited_hinge_has_three_constraints() {
        let (bodies, a, b) = setup();
        let mut set = ConstraintSet::with_key();
        let desc = HingeDesc::new(a, b, Vec3::z(), Vec3::new(0.5, 0.0, 0.0));
        let hinge = HingeJoint::build(&desc, &bodies, |c| set.insert(c)).unwrap();
        assert!(!hinge.has_limit());
        assert_eq!(hinge.constraints().count(), 3);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn limited_hinge_adds_cone_constraint() {
        let (bodies, a, b) = setup();
        let mut set = ConstraintSet::with_key();
        let mut desc = HingeDesc::new(a, b, Vec3::z(), Vec3::new(0.5, 0.0, 0.0));
        desc.fwd_angle_deg = 60.0;
        desc.bck_angle_deg = 60.0;
        let hinge = HingeJoint::build(&desc, &bodies, |c| set.insert(c)).unwrap();
        assert!(hinge.has_limit());
        let limit = hinge.constraints().last().unwrap();
        let ConstraintKind::MaxDistance(md) = set[limit].kind() else {
            panic!("limit is a max-distance constraint");
        };
        // len = 5, half angle 60: 2 * 5 * sin(30 deg) = 5.
        assert!((md.max_distance - 5.0).abs() < 1.0e-4);
    }

    #[test]
    fn zero_axis_is_rejected() {
        let (bodies, a, b) = setup();
        let mut set = ConstraintSet::with_key();
        let desc = HingeDesc::new(a, b, Vec3::zeros(), Vec3::zeros());
        assert!(HingeJoint::build(&desc, &bodies, |c| set.insert(c)).is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn damping_blends_relative_spin() {
        let (mut bodies, a, b) = setup();
        let mut set = ConstraintSet::with_key();
        let mut desc = HingeDesc::new(a, b, Vec3::z(), Vec3::new(0.5, 0.0, 0.0));
        desc.damping = 0.5;
        let mut hinge = HingeJoint::build(&desc, &bodies, |c| set.insert(c)).unwrap();
        bodies[b].set_ang_velocity(Vec3::new(0.0, 0.0, 2.0));
        hinge.update_controller(&mut bodies, 0.01);
        assert!((bodies[a].ang_velocity().z - 0.5).abs() < 1.0e-5);
        assert!((bodies[b].ang_velocity().z - 1.5).abs() < 1.0e-5);
    }

    #[test]
    fn damping_leaves_an_immovable_frame_still() {
        let (mut bodies, a, b) = setup();
        bodies[a].set_immovable(true);
        let mut set = ConstraintSet::with_key();
        let mut desc = HingeDesc::new(a, b, Vec3::z(), Vec3::new(0.5, 0.0, 0.0));
        desc.damping = 0.5;
        let mut hinge = HingeJoint::build(&desc, &bodies, |c| set.insert(c)).unwrap();
        bodies[b].set_ang_velocity(Vec3::new(0.0, 0.0, 2.0));
        hinge.update_controller(&mut bodies, 0.01);
        assert_eq!(bodies[a].ang_velocity(), Vec3::zeros());
        assert!((bodies[b].ang_velocity().z - 1.5).abs() < 1.0e-5);
    }

    #[test]
    fn custom_controller_runs() {
        let (mut bodies, a, _) = setup();
        let mut c = Controller::custom(move |bodies: &mut BodySet, _dt: f32| {
            bodies[a].add_world_force(&Vec3::new(1.0, 0.0, 0.0));
        });
        c.update_controller(&mut bodies, 0.01);
        assert_eq!(bodies[a].force(), Vec3::new(1.0, 0.0, 0.0));
        assert!(c.constraints().is_empty());
    }
}
