/*!
Math aliases and small numeric helpers shared by the collision and dynamics
modules.

Conventions
- Column vectors; a body-space vector `v` maps to world space as `R * v`.
- World-space inertia is `R * I_body * R^T` (and likewise for the inverse).
- Orientations are unit quaternions, renormalized after every integration.
*/

use nalgebra as na;

use crate::constants::EPSILON;

pub type Vec3 = na::Vector3<f32>;
pub type Quat = na::UnitQuaternion<f32>;
pub type Mat3 = na::Matrix3<f32>;
pub type Iso = na::Isometry3<f32>;
pub type Point3 = na::Point3<f32>;

/// A rigid transform (position + orientation) in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    #[inline]
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    #[inline]
    pub fn identity() -> Self {
        Self {
            position: Vec3::zeros(),
            orientation: Quat::identity(),
        }
    }

    #[inline]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::identity(),
        }
    }

    /// Convert to nalgebra `Isometry3` for use with parry3d queries.
    #[inline]
    pub fn iso(&self) -> Iso {
        Iso::from_parts(
            na::Translation3::new(self.position.x, self.position.y, self.position.z),
            self.orientation,
        )
    }

    /// Compose `self` (parent) with a transform expressed in the parent's frame.
    #[inline]
    pub fn compose(&self, local: &Transform) -> Transform {
        Transform {
            position: self.position + self.orientation * local.position,
            orientation: self.orientation * local.orientation,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        self.position + self.orientation * p
    }

    #[inline]
    pub fn inverse_transform_point(&self, p: &Vec3) -> Vec3 {
        self.orientation.inverse_transform_vector(&(p - self.position))
    }

    /// Advance by a linear/angular rate over `dt` seconds.
    pub fn apply_rate(&mut self, rate: &TransformRate, dt: f32) {
        self.position += rate.velocity * dt;
        let rot = rate.ang_velocity * dt;
        if rot.norm_squared() > 0.0 {
            self.orientation = Quat::from_scaled_axis(rot) * self.orientation;
            self.orientation.renormalize();
        }
    }
}

/// Linear and angular velocity pair.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransformRate {
    pub velocity: Vec3,
    pub ang_velocity: Vec3,
}

impl TransformRate {
    #[inline]
    pub fn zero() -> Self {
        Self::default()
    }

    #[inline]
    pub fn sum(&self, other: &TransformRate) -> TransformRate {
        TransformRate {
            velocity: self.velocity + other.velocity,
            ang_velocity: self.ang_velocity + other.ang_velocity,
        }
    }
}

/// Reciprocal that returns zero instead of blowing up near zero.
#[inline]
pub fn safe_inv(x: f32) -> f32 {
    if x.abs() <= EPSILON { 0.0 } else { 1.0 / x }
}

/// Component-wise safe inverse of a diagonal.
#[inline]
pub fn safe_inv_diagonal(d: &Vec3) -> Vec3 {
    Vec3::new(safe_inv(d.x), safe_inv(d.y), safe_inv(d.z))
}

/// Normalize `v`, or `None` when its length is below `EPSILON`.
#[inline]
pub fn try_normalize(v: &Vec3) -> Option<Vec3> {
    let len = v.norm();
    if len > EPSILON { Some(v / len) } else { None }
}

/// `R * m * R^T` for a rotation `q`.
#[inline]
pub fn rotate_tensor(q: &Quat, m: &Mat3) -> Mat3 {
    let r = q.to_rotation_matrix().into_inner();
    r * m * r.transpose()
}

/// Index of the component with the largest magnitude (x on ties).
pub fn dominant_axis(v: &Vec3) -> usize {
    let a = v.abs();
    if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    }
}

/// Any unit vector perpendicular to `n` (assumed unit length).
pub fn any_perpendicular(n: &Vec3) -> Vec3 {
    let helper = if n.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    n.cross(&helper).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_inv_returns_zero_for_tiny_values() {
        assert_eq!(safe_inv(0.0), 0.0);
        assert_eq!(safe_inv(1.0e-9), 0.0);
        assert!((safe_inv(4.0) - 0.25).abs() < 1.0e-6);
        assert!((safe_inv(-2.0) + 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn rotate_tensor_matches_column_vector_convention() {
        // Rotating 90 degrees about Z swaps the X/Y principal moments.
        let q = Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2);
        let body = Mat3::from_diagonal(&Vec3::new(1.0, 2.0, 3.0));
        let world = rotate_tensor(&q, &body);
        assert!((world[(0, 0)] - 2.0).abs() < 1.0e-5);
        assert!((world[(1, 1)] - 1.0).abs() < 1.0e-5);
        assert!((world[(2, 2)] - 3.0).abs() < 1.0e-5);
    }

    #[test]
    fn apply_rate_integrates_position_and_orientation() {
        let mut t = Transform::identity();
        let rate = TransformRate {
            velocity: Vec3::new(1.0, 0.0, 0.0),
            ang_velocity: Vec3::new(0.0, std::f32::consts::PI, 0.0),
        };
        t.apply_rate(&rate, 0.5);
        assert!((t.position.x - 0.5).abs() < 1.0e-6);
        // Half a turn of PI rad/s over 0.5 s is a quarter turn about +Y.
        let fwd = t.orientation * Vec3::x();
        assert!((fwd - Vec3::new(0.0, 0.0, -1.0)).norm() < 1.0e-5);
    }

    #[test]
    fn compose_and_inverse_point_agree() {
        let parent = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(&Vec3::y_axis(), 0.7),
        );
        let p = Vec3::new(0.3, -0.2, 0.9);
        let world = parent.transform_point(&p);
        assert!((parent.inverse_transform_point(&world) - p).norm() < 1.0e-5);
    }

    #[test]
    fn dominant_axis_picks_largest_magnitude() {
        assert_eq!(dominant_axis(&Vec3::new(0.0, -9.81, 0.0)), 1);
        assert_eq!(dominant_axis(&Vec3::new(3.0, 1.0, -4.0)), 2);
        assert_eq!(dominant_axis(&Vec3::zeros()), 0);
    }
}
