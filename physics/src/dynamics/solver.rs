//! Sequential-impulse contact solvers.
//!
//! All four strategies share the same preprocessing: a per-point effective
//! mass denominator and a minimum separation velocity that either pushes a
//! penetrating point apart or lets a small gap close within the step.
//!
//! - `Fast`: per point, friction from the pre-impulse velocity.
//! - `Normal`: per point, friction from the post-impulse velocity.
//! - `Combined`: one averaged impulse at the impulse-weighted centroid.
//! - `Accumulated`: clamped running totals per point, penetration handled on
//!   the auxiliary velocity channel, warm started from `ContactCache`.

use crate::collision::CollisionInfo;
use crate::collision::MaterialPairProperties;
use crate::constants::{
    EPSILON, MAX_CONTACT_POINTS, MAX_PENETRATION_RECOVERY_VEL, MAX_SHOCK_RECOVERY_VEL,
    MIN_CONTACT_DENOMINATOR, MIN_VEL_FOR_PROCESSING, SHOCK_ITERATIONS, SHOCK_RELAXATION_TIMESTEPS,
};
use crate::dynamics::body::{Body, BodyHandle, BodySet};
use crate::dynamics::contact_cache::ContactCache;
use crate::math::Vec3;
use crate::settings::SolverType;

#[derive(Clone, Copy, Debug)]
pub struct ContactSolver {
    kind: SolverType,
    allowed_penetration: f32,
    relaxation_timesteps: f32,
}

/// Body pair of a collision, with the second one absent for static geometry.
fn pair_mut(
    bodies: &mut BodySet,
    b0: BodyHandle,
    b1: Option<BodyHandle>,
) -> Option<(&mut Body, Option<&mut Body>)> {
    match b1 {
        Some(b1) => {
            let [x, y] = bodies.get_disjoint_mut([b0, b1])?;
            Some((x, Some(y)))
        }
        None => bodies.get_mut(b0).map(|b| (b, None)),
    }
}

#[inline]
fn relative_velocity(b0: &Body, b1: Option<&Body>, r0: &Vec3, r1: &Vec3) -> Vec3 {
    b0.velocity_at(r0) - b1.map_or_else(Vec3::zeros, |b| b.velocity_at(r1))
}

#[inline]
fn relative_velocity_aux(b0: &Body, b1: Option<&Body>, r0: &Vec3, r1: &Vec3) -> Vec3 {
    b0.velocity_aux_at(r0) - b1.map_or_else(Vec3::zeros, |b| b.velocity_aux_at(r1))
}

fn denominator(b0: &Body, b1: Option<&Body>, r0: &Vec3, r1: &Vec3, n: &Vec3) -> f32 {
    let term = |b: &Body, r: &Vec3| b.inverse_mass() + n.dot(&(b.world_inv_inertia() * r.cross(n)).cross(r));
    term(b0, r0) + b1.map_or(0.0, |b| term(b, r1))
}

#[inline]
fn apply_impulse(b0: &mut Body, b1: Option<&mut Body>, impulse: &Vec3, r0: &Vec3, r1: &Vec3) {
    b0.apply_body_world_impulse(impulse, r0);
    if let Some(b1) = b1 {
        b1.apply_negated_body_world_impulse(impulse, r1);
    }
}

#[inline]
fn apply_impulse_aux(b0: &mut Body, b1: Option<&mut Body>, impulse: &Vec3, r0: &Vec3, r1: &Vec3) {
    b0.apply_body_world_impulse_aux(impulse, r0);
    if let Some(b1) = b1 {
        b1.apply_negated_body_world_impulse_aux(impulse, r1);
    }
}

/// Coulomb friction against the tangential part of `vr`: stop the sliding if
/// static friction allows it, otherwise apply dynamic friction.
#[allow(clippy::too_many_arguments)]
fn apply_friction(
    b0: &mut Body,
    mut b1: Option<&mut Body>,
    r0: &Vec3,
    r1: &Vec3,
    n: &Vec3,
    vr: Vec3,
    normal_impulse: f32,
    material: &MaterialPairProperties,
) {
    let tangent = vr - n * vr.dot(n);
    let speed = tangent.norm();
    if speed <= MIN_VEL_FOR_PROCESSING {
        return;
    }
    let t = -tangent / speed;
    let denom = denominator(b0, b1.as_deref(), r0, r1, &t);
    if denom <= EPSILON {
        return;
    }
    let to_stop = speed / denom;
    let from_normal = material.static_friction * normal_impulse;
    let magnitude = if to_stop < from_normal {
        to_stop
    } else {
        material.dynamic_friction * normal_impulse
    };
    apply_impulse(b0, b1.as_deref_mut(), &(t * magnitude), r0, r1);
}

impl ContactSolver {
    pub fn new(kind: SolverType, allowed_penetration: f32, relaxation_timesteps: f32) -> Self {
        Self {
            kind,
            allowed_penetration,
            relaxation_timesteps,
        }
    }

    #[inline]
    pub fn kind(&self) -> SolverType {
        self.kind
    }

    /// Target separation speed for a point with the given initial penetration.
    /// Negative values permit the remaining gap to close during the step.
    pub fn min_separation_velocity(&self, penetration: f32, dt: f32) -> f32 {
        let allowed = self.allowed_penetration;
        let excess = penetration - allowed;
        let v = if penetration > allowed {
            excess / (self.relaxation_timesteps * dt).max(EPSILON)
        } else {
            let approach = (-0.1 * excess / (EPSILON + allowed)).clamp(EPSILON, 1.0);
            approach * excess / dt.max(EPSILON)
        };
        v.min(MAX_PENETRATION_RECOVERY_VEL)
    }

    /// Prepare a collision for solving. For the accumulated solver, `cache`
    /// selects warm starting; without it the accumulators start at zero.
    pub fn preprocess(
        &self,
        info: &mut CollisionInfo,
        bodies: &mut BodySet,
        cache: Option<&ContactCache>,
        dt: f32,
    ) {
        match self.kind {
            SolverType::Accumulated => self.preprocess_accumulated(info, bodies, cache, dt),
            SolverType::Fast | SolverType::Normal | SolverType::Combined => {
                self.preprocess_points(info, bodies, dt)
            }
        }
    }

    /// Run one solver pass over a collision. Returns `true` if any impulse was
    /// applied. `use_restitution` is off for the resting-contact pass.
    pub fn process(
        &self,
        info: &mut CollisionInfo,
        bodies: &mut BodySet,
        dt: f32,
        use_restitution: bool,
    ) -> bool {
        match self.kind {
            SolverType::Fast => self.process_sequential(info, bodies, use_restitution, false),
            SolverType::Normal => self.process_sequential(info, bodies, use_restitution, true),
            SolverType::Combined => self.process_combined(info, bodies, use_restitution),
            SolverType::Accumulated => self.process_accumulated(info, bodies, dt, use_restitution),
        }
    }

    fn preprocess_points(&self, info: &mut CollisionInfo, bodies: &mut BodySet, dt: f32) {
        info.satisfied = false;
        let n = info.dir_to_body0;
        let (b0h, b1h) = (info.body0, info.body1);
        let Some((b0, b1)) = pair_mut(bodies, b0h, b1h) else {
            return;
        };
        let b1 = b1.as_deref();
        for pt in info.points_mut() {
            pt.denominator = denominator(b0, b1, &pt.r0, &pt.r1, &n).max(MIN_CONTACT_DENOMINATOR);
            pt.position = b0.old_position() + pt.r0;
            pt.min_separation_vel = self.min_separation_velocity(pt.initial_penetration, dt);
        }
    }

    /// Per-point solve shared by `Fast` and `Normal`. `post_impulse_friction`
    /// picks which relative velocity friction works against.
    fn process_sequential(
        &self,
        info: &mut CollisionInfo,
        bodies: &mut BodySet,
        use_restitution: bool,
        post_impulse_friction: bool,
    ) -> bool {
        info.satisfied = true;
        let n = info.dir_to_body0;
        let material = info.material;
        let restitution = if use_restitution { material.restitution } else { 0.0 };
        let (b0h, b1h) = (info.body0, info.body1);
        let Some((b0, mut b1)) = pair_mut(bodies, b0h, b1h) else {
            return false;
        };

        let mut got_one = false;
        for pt in info.points_mut() {
            let vr = relative_velocity(b0, b1.as_deref(), &pt.r0, &pt.r1);
            let normal_vel = vr.dot(&n);
            if normal_vel > pt.min_separation_vel {
                continue;
            }
            let mut final_vel = -restitution * normal_vel;
            if final_vel < MIN_VEL_FOR_PROCESSING {
                final_vel = pt.min_separation_vel;
            }
            let delta_vel = final_vel - normal_vel;
            if delta_vel <= MIN_VEL_FOR_PROCESSING {
                continue;
            }
            let normal_impulse = delta_vel / pt.denominator;
            got_one = true;
            apply_impulse(b0, b1.as_deref_mut(), &(n * normal_impulse), &pt.r0, &pt.r1);

            let vr_friction = if post_impulse_friction {
                relative_velocity(b0, b1.as_deref(), &pt.r0, &pt.r1)
            } else {
                vr
            };
            apply_friction(
                b0,
                b1.as_deref_mut(),
                &pt.r0,
                &pt.r1,
                &n,
                vr_friction,
                normal_impulse,
                &material,
            );
        }
        got_one
    }

    fn process_combined(&self, info: &mut CollisionInfo, bodies: &mut BodySet, use_restitution: bool) -> bool {
        info.satisfied = true;
        let n = info.dir_to_body0;
        let material = info.material;
        let restitution = if use_restitution { material.restitution } else { 0.0 };
        let (b0h, b1h) = (info.body0, info.body1);
        let Some((b0, mut b1)) = pair_mut(bodies, b0h, b1h) else {
            return false;
        };

        let mut impulses = [0.0f32; MAX_CONTACT_POINTS];
        let mut total = 0.0;
        let mut av_pos = Vec3::zeros();
        let mut av_min_sep = 0.0;
        for (i, pt) in info.points().iter().enumerate() {
            let normal_vel = relative_velocity(b0, b1.as_deref(), &pt.r0, &pt.r1).dot(&n);
            if normal_vel > pt.min_separation_vel {
                continue;
            }
            let mut final_vel = -restitution * normal_vel;
            if final_vel < MIN_VEL_FOR_PROCESSING {
                final_vel = pt.min_separation_vel;
            }
            let delta_vel = final_vel - normal_vel;
            if delta_vel < MIN_VEL_FOR_PROCESSING {
                continue;
            }
            impulses[i] = delta_vel / pt.denominator;
            total += impulses[i];
            av_pos += pt.position * impulses[i];
            av_min_sep += pt.min_separation_vel * impulses[i];
        }
        if total <= EPSILON {
            return false;
        }
        av_pos /= total;
        av_min_sep /= total;

        let r0 = av_pos - b0.old_position();
        let r1 = b1.as_deref().map_or(av_pos, |b| av_pos - b.old_position());
        let normal_vel = relative_velocity(b0, b1.as_deref(), &r0, &r1).dot(&n);
        let mut final_vel = -restitution * normal_vel;
        if final_vel < MIN_VEL_FOR_PROCESSING {
            final_vel = av_min_sep;
        }
        let delta_vel = final_vel - normal_vel;
        if delta_vel < MIN_VEL_FOR_PROCESSING {
            return false;
        }
        let denom = denominator(b0, b1.as_deref(), &r0, &r1, &n).max(MIN_CONTACT_DENOMINATOR);
        let normal_impulse = delta_vel / denom;
        apply_impulse(b0, b1.as_deref_mut(), &(n * normal_impulse), &r0, &r1);

        let vr = relative_velocity(b0, b1.as_deref(), &r0, &r1);
        apply_friction(b0, b1.as_deref_mut(), &r0, &r1, &n, vr, normal_impulse, &material);
        true
    }

    fn preprocess_accumulated(
        &self,
        info: &mut CollisionInfo,
        bodies: &mut BodySet,
        cache: Option<&ContactCache>,
        dt: f32,
    ) {
        self.preprocess_points(info, bodies, dt);
        let n = info.dir_to_body0;
        let restitution = info.material.restitution;
        match cache {
            Some(cache) => cache.warm_start(info),
            None => {
                for pt in info.points_mut() {
                    pt.accumulated_normal_impulse = 0.0;
                    pt.accumulated_normal_impulse_aux = 0.0;
                    pt.accumulated_friction_impulse = Vec3::zeros();
                }
            }
        }

        let (b0h, b1h) = (info.body0, info.body1);
        let Some((b0, mut b1)) = pair_mut(bodies, b0h, b1h) else {
            return;
        };
        for pt in info.points_mut() {
            let normal_vel = relative_velocity(b0, b1.as_deref(), &pt.r0, &pt.r1).dot(&n);
            pt.target_normal_vel = if normal_vel < -MIN_VEL_FOR_PROCESSING {
                -restitution * normal_vel
            } else {
                0.0
            };

            if pt.accumulated_normal_impulse != 0.0 || pt.accumulated_friction_impulse != Vec3::zeros() {
                let impulse = n * pt.accumulated_normal_impulse + pt.accumulated_friction_impulse;
                apply_impulse(b0, b1.as_deref_mut(), &impulse, &pt.r0, &pt.r1);
            }
            if pt.accumulated_normal_impulse_aux != 0.0 {
                let impulse = n * pt.accumulated_normal_impulse_aux;
                apply_impulse_aux(b0, b1.as_deref_mut(), &impulse, &pt.r0, &pt.r1);
            }
        }
    }

    fn process_accumulated(
        &self,
        info: &mut CollisionInfo,
        bodies: &mut BodySet,
        _dt: f32,
        use_restitution: bool,
    ) -> bool {
        info.satisfied = true;
        let n = info.dir_to_body0;
        let static_friction = info.material.static_friction;
        let (b0h, b1h) = (info.body0, info.body1);
        let Some((b0, mut b1)) = pair_mut(bodies, b0h, b1h) else {
            return false;
        };

        let mut got_one = false;
        for pt in info.points_mut() {
            // Primary channel: restitution, or allow a remaining gap to close.
            let normal_vel = relative_velocity(b0, b1.as_deref(), &pt.r0, &pt.r1).dot(&n);
            let target = if use_restitution && pt.target_normal_vel > 0.0 {
                pt.target_normal_vel
            } else {
                pt.min_separation_vel.min(0.0)
            };
            let impulse = (target - normal_vel) / pt.denominator;
            let orig = pt.accumulated_normal_impulse;
            pt.accumulated_normal_impulse = (orig + impulse).max(0.0);
            let actual = pt.accumulated_normal_impulse - orig;
            if actual.abs() > EPSILON {
                apply_impulse(b0, b1.as_deref_mut(), &(n * actual), &pt.r0, &pt.r1);
                got_one = true;
            }

            // Aux channel: push penetrating points apart without adding momentum.
            if pt.min_separation_vel > 0.0 {
                let normal_vel_aux = relative_velocity_aux(b0, b1.as_deref(), &pt.r0, &pt.r1).dot(&n);
                let impulse = (pt.min_separation_vel - normal_vel_aux) / pt.denominator;
                let orig = pt.accumulated_normal_impulse_aux;
                pt.accumulated_normal_impulse_aux = (orig + impulse).max(0.0);
                let actual = pt.accumulated_normal_impulse_aux - orig;
                if actual.abs() > EPSILON {
                    apply_impulse_aux(b0, b1.as_deref_mut(), &(n * actual), &pt.r0, &pt.r1);
                    got_one = true;
                }
            }

            // Friction, bounded by the cone around the accumulated normal impulse.
            if pt.accumulated_normal_impulse > 0.0 {
                let vr = relative_velocity(b0, b1.as_deref(), &pt.r0, &pt.r1);
                let tangent = vr - n * vr.dot(&n);
                let speed = tangent.norm();
                if speed > MIN_VEL_FOR_PROCESSING {
                    let t = -tangent / speed;
                    let denom = denominator(b0, b1.as_deref(), &pt.r0, &pt.r1, &t);
                    if denom > EPSILON {
                        let orig = pt.accumulated_friction_impulse;
                        let mut acc = orig + t * (speed / denom);
                        let magnitude = acc.norm();
                        let max_allowed = pt.accumulated_normal_impulse * static_friction;
                        if magnitude > EPSILON && magnitude > max_allowed {
                            acc *= max_allowed / magnitude;
                        }
                        pt.accumulated_friction_impulse = acc;
                        let actual = acc - orig;
                        if actual.norm_squared() > EPSILON * EPSILON {
                            apply_impulse(b0, b1.as_deref_mut(), &actual, &pt.r0, &pt.r1);
                            got_one = true;
                        }
                    }
                }
            }
        }
        got_one
    }

    /// Preprocessing for the shock step. Never warm starts.
    pub fn preprocess_for_shock(&self, info: &mut CollisionInfo, bodies: &mut BodySet, dt: f32) {
        self.preprocess_points(info, bodies, dt);
    }

    /// Separate penetrating points on the auxiliary channel only.
    pub fn process_for_shock(&self, info: &mut CollisionInfo, bodies: &mut BodySet, dt: f32) {
        info.satisfied = true;
        let n = info.dir_to_body0;
        let timescale = (SHOCK_RELAXATION_TIMESTEPS * dt).max(EPSILON);
        let allowed = self.allowed_penetration;
        let (b0h, b1h) = (info.body0, info.body1);
        let Some((b0, mut b1)) = pair_mut(bodies, b0h, b1h) else {
            return;
        };
        for _ in 0..SHOCK_ITERATIONS {
            for pt in info.points() {
                let min_sep = ((pt.initial_penetration - allowed) / timescale).min(MAX_SHOCK_RECOVERY_VEL);
                let normal_vel = relative_velocity_aux(b0, b1.as_deref(), &pt.r0, &pt.r1).dot(&n);
                if normal_vel > min_sep {
                    continue;
                }
                let delta_vel = min_sep - normal_vel;
                if delta_vel <= MIN_VEL_FOR_PROCESSING {
                    continue;
                }
                let impulse = n * (delta_vel / pt.denominator);
                apply_impulse_aux(b0, b1.as_deref_mut(), &impulse, &pt.r0, &pt.r1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{ContactPool, DetectedPoint};

    const DT: f32 = 0.01;

    /// A unit body resting on static ground through the given contact offsets.
    fn on_ground(offsets: &[Vec3], penetration: f32) -> (BodySet, BodyHandle, CollisionInfo) {
        let mut bodies = BodySet::with_key();
        let b = bodies.insert(Body::at(Vec3::new(0.0, 1.0, 0.0), 1.0));
        let mut pool = ContactPool::new();
        let id = pool.acquire();
        let mut info = pool.get(id).cloned().unwrap();
        info.body0 = b;
        info.body1 = None;
        info.dir_to_body0 = Vec3::y();
        let pts: Vec<DetectedPoint> = offsets
            .iter()
            .map(|r| DetectedPoint {
                r0: *r,
                r1: Vec3::new(0.0, 1.0, 0.0) + r,
                initial_penetration: penetration,
            })
            .collect();
        info.set_points(&Vec3::new(0.0, 1.0, 0.0), &pts);
        (bodies, b, info)
    }

    fn solver(kind: SolverType) -> ContactSolver {
        ContactSolver::new(kind, 0.01, 3.0)
    }

    #[test]
    fn min_separation_velocity_branches() {
        let s = solver(SolverType::Normal);
        // Deep: (0.05 - 0.01) / (3 * 0.01), capped at 0.5.
        assert!((s.min_separation_velocity(0.05, DT) - 0.5).abs() < 1.0e-6);
        assert!((s.min_separation_velocity(0.02, DT) - 0.01 / 0.03).abs() < 1.0e-4);
        // A gap yields a negative target.
        assert!(s.min_separation_velocity(-0.05, DT) < 0.0);
    }

    #[test]
    fn inelastic_contact_stops_the_fall() {
        for kind in [SolverType::Fast, SolverType::Normal, SolverType::Combined, SolverType::Accumulated] {
            let (mut bodies, b, mut info) = on_ground(&[Vec3::new(0.0, -1.0, 0.0)], 0.0);
            info.material.restitution = 0.0;
            bodies[b].set_velocity(Vec3::new(0.0, -2.0, 0.0));
            let s = solver(kind);
            s.preprocess(&mut info, &mut bodies, None, DT);
            for _ in 0..8 {
                s.process(&mut info, &mut bodies, DT, false);
            }
            let vy = bodies[b].velocity().y;
            assert!(vy > -0.2 && vy < 0.01, "{kind:?}: vy = {vy}");
        }
    }

    #[test]
    fn restitution_bounces() {
        let (mut bodies, b, mut info) = on_ground(&[Vec3::new(0.0, -1.0, 0.0)], 0.0);
        info.material.restitution = 0.5;
        bodies[b].set_velocity(Vec3::new(0.0, -2.0, 0.0));
        let s = solver(SolverType::Normal);
        s.preprocess(&mut info, &mut bodies, None, DT);
        assert!(s.process(&mut info, &mut bodies, DT, true));
        assert!((bodies[b].velocity().y - 1.0).abs() < 1.0e-4);
        // Separating now: a second pass does nothing.
        assert!(!s.process(&mut info, &mut bodies, DT, true));
    }

    #[test]
    fn friction_slows_sliding() {
        let (mut bodies, b, mut info) = on_ground(&[Vec3::new(0.0, -1.0, 0.0)], 0.0);
        info.material = MaterialPairProperties {
            restitution: 0.0,
            static_friction: 0.5,
            dynamic_friction: 0.5,
        };
        bodies[b].set_velocity(Vec3::new(1.0, -1.0, 0.0));
        let s = solver(SolverType::Normal);
        s.preprocess(&mut info, &mut bodies, None, DT);
        s.process(&mut info, &mut bodies, DT, false);
        let vx = bodies[b].velocity().x;
        assert!(vx > 0.0 && vx < 1.0, "vx = {vx}");
    }

    #[test]
    fn combined_impulse_on_symmetric_points_does_not_spin() {
        let offsets = [Vec3::new(0.5, -1.0, 0.0), Vec3::new(-0.5, -1.0, 0.0)];
        let (mut bodies, b, mut info) = on_ground(&offsets, 0.0);
        info.material.restitution = 0.0;
        bodies[b].set_velocity(Vec3::new(0.0, -1.0, 0.0));
        let s = solver(SolverType::Combined);
        s.preprocess(&mut info, &mut bodies, None, DT);
        assert!(s.process(&mut info, &mut bodies, DT, false));
        assert!(bodies[b].ang_velocity().norm() < 1.0e-4);
        assert!(bodies[b].velocity().y > -0.2);
    }

    #[test]
    fn accumulated_normal_impulse_never_pulls() {
        let (mut bodies, b, mut info) = on_ground(&[Vec3::new(0.0, -1.0, 0.0)], 0.0);
        bodies[b].set_velocity(Vec3::new(0.0, 3.0, 0.0));
        let s = solver(SolverType::Accumulated);
        s.preprocess(&mut info, &mut bodies, None, DT);
        s.process(&mut info, &mut bodies, DT, false);
        assert_eq!(info.points()[0].accumulated_normal_impulse(), 0.0);
        assert!((bodies[b].velocity().y - 3.0).abs() < 1.0e-6);
    }

    #[test]
    fn accumulated_penetration_goes_to_aux_channel() {
        let (mut bodies, b, mut info) = on_ground(&[Vec3::new(0.0, -1.0, 0.0)], 0.05);
        let s = solver(SolverType::Accumulated);
        s.preprocess(&mut info, &mut bodies, None, DT);
        s.process(&mut info, &mut bodies, DT, false);
        assert!(bodies[b].velocity_aux().y > 0.0);
        assert!(bodies[b].velocity().y.abs() < 1.0e-6);
    }

    #[test]
    fn shock_processing_uses_aux_velocity_only() {
        let (mut bodies, b, mut info) = on_ground(&[Vec3::new(0.0, -1.0, 0.0)], 0.2);
        let s = solver(SolverType::Normal);
        s.preprocess_for_shock(&mut info, &mut bodies, DT);
        s.process_for_shock(&mut info, &mut bodies, DT);
        let aux = bodies[b].velocity_aux().y;
        assert!(aux > 0.0 && aux <= MAX_SHOCK_RECOVERY_VEL + 1.0e-6);
        assert_eq!(bodies[b].velocity(), Vec3::zeros());
    }
}
