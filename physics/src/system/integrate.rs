//! The per-step pipeline.

use rand::seq::SliceRandom;

use crate::collision::{CollisionId, ContactCollector, DetectionContext, SkinHandle};
use crate::constants::EPSILON;
use crate::dynamics::{BodyHandle, ContactSolver};
use crate::math::dominant_axis;
use crate::settings::SolverType;
use crate::system::{PhysicsSystem, sync_body_skin};

#[derive(Clone, Copy)]
enum HookPhase {
    Pre,
    ExternalForces,
    Post,
}

impl PhysicsSystem {
    /// Advance the simulation by `dt` seconds.
    pub fn integrate(&mut self, dt: f32) {
        if !(dt > 0.0 && dt.is_finite()) {
            log::warn!("integrate: ignoring non-positive time step {dt}");
            return;
        }
        let snapshots: Vec<_> = if self.config.null_update {
            self.body_order
                .iter()
                .filter_map(|h| self.bodies.get(*h).map(|b| (*h, b.snapshot())))
                .collect()
        } else {
            Vec::new()
        };

        self.run_hooks(HookPhase::Pre, dt);
        self.find_all_active_bodies();
        self.copy_all_current_states_to_old();
        self.get_all_external_forces(dt);
        self.detect_all_collisions(dt);

        self.handle_all_constraints(dt, self.config.num_collision_iterations, true);
        self.update_all_velocities(dt);
        self.handle_all_constraints(dt, self.config.num_contact_iterations, false);

        if self.config.enable_shock_step {
            self.do_shock_step(dt);
        }
        if self.config.enable_freezing && !self.collisions.is_empty() {
            self.try_to_freeze_all(dt);
        }

        self.limit_all_velocities();
        self.update_all_positions(dt);
        self.notify_all_movement_activations();
        for b in self.bodies.values_mut() {
            b.clear_velocity_changed();
        }
        self.run_hooks(HookPhase::Post, dt);

        if self.config.solver_type == SolverType::Accumulated {
            self.contact_cache.update(&self.pool, &self.collisions);
        }

        if self.config.null_update {
            for (h, snap) in &snapshots {
                if let Some(b) = self.bodies.get_mut(*h) {
                    b.restore_snapshot(snap);
                }
                sync_body_skin(&self.bodies, &mut self.skins, self.broad_phase.as_mut(), *h);
            }
        }

        log::trace!(
            "step {dt:.4}s: {} active bodies, {} collisions",
            self.active_bodies.len(),
            self.collisions.len()
        );
    }

    fn run_hooks(&mut self, phase: HookPhase, dt: f32) {
        for &h in &self.body_order {
            let Some(body) = self.bodies.get_mut(h) else {
                continue;
            };
            let Some(mut hooks) = body.take_hooks() else {
                continue;
            };
            match phase {
                HookPhase::Pre => hooks.pre_physics(body, dt),
                HookPhase::ExternalForces => hooks.add_external_forces(body, dt),
                HookPhase::Post => hooks.post_physics(body, dt),
            }
            body.put_hooks(hooks);
        }
    }

    fn find_all_active_bodies(&mut self) {
        self.active_bodies.clear();
        for &h in &self.body_order {
            if self.bodies.get(h).is_some_and(|b| b.is_active() && !b.is_immovable()) {
                self.active_bodies.push(h);
            }
        }
    }

    fn copy_all_current_states_to_old(&mut self) {
        for &h in &self.body_order {
            if let Some(b) = self.bodies.get_mut(h) {
                if b.is_active() || b.velocity_changed() {
                    b.copy_current_state_to_old();
                }
            }
        }
    }

    fn get_all_external_forces(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        for &h in &self.body_order {
            if let Some(b) = self.bodies.get_mut(h) {
                b.clear_forces();
                b.add_gravity(&gravity);
            }
        }
        self.run_hooks(HookPhase::ExternalForces, dt);
        for &h in &self.controller_order {
            if let Some(slot) = self.controllers.get_mut(h) {
                slot.controller.update_controller(&mut self.bodies, dt);
            }
        }
    }

    fn release_collisions(&mut self) {
        for id in self.collisions.drain(..) {
            self.pool.release(id);
        }
        for b in self.bodies.values_mut() {
            b.collisions.clear();
        }
        for s in self.skins.values_mut() {
            s.collisions.clear();
        }
    }

    /// Cross-register `collisions[from..]` on their bodies and skins.
    fn register_collisions(&mut self, from: usize) {
        for &id in &self.collisions[from..] {
            let Some(info) = self.pool.get(id) else {
                continue;
            };
            for b in std::iter::once(info.body0).chain(info.body1) {
                if let Some(body) = self.bodies.get_mut(b) {
                    body.collisions.push(id);
                }
            }
            for s in [info.skin0, info.skin1] {
                if let Some(skin) = self.skins.get_mut(s) {
                    skin.collisions.push(id);
                }
            }
        }
    }

    /// Detect contacts at the poses the active bodies would reach this step,
    /// then put them back.
    fn detect_all_collisions(&mut self, dt: f32) {
        self.release_collisions();

        for &h in &self.active_bodies {
            if let Some(b) = self.bodies.get_mut(h) {
                b.store_state();
                b.update_velocity(dt);
                b.update_position(dt);
            }
            sync_body_skin(&self.bodies, &mut self.skins, self.broad_phase.as_mut(), h);
        }

        let tolerance = self.config.collision_tolerance;
        let ctx = DetectionContext::new(&self.skins, &self.bodies);
        let mut collector = ContactCollector {
            narrow: &self.narrow,
            materials: &self.materials,
            skins: &self.skins,
            bodies: &self.bodies,
            pool: &mut self.pool,
            collisions: &mut self.collisions,
            tolerance,
        };
        self.broad_phase
            .detect_all_collisions(ctx, &self.active_bodies, &mut collector, None, tolerance);

        self.register_collisions(0);
        self.collisions.shuffle(&mut self.rng);

        for &h in &self.active_bodies {
            if let Some(b) = self.bodies.get_mut(h) {
                b.restore_state();
            }
            sync_body_skin(&self.bodies, &mut self.skins, self.broad_phase.as_mut(), h);
        }
    }

    fn solver(&self) -> ContactSolver {
        ContactSolver::new(
            self.config.solver_type,
            self.config.allowed_penetration,
            self.config.num_penetration_relaxation_timesteps,
        )
    }

    /// Mark every collision and constraint touching `body` for re-solving.
    fn set_constraints_and_collisions_unsatisfied(&mut self, body: BodyHandle) {
        let Some(b) = self.bodies.get(body) else {
            return;
        };
        if b.is_immovable() {
            return;
        }
        for id in b.collisions() {
            if let Some(info) = self.pool.get_mut(*id) {
                info.satisfied = false;
            }
        }
        for c in b.constraints() {
            if let Some(c) = self.constraints.get_mut(*c) {
                c.set_unsatisfied();
            }
        }
    }

    fn preprocess_collisions(&mut self, solver: &ContactSolver, from: usize, use_cache: bool, dt: f32) {
        let cache = use_cache.then_some(&self.contact_cache);
        for &id in &self.collisions[from..] {
            if let Some(info) = self.pool.get_mut(id) {
                solver.preprocess(info, &mut self.bodies, cache, dt);
            }
        }
    }

    /// One solver pass: collisions (alternating direction) then constraints,
    /// repeated until nothing changes or `iterations` runs out.
    fn handle_all_constraints(&mut self, dt: f32, iterations: usize, use_restitution: bool) {
        let solver = self.solver();
        // Warm starting belongs to the resting-contact pass.
        let use_cache = solver.kind() == SolverType::Accumulated && !use_restitution;

        let mut orig_num = self.collisions.len();
        self.preprocess_collisions(&solver, 0, use_cache, dt);
        for &c in &self.constraint_order {
            if let Some(c) = self.constraints.get_mut(c) {
                c.pre_apply(&self.bodies, dt);
            }
        }

        for step in 0..iterations {
            let mut got_one = false;

            let n = self.collisions.len();
            for k in 0..n {
                let i = if step % 2 == 0 { k } else { n - 1 - k };
                let id = self.collisions[i];
                let Some(info) = self.pool.get_mut(id) else {
                    continue;
                };
                if info.satisfied {
                    continue;
                }
                if solver.process(info, &mut self.bodies, dt, use_restitution) {
                    let (b0, b1) = (info.body0, info.body1);
                    got_one = true;
                    self.set_constraints_and_collisions_unsatisfied(b0);
                    if let Some(b1) = b1 {
                        self.set_constraints_and_collisions_unsatisfied(b1);
                    }
                }
            }

            for k in 0..self.constraint_order.len() {
                let handle = self.constraint_order[k];
                let Some(c) = self.constraints.get_mut(handle) else {
                    continue;
                };
                if c.is_satisfied() {
                    continue;
                }
                if c.apply(&mut self.bodies, &self.pool, dt) {
                    let (b0, b1) = c.bodies();
                    got_one = true;
                    self.set_constraints_and_collisions_unsatisfied(b0);
                    if let Some(b1) = b1 {
                        self.set_constraints_and_collisions_unsatisfied(b1);
                    }
                }
            }

            self.try_to_activate_all_frozen_objects();

            // Waking bodies may have added collisions.
            let num = self.collisions.len();
            if num > orig_num {
                self.preprocess_collisions(&solver, orig_num, use_cache, dt);
                orig_num = num;
            }

            if !got_one {
                break;
            }
        }
    }

    /// Wake sleeping bodies that were pushed hard enough during solving.
    fn try_to_activate_all_frozen_objects(&mut self) {
        let woken: Vec<BodyHandle> = self
            .body_order
            .iter()
            .copied()
            .filter(|h| {
                self.bodies.get(*h).is_some_and(|b| {
                    !b.is_active() && !b.is_immovable() && b.velocity_changed() && b.exceeds_activity_threshold()
                })
            })
            .collect();
        for h in woken {
            self.activate_object(h);
        }
    }

    /// Wake `body`, find its contacts with the still-sleeping world and wake
    /// any sleeping body it is driving into.
    pub(crate) fn activate_object(&mut self, body: BodyHandle) {
        let mut work = vec![body];
        while let Some(h) = work.pop() {
            let Some(b) = self.bodies.get_mut(h) else {
                continue;
            };
            if b.is_active() || b.is_immovable() || !b.is_enabled() {
                continue;
            }
            b.set_active(1.0);
            self.active_bodies.push(h);
            log::trace!("woke body {h:?} during solving");

            let orig = self.collisions.len();
            let tolerance = self.config.collision_tolerance;
            let skins = &self.skins;
            let bodies = &self.bodies;
            // Pairs with active bodies were found by the full detection pass.
            let not_active = |_s0: SkinHandle, s1: SkinHandle| {
                !skins
                    .get(s1)
                    .and_then(|s| s.owner())
                    .filter(|o| *o != h)
                    .and_then(|o| bodies.get(o))
                    .is_some_and(|o| o.is_active())
            };
            let ctx = DetectionContext::new(skins, bodies);
            let mut collector = ContactCollector {
                narrow: &self.narrow,
                materials: &self.materials,
                skins,
                bodies,
                pool: &mut self.pool,
                collisions: &mut self.collisions,
                tolerance,
            };
            self.broad_phase
                .detect_collisions(ctx, h, &mut collector, Some(&not_active), tolerance);
            self.register_collisions(orig);

            let new_ids: Vec<CollisionId> = self.collisions[orig..].to_vec();
            for id in new_ids {
                let Some(info) = self.pool.get(id) else {
                    continue;
                };
                let Some(other) = info.other_body(h) else {
                    continue;
                };
                let n = info.normal_towards(h);
                let (Some(this), Some(that)) = (self.bodies.get(h), self.bodies.get(other)) else {
                    continue;
                };
                if !that.is_active() && !that.is_immovable() && this.velocity().dot(&n) < 0.0 {
                    work.push(other);
                }
            }
        }
    }

    fn update_all_velocities(&mut self, dt: f32) {
        for &h in &self.active_bodies {
            if let Some(b) = self.bodies.get_mut(h) {
                b.update_velocity(dt);
            }
        }
    }

    /// Propagate temporary immovability up through resting stacks, bottom
    /// first, separating each layer from the one below on the aux channel.
    fn do_shock_step(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        if gravity.norm() <= EPSILON {
            return;
        }
        let axis = dominant_axis(&gravity);
        let up = -gravity[axis].signum();
        let mut order = self.body_order.clone();
        order.sort_by(|a, b| {
            let ka = self.bodies.get(*a).map_or(0.0, |b| b.position()[axis] * up);
            let kb = self.bodies.get(*b).map_or(0.0, |b| b.position()[axis] * up);
            ka.total_cmp(&kb)
        });

        let solver = self.solver();
        let mut loops = 0usize;
        loop {
            loops += 1;
            let mut got_one = false;
            for &h in &order {
                let Some(body) = self.bodies.get_mut(h) else {
                    continue;
                };
                if body.is_immovable() || !body.do_shock_processing() {
                    continue;
                }
                if body.collisions().is_empty() || !body.is_active() {
                    body.internal_set_immovable();
                    continue;
                }
                let ids = body.collisions().to_vec();
                let mut set_immovable = false;
                for id in ids {
                    let Some(info) = self.pool.get_mut(id) else {
                        continue;
                    };
                    let supported = info
                        .other_body(h)
                        .is_none_or(|o| self.bodies.get(o).is_none_or(|b| b.is_immovable()));
                    if supported {
                        solver.preprocess_for_shock(info, &mut self.bodies, dt);
                        solver.process_for_shock(info, &mut self.bodies, dt);
                        set_immovable = true;
                    }
                }
                if set_immovable {
                    self.bodies[h].internal_set_immovable();
                    got_one = true;
                }
            }
            if !got_one {
                break;
            }
        }
        log::trace!("shock step settled after {loops} sweeps");

        for &h in &self.body_order {
            if let Some(b) = self.bodies.get_mut(h) {
                b.internal_restore_immovable();
            }
        }
    }

    fn limit_all_velocities(&mut self) {
        for &h in &self.active_bodies {
            if let Some(b) = self.bodies.get_mut(h) {
                b.limit_velocities();
            }
        }
    }

    fn update_all_positions(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        let gravity_axis = (gravity.norm() > EPSILON).then(|| dominant_axis(&gravity));
        for &h in &self.active_bodies {
            if let Some(b) = self.bodies.get_mut(h) {
                b.update_position_with_aux(dt, gravity_axis);
            }
            sync_body_skin(&self.bodies, &mut self.skins, self.broad_phase.as_mut(), h);
        }
    }

    fn notify_all_movement_activations(&mut self) {
        for k in 0..self.body_order.len() {
            let h = self.body_order[k];
            let woken = match self.bodies.get_mut(h) {
                Some(b) => b.take_triggered_activations(),
                None => continue,
            };
            for other in woken {
                if let Some(o) = self.bodies.get_mut(other) {
                    if o.is_enabled() && !o.is_active() {
                        o.set_active(1.0);
                    }
                }
            }
        }
    }
}
