/*!
The simulation context.

`PhysicsSystem` owns every body, skin, constraint and controller, the broad
phase, the narrow-phase dispatch table, the material table and the contact
pool. Everything is addressed by handle; there is no global "current system".

- mod:       registration, lookup and configuration
- integrate: the per-step pipeline and the solver loop
- freeze:    islands, sleeping and waking
*/

mod freeze;
mod integrate;

use rand::SeedableRng;
use rand::rngs::StdRng;
use slotmap::SlotMap;

use crate::collision::{
    BroadPhase, CollisionId, CollisionInfo, CollisionSkin, ContactPool, DetectionContext,
    MaterialTable, NarrowPhase, Segment, SegmentHit, SkinHandle, SkinPredicate, SkinSet,
    create_broad_phase,
};
use crate::dynamics::{
    Body, BodyHandle, BodySet, Constraint, ConstraintHandle, ConstraintSet, ContactCache,
    Controller, ControllerHandle, HingeDesc, HingeJoint,
};
use crate::error::{PhysicsError, Result};
use crate::math::{Quat, Transform, Vec3};
use crate::settings::{PhysicsConfig, SolverType};

struct ControllerSlot {
    controller: Controller,
    enabled: bool,
}

pub struct PhysicsSystem {
    config: PhysicsConfig,
    bodies: BodySet,
    /// Enabled bodies in registration order.
    body_order: Vec<BodyHandle>,
    skins: SkinSet,
    constraints: ConstraintSet,
    /// Enabled constraints in registration order.
    constraint_order: Vec<ConstraintHandle>,
    controllers: SlotMap<ControllerHandle, ControllerSlot>,
    controller_order: Vec<ControllerHandle>,
    broad_phase: Box<dyn BroadPhase>,
    narrow: NarrowPhase,
    materials: MaterialTable,
    pool: ContactPool,
    collisions: Vec<CollisionId>,
    contact_cache: ContactCache,
    active_bodies: Vec<BodyHandle>,
    rng: StdRng,
}

impl std::fmt::Debug for PhysicsSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsSystem")
            .field("config", &self.config)
            .field("bodies", &self.bodies.len())
            .field("skins", &self.skins.len())
            .field("constraints", &self.constraints.len())
            .field("controllers", &self.controllers.len())
            .field("collisions", &self.collisions.len())
            .finish_non_exhaustive()
    }
}

/// Copy a body's transforms onto its skin and tell the broad phase.
fn sync_body_skin(bodies: &BodySet, skins: &mut SkinSet, broad: &mut dyn BroadPhase, body: BodyHandle) {
    let Some(b) = bodies.get(body) else {
        return;
    };
    let Some(handle) = b.skin() else {
        return;
    };
    let Some(skin) = skins.get_mut(handle) else {
        return;
    };
    skin.set_transform(*b.old_transform(), *b.transform());
    broad.skin_moved(handle, skins);
}

impl PhysicsSystem {
    pub fn new(config: PhysicsConfig) -> Result<Self> {
        config.validate()?;
        let broad_phase = create_broad_phase(&config.broad_phase)?;
        log::debug!(
            "physics system: {:?} solver, {:?} broad phase",
            config.solver_type,
            config.broad_phase
        );
        Ok(Self {
            rng: StdRng::seed_from_u64(config.shuffle_seed),
            config,
            bodies: BodySet::with_key(),
            body_order: Vec::new(),
            skins: SkinSet::with_key(),
            constraints: ConstraintSet::with_key(),
            constraint_order: Vec::new(),
            controllers: SlotMap::with_key(),
            controller_order: Vec::new(),
            broad_phase,
            narrow: NarrowPhase::with_builtin(),
            materials: MaterialTable::default(),
            pool: ContactPool::new(),
            collisions: Vec::new(),
            contact_cache: ContactCache::new(),
            active_bodies: Vec::new(),
        })
    }

    // ----------------------------------------------------------------------
    // Bodies

    /// Register and enable a body.
    pub fn add_body(&mut self, body: Body) -> BodyHandle {
        let handle = self.bodies.insert(body);
        self.enable_body(handle);
        handle
    }

    /// Unregister a body. Its skin is detached and leaves the broad phase, and
    /// constraints touching it are removed.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<Body> {
        if !self.bodies.contains_key(handle) {
            log::warn!("remove_body: unknown body {handle:?}");
            return None;
        }
        self.disable_body(handle);
        let touching: Vec<ConstraintHandle> = self.bodies[handle].constraints().to_vec();
        for c in touching {
            self.remove_constraint(c);
        }
        let mut body = self.bodies.remove(handle)?;
        if let Some(skin) = body.skin() {
            if let Some(s) = self.skins.get_mut(skin) {
                s.set_owner(None);
            }
            body.set_skin(None);
        }
        Some(body)
    }

    /// Put a registered body back into the simulation.
    pub fn enable_body(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get_mut(handle) else {
            log::warn!("enable_body: unknown body {handle:?}");
            return;
        };
        if body.is_enabled() {
            log::warn!("body {handle:?} is already enabled");
            return;
        }
        body.set_enabled(true);
        self.body_order.push(handle);
        if let Some(skin) = body.skin() {
            if !self.broad_phase.contains(skin) {
                self.broad_phase.add_skin(skin, &self.skins);
            }
        }
        sync_body_skin(&self.bodies, &mut self.skins, self.broad_phase.as_mut(), handle);
    }

    /// Take a body out of the simulation without dropping it.
    pub fn disable_body(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get_mut(handle) else {
            log::warn!("disable_body: unknown body {handle:?}");
            return;
        };
        if !body.is_enabled() {
            return;
        }
        body.set_enabled(false);
        self.body_order.retain(|h| *h != handle);
        self.active_bodies.retain(|h| *h != handle);
        if let Some(skin) = body.skin() {
            if self.broad_phase.contains(skin) {
                self.broad_phase.remove_skin(skin);
            }
        }
    }

    #[inline]
    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    /// Mutable access to a body. Use `move_body_to` rather than changing the
    /// pose here so the skin follows.
    #[inline]
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter()
    }

    /// Bodies that were active during the last step.
    pub fn active_bodies(&self) -> &[BodyHandle] {
        &self.active_bodies
    }

    /// Teleport a body and its skin; wakes the body.
    pub fn move_body_to(&mut self, handle: BodyHandle, position: Vec3, orientation: Quat) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::UnknownBody(handle))?;
        body.move_to(position, orientation);
        sync_body_skin(&self.bodies, &mut self.skins, self.broad_phase.as_mut(), handle);
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Skins

    /// Register a skin and add it to the broad phase.
    pub fn add_skin(&mut self, mut skin: CollisionSkin) -> SkinHandle {
        skin.set_sweep_bounds(self.config.use_sweep_tests);
        let handle = self.skins.insert(skin);
        self.broad_phase.add_skin(handle, &self.skins);
        handle
    }

    pub fn remove_skin(&mut self, handle: SkinHandle) -> Option<CollisionSkin> {
        let Some(skin) = self.skins.get(handle) else {
            log::warn!("remove_skin: unknown skin {handle:?}");
            return None;
        };
        if let Some(owner) = skin.owner().and_then(|b| self.bodies.get_mut(b)) {
            owner.set_skin(None);
        }
        if self.broad_phase.contains(handle) {
            self.broad_phase.remove_skin(handle);
        }
        let mut skin = self.skins.remove(handle)?;
        skin.set_owner(None);
        Some(skin)
    }

    #[inline]
    pub fn skin(&self, handle: SkinHandle) -> Option<&CollisionSkin> {
        self.skins.get(handle)
    }

    /// Mutable access to a skin. Call `refresh_skin` afterwards if its bounds
    /// changed.
    #[inline]
    pub fn skin_mut(&mut self, handle: SkinHandle) -> Option<&mut CollisionSkin> {
        self.skins.get_mut(handle)
    }

    pub fn skins(&self) -> impl Iterator<Item = (SkinHandle, &CollisionSkin)> {
        self.skins.iter()
    }

    /// Tell the broad phase a skin's bounds changed.
    pub fn refresh_skin(&mut self, handle: SkinHandle) {
        if self.broad_phase.contains(handle) {
            self.broad_phase.skin_moved(handle, &self.skins);
        }
    }

    /// Place a skin. Intended for static geometry; owned skins follow their body.
    pub fn set_skin_transform(&mut self, handle: SkinHandle, transform: Transform) -> Result<()> {
        let skin = self.skins.get_mut(handle).ok_or(PhysicsError::UnknownSkin(handle))?;
        skin.set_transform(transform, transform);
        self.refresh_skin(handle);
        Ok(())
    }

    /// Attach `skin` to `body`, or detach the body's skin with `None`.
    pub fn set_body_skin(&mut self, body: BodyHandle, skin: Option<SkinHandle>) -> Result<()> {
        if !self.bodies.contains_key(body) {
            return Err(PhysicsError::UnknownBody(body));
        }
        if let Some(s) = skin {
            let data = self.skins.get(s).ok_or(PhysicsError::UnknownSkin(s))?;
            if let Some(owner) = data.owner().filter(|o| *o != body) {
                return Err(PhysicsError::SkinAlreadyOwned { skin: s, owner });
            }
        }
        let previous = self.bodies[body].skin();
        if let Some(prev) = previous.filter(|p| Some(*p) != skin) {
            if let Some(p) = self.skins.get_mut(prev) {
                p.set_owner(None);
            }
        }
        self.bodies[body].set_skin(skin);
        if let Some(s) = skin {
            self.skins[s].set_owner(Some(body));
            let enabled = self.bodies[body].is_enabled();
            if enabled && !self.broad_phase.contains(s) {
                self.broad_phase.add_skin(s, &self.skins);
            } else if !enabled && self.broad_phase.contains(s) {
                self.broad_phase.remove_skin(s);
            }
            sync_body_skin(&self.bodies, &mut self.skins, self.broad_phase.as_mut(), body);
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Constraints

    /// Register and enable a constraint. Fails if it references an unknown body.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintHandle> {
        let (b0, b1) = constraint.bodies();
        for b in std::iter::once(b0).chain(b1) {
            if !self.bodies.contains_key(b) {
                return Err(PhysicsError::UnknownBody(b));
            }
        }
        let handle = self.constraints.insert(constraint);
        self.link_constraint(handle);
        Ok(handle)
    }

    fn link_constraint(&mut self, handle: ConstraintHandle) {
        let Some(c) = self.constraints.get(handle) else {
            return;
        };
        let (b0, b1) = c.bodies();
        for b in std::iter::once(b0).chain(b1) {
            if let Some(body) = self.bodies.get_mut(b) {
                if !body.constraints.contains(&handle) {
                    body.constraints.push(handle);
                }
            }
        }
        self.set_constraint_enabled(handle, true);
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Option<Constraint> {
        let Some(c) = self.constraints.remove(handle) else {
            log::warn!("remove_constraint: unknown constraint {handle:?}");
            return None;
        };
        self.constraint_order.retain(|h| *h != handle);
        let (b0, b1) = c.bodies();
        for b in std::iter::once(b0).chain(b1) {
            if let Some(body) = self.bodies.get_mut(b) {
                body.constraints.retain(|h| *h != handle);
            }
        }
        Some(c)
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Option<&Constraint> {
        self.constraints.get(handle)
    }

    pub fn constraint_mut(&mut self, handle: ConstraintHandle) -> Option<&mut Constraint> {
        self.constraints.get_mut(handle)
    }

    pub fn enable_constraint(&mut self, handle: ConstraintHandle) {
        self.set_constraint_enabled(handle, true);
    }

    pub fn disable_constraint(&mut self, handle: ConstraintHandle) {
        self.set_constraint_enabled(handle, false);
    }

    fn set_constraint_enabled(&mut self, handle: ConstraintHandle, enabled: bool) {
        let Some(c) = self.constraints.get_mut(handle) else {
            log::warn!("unknown constraint {handle:?}");
            return;
        };
        if c.is_enabled() == enabled {
            return;
        }
        c.set_enabled(enabled);
        if enabled {
            self.constraint_order.push(handle);
        } else {
            self.constraint_order.retain(|h| *h != handle);
        }
    }

    // ----------------------------------------------------------------------
    // Controllers

    /// Register and enable a controller.
    pub fn add_controller(&mut self, controller: Controller) -> ControllerHandle {
        let handle = self.controllers.insert(ControllerSlot {
            controller,
            enabled: true,
        });
        self.controller_order.push(handle);
        handle
    }

    /// Unregister a controller, removing any constraints it owns.
    pub fn remove_controller(&mut self, handle: ControllerHandle) -> Option<Controller> {
        let Some(slot) = self.controllers.remove(handle) else {
            log::warn!("remove_controller: unknown controller {handle:?}");
            return None;
        };
        self.controller_order.retain(|h| *h != handle);
        for c in slot.controller.constraints() {
            self.remove_constraint(c);
        }
        Some(slot.controller)
    }

    /// Build a hinge between two bodies and register it with its constraints.
    pub fn add_hinge_joint(&mut self, desc: &HingeDesc) -> Result<ControllerHandle> {
        let constraints = &mut self.constraints;
        let hinge = HingeJoint::build(desc, &self.bodies, |c| constraints.insert(c))?;
        let owned: Vec<ConstraintHandle> = hinge.constraints().collect();
        for c in owned {
            self.link_constraint(c);
        }
        Ok(self.add_controller(Controller::Hinge(hinge)))
    }

    pub fn controller(&self, handle: ControllerHandle) -> Option<&Controller> {
        self.controllers.get(handle).map(|s| &s.controller)
    }

    pub fn controller_mut(&mut self, handle: ControllerHandle) -> Option<&mut Controller> {
        self.controllers.get_mut(handle).map(|s| &mut s.controller)
    }

    pub fn enable_controller(&mut self, handle: ControllerHandle) -> Result<()> {
        self.set_controller_enabled(handle, true)
    }

    pub fn disable_controller(&mut self, handle: ControllerHandle) -> Result<()> {
        self.set_controller_enabled(handle, false)
    }

    fn set_controller_enabled(&mut self, handle: ControllerHandle, enabled: bool) -> Result<()> {
        let slot = self
            .controllers
            .get_mut(handle)
            .ok_or(PhysicsError::UnknownController(handle))?;
        if slot.enabled == enabled {
            return Ok(());
        }
        slot.enabled = enabled;
        let owned = slot.controller.constraints();
        if enabled {
            self.controller_order.push(handle);
        } else {
            self.controller_order.retain(|h| *h != handle);
        }
        for c in owned {
            self.set_constraint_enabled(c, enabled);
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Collision queries and extension points

    /// Nearest hit of `segment` against every skin the predicate accepts.
    pub fn segment_intersect(
        &mut self,
        segment: &Segment,
        predicate: Option<&dyn SkinPredicate>,
    ) -> Option<SegmentHit> {
        let ctx = DetectionContext::new(&self.skins, &self.bodies);
        self.broad_phase.segment_intersect(ctx, segment, predicate)
    }

    /// Collision records produced by the last step.
    pub fn collisions(&self) -> impl Iterator<Item = &CollisionInfo> {
        self.collisions.iter().filter_map(|id| self.pool.get(*id))
    }

    pub fn collision(&self, id: CollisionId) -> Option<&CollisionInfo> {
        self.pool.get(id)
    }

    pub fn num_collisions(&self) -> usize {
        self.collisions.len()
    }

    pub fn narrow_phase(&self) -> &NarrowPhase {
        &self.narrow
    }

    /// Register or replace detection routines for primitive kind pairs.
    pub fn narrow_phase_mut(&mut self) -> &mut NarrowPhase {
        &mut self.narrow
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialTable {
        &mut self.materials
    }

    pub fn contact_cache(&self) -> &ContactCache {
        &self.contact_cache
    }

    // ----------------------------------------------------------------------
    // Configuration

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    #[inline]
    pub fn gravity(&self) -> Vec3 {
        self.config.gravity
    }

    /// Changing gravity wakes every body.
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
        self.activate_all();
    }

    #[inline]
    pub fn solver_type(&self) -> SolverType {
        self.config.solver_type
    }

    pub fn set_solver_type(&mut self, solver_type: SolverType) {
        self.config.solver_type = solver_type;
        self.contact_cache.clear();
    }

    #[inline]
    pub fn num_collision_iterations(&self) -> usize {
        self.config.num_collision_iterations
    }

    pub fn set_num_collision_iterations(&mut self, n: usize) {
        self.config.num_collision_iterations = n;
    }

    #[inline]
    pub fn num_contact_iterations(&self) -> usize {
        self.config.num_contact_iterations
    }

    pub fn set_num_contact_iterations(&mut self, n: usize) {
        self.config.num_contact_iterations = n;
    }

    #[inline]
    pub fn num_penetration_relaxation_timesteps(&self) -> f32 {
        self.config.num_penetration_relaxation_timesteps
    }

    pub fn set_num_penetration_relaxation_timesteps(&mut self, n: f32) -> Result<()> {
        if n <= 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "penetration relaxation timesteps must be positive",
            });
        }
        self.config.num_penetration_relaxation_timesteps = n;
        Ok(())
    }

    #[inline]
    pub fn allowed_penetration(&self) -> f32 {
        self.config.allowed_penetration
    }

    pub fn set_allowed_penetration(&mut self, depth: f32) {
        self.config.allowed_penetration = depth.max(0.0);
    }

    #[inline]
    pub fn collision_tolerance(&self) -> f32 {
        self.config.collision_tolerance
    }

    pub fn set_collision_tolerance(&mut self, tolerance: f32) {
        self.config.collision_tolerance = tolerance.max(0.0);
    }

    #[inline]
    pub fn is_shock_step_enabled(&self) -> bool {
        self.config.enable_shock_step
    }

    pub fn set_shock_step(&mut self, enabled: bool) {
        self.config.enable_shock_step = enabled;
    }

    #[inline]
    pub fn is_freezing_enabled(&self) -> bool {
        self.config.enable_freezing
    }

    /// Turning freezing off wakes every body.
    pub fn set_freezing(&mut self, enabled: bool) {
        self.config.enable_freezing = enabled;
        if !enabled {
            self.activate_all();
        }
    }

    #[inline]
    pub fn is_null_update(&self) -> bool {
        self.config.null_update
    }

    pub fn set_null_update(&mut self, enabled: bool) {
        self.config.null_update = enabled;
    }

    fn activate_all(&mut self) {
        for h in &self.body_order {
            if let Some(b) = self.bodies.get_mut(*h) {
                if !b.is_active() {
                    b.set_active(1.0);
                }
            }
        }
    }
}
