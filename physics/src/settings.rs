/*!
Per-world configuration.

`PhysicsConfig::default()` gives a usable world: earth gravity along -Y,
the sequential-impulse solver and a sweep-and-prune broad phase. Callers
override individual fields (or use the `with_*` helpers) and hand the result
to `PhysicsSystem::new`, which validates it.
*/

use crate::constants::GRAVITY_MPS2;
use crate::error::{PhysicsError, Result};
use crate::math::Vec3;

/// Contact solver used for both the collision and the contact pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SolverType {
    /// One relative-velocity evaluation per point; friction from the pre-impulse velocity.
    Fast,
    /// Sequential impulses, re-evaluating the relative velocity before friction.
    #[default]
    Normal,
    /// One averaged impulse per collision, weighted by the per-point impulses.
    Combined,
    /// Clamped accumulated impulses, warm started from the previous step.
    Accumulated,
}

/// Dimensions of a uniform wrapping grid broad phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridParams {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            nx: 16,
            ny: 8,
            nz: 16,
            dx: 4.0,
            dy: 4.0,
            dz: 4.0,
        }
    }
}

impl GridParams {
    pub fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "grid must have at least one cell along every axis",
            });
        }
        if !(self.dx > 0.0 && self.dy > 0.0 && self.dz > 0.0) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "grid cell size must be positive",
            });
        }
        Ok(())
    }
}

/// Spatial partitioning strategy for candidate pair generation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum BroadPhaseKind {
    BruteForce,
    Grid(GridParams),
    #[default]
    SweepAndPrune,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    pub solver_type: SolverType,
    /// Iterations of the collision pass (restitution applied).
    pub num_collision_iterations: usize,
    /// Iterations of the contact pass (restitution forced to zero).
    pub num_contact_iterations: usize,
    /// Timesteps over which penetration beyond the allowance is removed.
    pub num_penetration_relaxation_timesteps: f32,
    /// Penetration depth left uncorrected to keep resting contacts alive (meters).
    pub allowed_penetration: f32,
    /// Margin added to bounding-box and narrow-phase overlap tests (meters).
    pub collision_tolerance: f32,
    pub enable_shock_step: bool,
    pub enable_freezing: bool,
    /// Include the old-pose primitive bounds in each skin's bounding box.
    pub use_sweep_tests: bool,
    /// Run the full step, then restore every body as if it never happened.
    pub null_update: bool,
    pub broad_phase: BroadPhaseKind,
    /// Seed for the per-step collision list shuffle.
    pub shuffle_seed: u64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -GRAVITY_MPS2, 0.0),
            solver_type: SolverType::Normal,
            num_collision_iterations: 4,
            num_contact_iterations: 12,
            num_penetration_relaxation_timesteps: 3.0,
            allowed_penetration: 0.01,
            collision_tolerance: 0.05,
            enable_shock_step: false,
            enable_freezing: true,
            use_sweep_tests: false,
            null_update: false,
            broad_phase: BroadPhaseKind::SweepAndPrune,
            shuffle_seed: 0x5eed,
        }
    }
}

impl PhysicsConfig {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_solver(mut self, solver_type: SolverType) -> Self {
        self.solver_type = solver_type;
        self
    }

    pub fn with_broad_phase(mut self, broad_phase: BroadPhaseKind) -> Self {
        self.broad_phase = broad_phase;
        self
    }

    pub fn with_freezing(mut self, enabled: bool) -> Self {
        self.enable_freezing = enabled;
        self
    }

    pub fn with_shock_step(mut self, enabled: bool) -> Self {
        self.enable_shock_step = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "gravity must be finite",
            });
        }
        if self.num_penetration_relaxation_timesteps <= 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "penetration relaxation timesteps must be positive",
            });
        }
        if self.allowed_penetration < 0.0 || self.collision_tolerance < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "penetration allowance and collision tolerance must be non-negative",
            });
        }
        if let BroadPhaseKind::Grid(params) = &self.broad_phase {
            params.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = PhysicsConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.solver_type, SolverType::Normal);
        assert!((cfg.gravity.y + GRAVITY_MPS2).abs() < 1.0e-6);
    }

    #[test]
    fn zero_sized_grid_is_rejected() {
        let cfg = PhysicsConfig::default().with_broad_phase(BroadPhaseKind::Grid(GridParams {
            nx: 0,
            ..GridParams::default()
        }));
        assert!(matches!(
            cfg.validate(),
            Err(PhysicsError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let cfg = PhysicsConfig {
            collision_tolerance: -0.1,
            ..PhysicsConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
