use crate::dynamics::build_islands;
use crate::system::PhysicsSystem;

impl PhysicsSystem {
    /// Put whole islands to sleep once every member has been still for its
    /// deactivation time, and wake islands that touch something moving.
    pub(crate) fn try_to_freeze_all(&mut self, dt: f32) {
        for &h in &self.active_bodies {
            if let Some(b) = self.bodies.get_mut(h) {
                b.update_deactivation(dt);
            }
        }

        let islands = build_islands(&self.bodies, &self.body_order, &self.pool, &self.constraints);
        let mut frozen = 0usize;
        for island in &islands {
            if island.wants_deactivation(&self.bodies) {
                island.deactivate(&mut self.bodies, self.config.enable_freezing);
                frozen += island.len();
            } else {
                island.activate(&mut self.bodies);
            }
        }
        log::debug!("{} islands, {frozen} bodies asleep", islands.len());

        for &h in &self.active_bodies {
            if let Some(b) = self.bodies.get_mut(h) {
                if b.is_active() {
                    b.damp_for_deactivation();
                }
            }
        }
    }
}
