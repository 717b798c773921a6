//! Collision islands: bodies connected through contacts or enabled
//! constraints. Islands decide sleep as a unit, so a stack only freezes once
//! every body in it has been still long enough.

use std::collections::HashSet;

use crate::collision::ContactPool;
use crate::dynamics::body::{BodyHandle, BodySet};
use crate::dynamics::constraint::ConstraintSet;

#[derive(Clone, Debug, Default)]
pub struct CollisionIsland {
    bodies: Vec<BodyHandle>,
}

impl CollisionIsland {
    #[inline]
    pub fn bodies(&self) -> &[BodyHandle] {
        &self.bodies
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// True when no member wants to stay awake.
    pub fn wants_deactivation(&self, bodies: &BodySet) -> bool {
        self.bodies
            .iter()
            .filter_map(|h| bodies.get(*h))
            .all(|b| !b.should_be_active())
    }

    pub fn deactivate(&self, bodies: &mut BodySet, freezing_enabled: bool) {
        for h in &self.bodies {
            if let Some(b) = bodies.get_mut(*h) {
                b.set_inactive(freezing_enabled);
            }
        }
    }

    pub fn activate(&self, bodies: &mut BodySet) {
        for h in &self.bodies {
            if let Some(b) = bodies.get_mut(*h) {
                if !b.is_active() {
                    b.set_active(1.0);
                }
            }
        }
    }
}

/// Flood-fill `candidates` into islands over live collisions and enabled
/// constraints. Immovable bodies and static geometry never join or bridge
/// islands.
pub fn build_islands(
    bodies: &BodySet,
    candidates: &[BodyHandle],
    pool: &ContactPool,
    constraints: &ConstraintSet,
) -> Vec<CollisionIsland> {
    let mut visited: HashSet<BodyHandle> = HashSet::new();
    let mut islands = Vec::new();
    let mut stack = Vec::new();

    let movable = |h: BodyHandle| bodies.get(h).is_some_and(|b| !b.is_immovable());

    for &seed in candidates {
        if !movable(seed) || !visited.insert(seed) {
            continue;
        }
        let mut island = CollisionIsland::default();
        stack.push(seed);
        while let Some(current) = stack.pop() {
            island.bodies.push(current);
            let Some(body) = bodies.get(current) else {
                continue;
            };
            let via_contacts = body
                .collisions()
                .iter()
                .filter_map(|id| pool.get(*id))
                .filter_map(|info| info.other_body(current));
            let via_constraints = body
                .constraints()
                .iter()
                .filter_map(|c| constraints.get(*c))
                .filter(|c| c.is_enabled())
                .flat_map(|c| {
                    let (a, b) = c.bodies();
                    std::iter::once(a).chain(b)
                })
                .filter(|h| *h != current);
            for next in via_contacts.chain(via_constraints) {
                if movable(next) && visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        islands.push(island);
    }
    islands
}
