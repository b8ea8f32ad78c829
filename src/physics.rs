//! A verlet-integrated rigid body world.
//!
//! Bodies are convex polygons made of point masses held together by rigid edges.
//! Each step integrates the points, refits a bounding volume tree around the bodies,
//! and pushes overlapping bodies apart with a separating axis test.

use crate::math::{Angle, Vec2};
use crate::util::tracy_span;

pub mod aabb;
pub use aabb::AABB;

pub mod body;
pub use body::{Edge, ForceMode, Mass, Material, Mode, RigidBody, Vertex};

mod body_set;
use body_set::BodySet;
pub use body_set::BodyKey;

pub mod bvh;
pub use bvh::{AabbTree, LeafHandle};

pub mod collision;
pub use collision::Manifold;

pub mod error;
pub use error::{BodyError, WorldError};

pub mod params;
pub use params::WorldParams;

pub mod runner;
pub use runner::SharedWorld;

pub mod solver;
pub use solver::Correction;

//

/// What a [`World`] is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldState {
    /// Waiting for step requests.
    Idle,
    /// In the middle of a step.
    Stepping,
    /// Torn down with [`World::clear`]. Rejects steps until restarted.
    Stopped,
}

/// The state of one body as of the end of a step.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct BodySnapshot {
    /// [`BodyKey::to_bits`] of the body.
    pub id: u64,
    pub mode: Mode,
    pub position: Vec2,
    pub rotation: Angle,
    pub vertices: Vec<Vec2>,
}

/// The state of every body in a world at the end of a step,
/// detached from the world so it can be read or sent elsewhere while the world keeps going.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldSnapshot {
    /// Number of steps the world had taken.
    pub step: u64,
    pub bodies: Vec<BodySnapshot>,
}

impl WorldSnapshot {
    pub fn body(&self, key: BodyKey) -> Option<&BodySnapshot> {
        let id = key.to_bits();
        self.bodies.iter().find(|b| b.id == id)
    }
}

/// Statistics of a single step, mostly for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Leaves that escaped their fattened box and were reinserted into the tree.
    pub reinserted: usize,
    /// Broad phase pairs handed to the narrow phase, counted once per iteration.
    pub tested: usize,
    /// Pairs that were actually touching and got resolved.
    pub resolved: usize,
}

/// A physics simulation: bodies, the tree bounding them and the parameters they move by.
///
/// Every body in the world has exactly one leaf in the tree.
pub struct World {
    bodies: BodySet,
    tree: AabbTree,
    params: WorldParams,
    bounds: Option<AABB>,
    state: WorldState,
    pending_steps: usize,
    step_count: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldParams::default())
    }
}

impl World {
    pub fn new(params: WorldParams) -> Self {
        World {
            bodies: BodySet::new(),
            tree: AabbTree::new(params.fat_margin),
            bounds: params.bounds_aabb(),
            params,
            state: WorldState::Idle,
            pending_steps: 0,
            step_count: 0,
        }
    }

    #[inline]
    pub fn params(&self) -> &WorldParams {
        &self.params
    }

    /// Gravity in world units, as applied to dynamic bodies.
    #[inline]
    pub fn gravity(&self) -> Vec2 {
        self.params.scaled_gravity()
    }

    #[inline]
    pub fn state(&self) -> WorldState {
        self.state
    }

    /// Number of steps taken since creation or the last restart.
    #[inline]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    #[inline]
    pub fn pending_steps(&self) -> usize {
        self.pending_steps
    }

    /// The broad phase tree, for inspection.
    #[inline]
    pub fn tree(&self) -> &AabbTree {
        &self.tree
    }

    //
    // bodies
    //

    /// Add a body to the world, returning a key to access it with.
    pub fn add_body(&mut self, body: RigidBody) -> BodyKey {
        let mode = body.mode();
        let tight = *body.aabb();
        let key = self.bodies.insert(body);
        if let Some(body) = self.bodies.get_mut(key) {
            body.set_owner(Some(key));
        }
        let leaf = self.tree.insert(tight.with_owner(key));
        self.bodies.set_leaf(key, leaf);

        log::debug!("Added {:?} body {:?}", mode, key);
        key
    }

    /// Remove a body from the world, returning it if it was still there.
    ///
    /// Its leaf is taken out of the tree before the body is handed back.
    pub fn remove_body(&mut self, key: BodyKey) -> Option<RigidBody> {
        let (mut body, leaf) = self.bodies.remove(key)?;
        match leaf {
            Some(leaf) => {
                self.tree.remove(leaf);
            }
            None => debug_assert!(false, "body {:?} had no tree leaf", key),
        }
        body.set_owner(None);

        log::debug!("Removed body {:?}", key);
        Some(body)
    }

    #[inline]
    pub fn body(&self, key: BodyKey) -> Option<&RigidBody> {
        self.bodies.get(key)
    }

    /// Mutable access to a body, e.g. to apply forces or move it around.
    ///
    /// The tree catches up with any movement on the next step.
    #[inline]
    pub fn body_mut(&mut self, key: BodyKey) -> Option<&mut RigidBody> {
        self.bodies.get_mut(key)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyKey, &RigidBody)> {
        self.bodies.iter()
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    //
    // queries
    //

    /// Every leaf AABB in the tree overlapping the given one.
    ///
    /// Leaves are fattened, so this can contain bodies that aren't quite touching `aabb`.
    /// Each result's `owner` is the key of the body it bounds.
    pub fn query(&mut self, aabb: &AABB) -> Vec<AABB> {
        self.tree.query(aabb)
    }

    /// Keys of every body whose actual shape overlaps the given AABB.
    pub fn triggered_bodies(&mut self, aabb: &AABB) -> Vec<BodyKey> {
        let bodies = &self.bodies;
        self.tree
            .overlaps(aabb)
            .filter_map(|leaf| leaf.owner)
            .filter(|&key| bodies.get(key).map_or(false, |b| b.collide_aabb(aabb)))
            .collect()
    }

    /// The first body found whose actual shape overlaps the given AABB.
    pub fn first_triggered(&mut self, aabb: &AABB) -> Option<BodyKey> {
        let bodies = &self.bodies;
        self.tree
            .overlaps(aabb)
            .filter_map(|leaf| leaf.owner)
            .find(|&key| bodies.get(key).map_or(false, |b| b.collide_aabb(aabb)))
    }

    //
    // stepping
    //

    /// Ask for a step to be taken by the next [`run_pending`][Self::run_pending].
    pub fn request_step(&mut self) -> Result<(), WorldError> {
        if self.state == WorldState::Stopped {
            return Err(WorldError::Stopped);
        }
        self.pending_steps += 1;
        Ok(())
    }

    /// Take every requested step. Returns how many were taken.
    pub fn run_pending(&mut self) -> Result<usize, WorldError> {
        let mut taken = 0;
        while self.pending_steps > 0 {
            self.step()?;
            self.pending_steps -= 1;
            taken += 1;
        }
        Ok(taken)
    }

    /// Advance the simulation by one timestep.
    pub fn step(&mut self) -> Result<StepStats, WorldError> {
        if self.state == WorldState::Stopped {
            return Err(WorldError::Stopped);
        }
        tracy_span!("step");

        self.state = WorldState::Stepping;
        let stats = self.integrate_and_collide();
        self.state = WorldState::Idle;
        self.step_count += 1;

        log::trace!(
            "Step {}: {} leaves reinserted, {} pairs tested, {} resolved",
            self.step_count,
            stats.reinserted,
            stats.tested,
            stats.resolved
        );
        Ok(stats)
    }

    fn integrate_and_collide(&mut self) -> StepStats {
        let mut stats = StepStats::default();
        let gravity = self.params.scaled_gravity();
        let dt = self.params.timestep;

        {
            tracy_span!("integrate");
            for (_, body) in self.bodies.iter_mut() {
                if body.mode().is_dynamic() {
                    body.add_force(gravity, ForceMode::Force);
                }
                body.update(dt, self.bounds.as_ref());
            }
        }

        {
            tracy_span!("refit");
            let bodies = &self.bodies;
            stats.reinserted = self.tree.refit(|leaf| {
                let owner = leaf.owner?;
                let body = bodies.get(owner);
                debug_assert!(body.is_some(), "tree leaf owned by missing body {:?}", owner);
                body.map(|b| *b.aabb())
            });
        }

        tracy_span!("collide");
        // bodies don't come and go during a step, but take the keys up front anyway
        // so nothing below holds a borrow of the body set
        let keys = self.bodies.keys();
        let mut candidates: Vec<BodyKey> = Vec::new();
        for key in keys {
            let query = match self.bodies.get(key) {
                Some(body) if !body.mode().is_static() => *body.aabb(),
                _ => continue,
            };
            candidates.clear();
            candidates.extend(self.tree.overlaps(&query).filter_map(|leaf| leaf.owner));

            for _ in 0..self.params.iterations {
                for &other in &candidates {
                    let (this, that) = match self.bodies.get2_mut(key, other) {
                        Some(pair) => pair,
                        None => continue,
                    };
                    stats.tested += 1;
                    let manifold = this.collide(that);
                    if manifold.colliding {
                        let (a, b) = manifold.order(this, that);
                        solver::resolve(&manifold, a, b);
                        stats.resolved += 1;
                    }
                }
            }
        }

        stats
    }

    /// Copy the current state of every body.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            step: self.step_count,
            bodies: self
                .bodies
                .iter()
                .map(|(key, body)| BodySnapshot {
                    id: key.to_bits(),
                    mode: body.mode(),
                    position: body.position(),
                    rotation: body.rotation(),
                    vertices: body.vertices().iter().map(|v| v.position).collect(),
                })
                .collect(),
        }
    }

    //
    // lifecycle
    //

    /// Tear the world down: drop pending steps, empty the tree
    /// and hand every body back to the caller.
    ///
    /// The world is stopped afterwards and rejects steps until [`restart`][Self::restart]ed.
    /// Calling this on an already stopped world does nothing and returns no bodies.
    pub fn clear(&mut self) -> Vec<(BodyKey, RigidBody)> {
        if self.state == WorldState::Stopped {
            return Vec::new();
        }
        self.pending_steps = 0;
        self.tree.clear();
        let mut bodies = self.bodies.drain();
        for (_, body) in &mut bodies {
            body.set_owner(None);
        }
        self.state = WorldState::Stopped;

        log::debug!("World cleared, released {} bodies", bodies.len());
        bodies
    }

    /// Bring a stopped world back to life, empty and at step zero.
    /// Does nothing to a world that isn't stopped.
    pub fn restart(&mut self) {
        if self.state != WorldState::Stopped {
            return;
        }
        self.state = WorldState::Idle;
        self.step_count = 0;
        log::debug!("World restarted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> [Vec2; 3] {
        [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 2.0),
        ]
    }

    fn floor(world: &mut World) -> BodyKey {
        let floor = RigidBody::new_rect(
            Vec2::new(0.0, 10.0),
            Vec2::new(20.0, 1.0),
            1.0,
            Mode::Static,
            Material::default(),
        )
        .unwrap();
        world.add_body(floor)
    }

    #[test]
    fn falling_triangle_through_the_world() {
        let mut world = World::default();
        let key = world.add_body(RigidBody::new_dynamic(triangle(), 1.0, Material::default()).unwrap());
        let start = world.body(key).unwrap().position();

        world.step().unwrap();

        let moved = world.body(key).unwrap().position() - start;
        let dt = world.params().timestep;
        assert!(moved.x.abs() < 1e-12);
        assert!((moved.y - 9.81 * dt * dt).abs() < 1e-12);
        assert_eq!(world.step_count(), 1);
        assert_eq!(world.state(), WorldState::Idle);
    }

    #[test]
    fn body_comes_to_rest_on_static_floor() {
        let mut world = World::default();
        let floor_key = floor(&mut world);
        let floor_before = world.body(floor_key).unwrap().vertices().to_vec();

        let box_key = world.add_body(
            RigidBody::new_rect(
                Vec2::new(0.0, 6.0),
                Vec2::new(1.0, 1.0),
                1.0,
                Mode::Dynamic,
                Material::default(),
            )
            .unwrap(),
        );

        let mut resolved = 0;
        for _ in 0..400 {
            resolved += world.step().unwrap().resolved;
        }
        assert!(resolved > 0);

        let body = world.body(box_key).unwrap();
        // the floor's top is at y = 9, so the box's center settles around y = 8
        assert!(body.aabb().y.max < 9.0 + 0.1, "box sank into the floor: {:?}", body.aabb());
        assert!(body.aabb().y.max > 9.0 - 0.1, "box is floating: {:?}", body.aabb());
        assert!(body.position().x.abs() < 0.1);
        assert_eq!(world.body(floor_key).unwrap().vertices(), &floor_before[..]);
    }

    #[test]
    fn tree_leaves_track_bodies() {
        let mut world = World::default();
        let f = floor(&mut world);
        let keys: Vec<BodyKey> = (0..5)
            .map(|i| {
                let body = RigidBody::new_rect(
                    Vec2::new(i as f64 * 3.0, 0.0),
                    Vec2::new(1.0, 1.0),
                    1.0,
                    Mode::Dynamic,
                    Material::default(),
                )
                .unwrap();
                world.add_body(body)
            })
            .collect();
        assert_eq!(world.tree().len(), 6);

        let removed = world.remove_body(keys[2]).unwrap();
        assert_eq!(removed.aabb().owner, None);
        assert!(world.remove_body(keys[2]).is_none());
        assert!(world.body(keys[2]).is_none());
        assert_eq!(world.tree().len(), 5);

        // a removed body can come back under a new key
        let back = world.add_body(removed);
        assert_ne!(back, keys[2]);
        assert_eq!(world.tree().len(), 6);

        for _ in 0..30 {
            world.step().unwrap();
        }
        world.tree().assert_invariants();
        for (key, body) in world.bodies() {
            let owned: Vec<&AABB> = world
                .tree()
                .leaves()
                .map(|(_, aabb)| aabb)
                .filter(|aabb| aabb.owner == Some(key))
                .collect();
            assert_eq!(owned.len(), 1);
            assert!(owned[0].contains(body.aabb()));
        }
        assert!(world.body(f).is_some());
    }

    #[test]
    fn queries_and_triggers() {
        let mut world = World::default();
        let f = floor(&mut world);
        let mut diamond = RigidBody::new_rect(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            1.0,
            Mode::Kinematic,
            Material::default(),
        )
        .unwrap();
        diamond.rotate(Angle::Deg(45.0), true);
        let d = world.add_body(diamond);

        let probe = AABB::from_center(Vec2::new(0.0, 0.0), Vec2::new(0.1, 0.1));
        let found = world.query(&probe);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].owner, Some(d));
        assert_eq!(world.triggered_bodies(&probe), vec![d]);
        assert_eq!(world.first_triggered(&probe), Some(d));

        // in the diamond's fat leaf but outside its shape
        let corner = AABB::from_center(Vec2::new(1.25, 1.25), Vec2::new(0.1, 0.1));
        assert_eq!(world.query(&corner).len(), 1);
        assert!(world.triggered_bodies(&corner).is_empty());
        assert_eq!(world.first_triggered(&corner), None);

        let on_floor = AABB::from_center(Vec2::new(5.0, 9.5), Vec2::new(0.5, 0.5));
        assert_eq!(world.first_triggered(&on_floor), Some(f));
    }

    #[test]
    fn pending_steps_are_drained() {
        let mut world = World::default();
        world.add_body(RigidBody::new_dynamic(triangle(), 1.0, Material::default()).unwrap());
        for _ in 0..3 {
            world.request_step().unwrap();
        }
        assert_eq!(world.pending_steps(), 3);
        assert_eq!(world.run_pending(), Ok(3));
        assert_eq!(world.pending_steps(), 0);
        assert_eq!(world.step_count(), 3);
        assert_eq!(world.run_pending(), Ok(0));
    }

    #[test]
    fn clear_is_idempotent_and_stops_the_world() {
        let mut world = World::default();
        floor(&mut world);
        let key = world.add_body(RigidBody::new_dynamic(triangle(), 1.0, Material::default()).unwrap());
        world.request_step().unwrap();

        let released = world.clear();
        assert_eq!(released.len(), 2);
        assert!(released.iter().any(|(k, _)| *k == key));
        assert!(released.iter().all(|(_, b)| b.aabb().owner.is_none()));
        assert_eq!(world.state(), WorldState::Stopped);
        assert_eq!(world.pending_steps(), 0);
        assert!(world.tree().is_empty());
        assert_eq!(world.body_count(), 0);

        assert!(world.clear().is_empty());
        assert_eq!(world.request_step(), Err(WorldError::Stopped));
        assert_eq!(world.step(), Err(WorldError::Stopped));

        world.restart();
        assert_eq!(world.state(), WorldState::Idle);
        world.request_step().unwrap();
        assert_eq!(world.run_pending(), Ok(1));
    }

    #[test]
    fn snapshot_reflects_bodies() {
        let mut world = World::default();
        let key = world.add_body(RigidBody::new_dynamic(triangle(), 1.0, Material::default()).unwrap());
        world.step().unwrap();

        let snapshot = world.snapshot();
        assert_eq!(snapshot.step, 1);
        assert_eq!(snapshot.bodies.len(), 1);
        let body = snapshot.body(key).unwrap();
        assert_eq!(body.position, world.body(key).unwrap().position());
        assert_eq!(body.vertices.len(), 3);
        assert_eq!(body.mode, Mode::Dynamic);
    }
}
