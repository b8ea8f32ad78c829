use super::{bvh::LeafHandle, RigidBody};

use thunderdome as td;

/// Key type to look up a body stored in the physics world.
///
/// Keys are plain copyable values. Holding one does not keep the body alive,
/// and a key to a removed body simply stops resolving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyKey(pub(super) td::Index);

impl BodyKey {
    /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
    /// Useful for creating your own mappings from bodies to other things
    /// such as entities in a game framework.
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }

    /// Encode the key as a single integer, e.g. for sending over a network.
    #[inline]
    pub fn to_bits(&self) -> u64 {
        self.0.to_bits()
    }
}

/// Storage for the bodies in a world and the tree leaves that bound them.
///
/// Leaves are stored in a second arena at the same indices as their bodies,
/// so every living body has exactly one leaf.
#[derive(Default)]
pub(super) struct BodySet {
    pub(super) bodies: td::Arena<RigidBody>,
    pub(super) leaves: td::Arena<LeafHandle>,
}

impl BodySet {
    #[inline]
    pub(super) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(super) fn len(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub(super) fn get(&self, key: BodyKey) -> Option<&RigidBody> {
        self.bodies.get(key.0)
    }

    #[inline]
    pub(super) fn get_mut(&mut self, key: BodyKey) -> Option<&mut RigidBody> {
        self.bodies.get_mut(key.0)
    }

    /// Mutably access two different bodies at once.
    ///
    /// Returns None if the keys are equal or either body is gone.
    pub(super) fn get2_mut(
        &mut self,
        a: BodyKey,
        b: BodyKey,
    ) -> Option<(&mut RigidBody, &mut RigidBody)> {
        // thunderdome panics on two indices into the same slot
        if a.0.slot() == b.0.slot() {
            return None;
        }
        match self.bodies.get2_mut(a.0, b.0) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// Insert a body. The caller must attach a leaf with `set_leaf` right after.
    pub(super) fn insert(&mut self, body: RigidBody) -> BodyKey {
        BodyKey(self.bodies.insert(body))
    }

    #[inline]
    pub(super) fn set_leaf(&mut self, key: BodyKey, leaf: LeafHandle) {
        self.leaves.insert_at(key.0, leaf);
    }

    /// Remove a body and its leaf mapping, returning both if the body still existed.
    pub(super) fn remove(&mut self, key: BodyKey) -> Option<(RigidBody, Option<LeafHandle>)> {
        let body = self.bodies.remove(key.0)?;
        let leaf = self.leaves.remove(key.0);
        Some((body, leaf))
    }

    /// Snapshot of every key currently in the set, in arena order.
    pub(super) fn keys(&self) -> Vec<BodyKey> {
        self.bodies.iter().map(|(idx, _)| BodyKey(idx)).collect()
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = (BodyKey, &RigidBody)> {
        self.bodies.iter().map(|(idx, b)| (BodyKey(idx), b))
    }

    pub(super) fn iter_mut(&mut self) -> impl Iterator<Item = (BodyKey, &mut RigidBody)> {
        self.bodies.iter_mut().map(|(idx, b)| (BodyKey(idx), b))
    }

    /// Remove every body, handing them back in arena order.
    pub(super) fn drain(&mut self) -> Vec<(BodyKey, RigidBody)> {
        self.leaves.clear();
        self.bodies
            .drain()
            .map(|(idx, b)| (BodyKey(idx), b))
            .collect()
    }
}
