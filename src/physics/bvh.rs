//! A dynamic Bounding Volume Hierarchy
//! for speeding up collision detection and other spatial queries.
//!
//! Leaves store AABBs fattened by a fixed margin,
//! so that a body moving a little doesn't need to touch the tree at all.
//! Only when a body leaves its fat box is its leaf removed and reinserted.

use super::AABB;
use crate::math::Vec2;

//
// Internal types
//

#[derive(Clone, Copy, Debug)]
struct Node {
    aabb: AABB,
    parent: Option<usize>,
    kind: NodeKind,
}

#[derive(Clone, Copy, Debug)]
enum NodeKind {
    Branch { left: usize, right: usize },
    Leaf,
    /// Slot waiting in the free list.
    Free,
}

/// A "call stack" for efficient recursion through the tree.
#[derive(Clone, Debug, Default)]
struct Stack(Vec<usize>);

/// Handle to a leaf in an [`AabbTree`].
///
/// Stays valid until the leaf is removed, including across refits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeafHandle(usize);

//
// Tree itself
//

/// A Bounding Volume Hierarchy implemented as an
/// incrementally constructed and repaired binary AABB tree.
///
/// Nodes live in a flat arena and refer to each other by index.
#[derive(Clone, Debug)]
pub struct AabbTree {
    nodes: Vec<Node>,
    free_list: Vec<usize>,
    root: Option<usize>,
    leaf_count: usize,
    margin: Vec2,
    /// Single stack that is kept around so that we don't need to
    /// allocate a separate one for every traversal.
    shared_stack: Stack,
}

impl Default for AabbTree {
    fn default() -> Self {
        Self::new(Vec2::new(2.0, 2.0))
    }
}

impl AabbTree {
    /// Create an empty tree whose leaves are fattened by `margin` on every side.
    pub fn new(margin: Vec2) -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: None,
            leaf_count: 0,
            margin,
            shared_stack: Stack::default(),
        }
    }

    #[inline]
    pub fn margin(&self) -> Vec2 {
        self.margin
    }

    /// Number of leaves in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
        self.root = None;
        self.leaf_count = 0;
    }

    /// The fattened AABB stored for a leaf, if it's still in the tree.
    pub fn get(&self, leaf: LeafHandle) -> Option<&AABB> {
        match self.nodes.get(leaf.0) {
            Some(Node {
                aabb,
                kind: NodeKind::Leaf,
                ..
            }) => Some(aabb),
            _ => None,
        }
    }

    /// Every leaf currently in the tree, in arena order.
    pub fn leaves(&self) -> impl Iterator<Item = (LeafHandle, &AABB)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node.kind, NodeKind::Leaf))
            .map(|(idx, node)| (LeafHandle(idx), &node.aabb))
    }

    /// Length of the longest path from the root to a leaf.
    /// Zero for an empty tree or a single leaf.
    pub fn height(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut max_depth = 0;
        let mut stack = vec![(root, 0)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let NodeKind::Branch { left, right } = self.nodes[idx].kind {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        max_depth
    }

    /// Insert a tight AABB. The tree stores it fattened by the margin.
    pub fn insert(&mut self, aabb: AABB) -> LeafHandle {
        let leaf = self.alloc(Node {
            aabb: aabb.fattened(self.margin),
            parent: None,
            kind: NodeKind::Leaf,
        });
        self.insert_leaf(leaf);
        self.leaf_count += 1;
        LeafHandle(leaf)
    }

    /// Remove a leaf, returning its stored AABB if it was still in the tree.
    pub fn remove(&mut self, leaf: LeafHandle) -> Option<AABB> {
        let aabb = *self.get(leaf)?;
        self.remove_leaf(leaf.0);
        self.free(leaf.0);
        self.leaf_count -= 1;
        Some(aabb)
    }

    /// Tell the tree a leaf's owner now has the tight AABB `tight`.
    ///
    /// Nothing happens if the stored fat AABB still contains it.
    /// Otherwise the leaf is reinserted with a freshly fattened box.
    /// Returns whether the tree changed.
    pub fn update(&mut self, leaf: LeafHandle, tight: AABB) -> bool {
        let Some(stored) = self.get(leaf).copied() else {
            debug_assert!(false, "updated a leaf that isn't in the tree");
            return false;
        };
        if stored.contains(&tight) {
            return false;
        }

        self.remove_leaf(leaf.0);
        self.nodes[leaf.0].aabb = AABB {
            owner: stored.owner,
            ..tight.fattened(self.margin)
        };
        self.insert_leaf(leaf.0);
        true
    }

    /// Reinsert every leaf whose fat AABB no longer contains its owner's tight AABB.
    ///
    /// `tight` is given each leaf's stored AABB and returns the current tight box
    /// of whatever it bounds, or None to leave the leaf alone.
    /// Leaves are collected up front so reinsertions don't disturb the traversal.
    /// Returns the number of reinserted leaves.
    pub fn refit(&mut self, mut tight: impl FnMut(&AABB) -> Option<AABB>) -> usize {
        let worklist: Vec<(LeafHandle, AABB)> = self.leaves().map(|(h, a)| (h, *a)).collect();

        let mut reinserted = 0;
        for (leaf, stored) in worklist {
            if let Some(t) = tight(&stored) {
                if self.update(leaf, t) {
                    reinserted += 1;
                }
            }
        }
        reinserted
    }

    /// Collect every leaf AABB overlapping the given one.
    ///
    /// If the query AABB has an owner, that owner's own leaf is never returned.
    pub fn query(&mut self, aabb: &AABB) -> Vec<AABB> {
        self.overlaps(aabb).copied().collect()
    }

    /// Iterate over every leaf AABB overlapping the given one
    /// without allocating a result list.
    pub fn overlaps(&mut self, aabb: &AABB) -> OverlapIter<'_> {
        let mut iter = OverlapIter {
            aabb: *aabb,
            stack: &mut self.shared_stack,
            nodes: &self.nodes,
            next_node: None,
        };
        let first = self.root.filter(|&root| iter.visits(root));
        iter.next_node = first;
        iter
    }

    //
    // Structural operations
    //

    fn alloc(&mut self, node: Node) -> usize {
        match self.free_list.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn free(&mut self, idx: usize) {
        self.nodes[idx].kind = NodeKind::Free;
        self.nodes[idx].parent = None;
        self.free_list.push(idx);
    }

    /// Area cost of pushing the new leaf down into `child`.
    fn descend_cost(&self, child: usize, leaf_aabb: &AABB, inheritance: f64) -> f64 {
        let child_node = &self.nodes[child];
        let union_area = child_node.aabb.union(leaf_aabb).area();
        match child_node.kind {
            NodeKind::Leaf => union_area + inheritance,
            _ => union_area - child_node.aabb.area() + inheritance,
        }
    }

    /// Link an already allocated leaf node into the tree.
    fn insert_leaf(&mut self, leaf: usize) {
        let Some(root) = self.root else {
            self.nodes[leaf].parent = None;
            self.root = Some(leaf);
            return;
        };

        // traverse the tree and find a nice sibling for the new leaf,
        // stopping when a new branch here is cheaper than going further down

        let leaf_aabb = self.nodes[leaf].aabb;
        let mut sibling = root;
        while let NodeKind::Branch { left, right } = self.nodes[sibling].kind {
            let node_aabb = self.nodes[sibling].aabb;
            let combined_area = node_aabb.union(&leaf_aabb).area();

            let branch_cost = 2.0 * combined_area;
            // every node below here grows by at least this much
            let inheritance = 2.0 * (combined_area - node_aabb.area());

            let left_cost = self.descend_cost(left, &leaf_aabb, inheritance);
            let right_cost = self.descend_cost(right, &leaf_aabb, inheritance);

            if branch_cost < left_cost && branch_cost < right_cost {
                break;
            }
            sibling = if left_cost <= right_cost { left } else { right };
        }

        // put a new branch where the sibling was,
        // with the sibling and the new leaf as its children

        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.alloc(Node {
            aabb: self.nodes[sibling].aabb.union(&leaf_aabb),
            parent: old_parent,
            kind: NodeKind::Branch {
                left: sibling,
                right: leaf,
            },
        });
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        match old_parent {
            Some(old_parent) => self.replace_child(old_parent, sibling, new_parent),
            None => self.root = Some(new_parent),
        }

        self.fix_upwards(Some(new_parent));
    }

    /// Unlink a leaf node from the tree without freeing it.
    fn remove_leaf(&mut self, leaf: usize) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }

        let Some(parent) = self.nodes[leaf].parent else {
            debug_assert!(false, "non-root leaf without a parent");
            return;
        };
        let sibling = match self.nodes[parent].kind {
            NodeKind::Branch { left, right } if left == leaf => right,
            NodeKind::Branch { left, .. } => left,
            _ => unreachable!("parent of a leaf must be a branch"),
        };
        let grandparent = self.nodes[parent].parent;

        self.nodes[sibling].parent = grandparent;
        match grandparent {
            Some(grandparent) => {
                self.replace_child(grandparent, parent, sibling);
                self.fix_upwards(Some(grandparent));
            }
            None => self.root = Some(sibling),
        }

        self.free(parent);
        self.nodes[leaf].parent = None;
    }

    fn replace_child(&mut self, branch: usize, old: usize, new: usize) {
        if let NodeKind::Branch { left, right } = &mut self.nodes[branch].kind {
            if *left == old {
                *left = new;
            } else {
                debug_assert_eq!(*right, old);
                *right = new;
            }
        }
    }

    /// Recompute branch AABBs from `start` up to the root.
    fn fix_upwards(&mut self, start: Option<usize>) {
        let mut curr = start;
        while let Some(idx) = curr {
            if let NodeKind::Branch { left, right } = self.nodes[idx].kind {
                self.nodes[idx].aabb = self.nodes[left].aabb.union(&self.nodes[right].aabb);
            }
            curr = self.nodes[idx].parent;
        }
    }

    /// Panic if any branch isn't exactly the union of its children
    /// or any parent link doesn't match the child links.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.leaf_count, 0);
            return;
        };
        assert_eq!(self.nodes[root].parent, None);

        let mut leaves = 0;
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            match self.nodes[idx].kind {
                NodeKind::Branch { left, right } => {
                    assert_eq!(self.nodes[left].parent, Some(idx));
                    assert_eq!(self.nodes[right].parent, Some(idx));
                    let union = self.nodes[left].aabb.union(&self.nodes[right].aabb);
                    assert_eq!(self.nodes[idx].aabb, union);
                    stack.push(left);
                    stack.push(right);
                }
                NodeKind::Leaf => leaves += 1,
                NodeKind::Free => panic!("free node {idx} reachable from the root"),
            }
        }
        assert_eq!(leaves, self.leaf_count);
    }
}

//
// Iterators
//

/// An iterator that yields every leaf AABB that intersects with a given AABB.
#[derive(Debug)]
pub struct OverlapIter<'a> {
    aabb: AABB,
    stack: &'a mut Stack,
    nodes: &'a [Node],
    next_node: Option<usize>,
}

impl<'a> OverlapIter<'a> {
    /// Whether a node needs to be looked at at all.
    fn visits(&self, idx: usize) -> bool {
        let node = &self.nodes[idx];
        if !node.aabb.overlaps(&self.aabb) {
            return false;
        }
        // a box is never reported as overlapping itself
        !(matches!(node.kind, NodeKind::Leaf)
            && self.aabb.owner.is_some()
            && node.aabb.owner == self.aabb.owner)
    }
}

impl<'a> Iterator for OverlapIter<'a> {
    type Item = &'a AABB;

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = self.nodes;
        loop {
            let next_node = self.next_node?;

            match nodes[next_node].kind {
                NodeKind::Branch { left, right } => match (self.visits(left), self.visits(right)) {
                    (true, true) => {
                        // need to visit both children, push to stack to return to later
                        self.stack.0.push(right);
                        self.next_node = Some(left);
                    }
                    (true, false) => {
                        self.next_node = Some(left);
                    }
                    (false, true) => {
                        self.next_node = Some(right);
                    }
                    (false, false) => {
                        // nothing below this, return back up the stack
                        self.next_node = self.stack.0.pop();
                    }
                },
                NodeKind::Leaf => {
                    self.next_node = self.stack.0.pop();
                    return Some(&nodes[next_node].aabb);
                }
                NodeKind::Free => unreachable!("free node linked into the tree"),
            }
        }
    }
}

impl<'a> Drop for OverlapIter<'a> {
    fn drop(&mut self) {
        // clear the stack on drop; it may not be empty
        // if the iteration didn't finish
        self.stack.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::BodyKey;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::HashSet;
    use thunderdome as td;

    fn square(x: f64, y: f64, half: f64) -> AABB {
        AABB::from_center(Vec2::new(x, y), Vec2::new(half, half))
    }

    fn random_aabb(rng: &mut StdRng) -> AABB {
        let center = Vec2::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));
        let half = Vec2::new(rng.gen_range(0.1..5.0), rng.gen_range(0.1..5.0));
        AABB::from_center(center, half)
    }

    fn owners(count: usize) -> Vec<BodyKey> {
        let mut arena = td::Arena::new();
        (0..count).map(|_| BodyKey(arena.insert(()))).collect()
    }

    fn leaf_set(tree: &AabbTree) -> HashSet<LeafHandle> {
        tree.leaves().map(|(h, _)| h).collect()
    }

    #[test]
    fn empty_and_single_leaf() {
        let mut tree = AabbTree::new(Vec2::zero());
        assert!(tree.is_empty());
        assert!(tree.query(&square(0.0, 0.0, 1.0)).is_empty());
        tree.assert_invariants();

        let leaf = tree.insert(square(0.0, 0.0, 1.0));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.query(&square(0.5, 0.0, 1.0)).len(), 1);
        assert!(tree.query(&square(5.0, 0.0, 1.0)).is_empty());
        tree.assert_invariants();

        assert!(tree.remove(leaf).is_some());
        assert!(tree.is_empty());
        assert!(tree.remove(leaf).is_none());
        assert!(tree.query(&square(0.0, 0.0, 1.0)).is_empty());
        tree.assert_invariants();
    }

    #[test]
    fn leaves_are_fattened() {
        let mut tree = AabbTree::new(Vec2::new(2.0, 1.0));
        let leaf = tree.insert(square(0.0, 0.0, 1.0));
        let stored = tree.get(leaf).unwrap();
        assert_eq!(stored.min(), Vec2::new(-3.0, -2.0));
        assert_eq!(stored.max(), Vec2::new(3.0, 2.0));
    }

    #[test]
    fn new_leaf_pairs_with_nearest_sibling() {
        let mut tree = AabbTree::new(Vec2::zero());
        let a = tree.insert(square(0.0, 0.0, 1.0));
        let _b = tree.insert(square(100.0, 0.0, 1.0));
        let c = tree.insert(square(1.0, 0.0, 1.0));

        let parent_a = tree.nodes[a.0].parent.unwrap();
        let parent_c = tree.nodes[c.0].parent.unwrap();
        assert_eq!(parent_a, parent_c);
        assert_eq!(tree.nodes[parent_a].parent, tree.root);
        tree.assert_invariants();
    }

    #[test]
    fn union_invariant_under_random_edits() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut tree = AabbTree::new(Vec2::new(0.5, 0.5));
        let mut handles = Vec::new();

        for round in 0..400 {
            if handles.is_empty() || rng.gen_bool(0.65) {
                handles.push(tree.insert(random_aabb(&mut rng)));
            } else {
                let idx = rng.gen_range(0..handles.len());
                let leaf = handles.swap_remove(idx);
                assert!(tree.remove(leaf).is_some());
            }
            if round % 50 == 0 {
                // move everything around a bit
                tree.refit(|stored| {
                    let shift = Vec2::new(stored.x.min.sin(), stored.y.min.cos()) * 3.0;
                    Some(AABB::from_center(stored.center() + shift, stored.size() * 0.25))
                });
            }
            tree.assert_invariants();
        }
        assert_eq!(tree.len(), handles.len());
    }

    #[test]
    fn insert_then_remove_restores_leaf_set() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut tree = AabbTree::new(Vec2::new(1.0, 1.0));
        for _ in 0..30 {
            tree.insert(random_aabb(&mut rng));
        }
        let before = leaf_set(&tree);
        let before_boxes: Vec<AABB> = tree.leaves().map(|(_, a)| *a).collect();

        let extra = tree.insert(random_aabb(&mut rng));
        assert_eq!(tree.len(), 31);
        tree.remove(extra);

        assert_eq!(leaf_set(&tree), before);
        let after_boxes: Vec<AABB> = tree.leaves().map(|(_, a)| *a).collect();
        itertools::assert_equal(after_boxes, before_boxes);
        tree.assert_invariants();
    }

    #[test]
    fn query_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut tree = AabbTree::new(Vec2::new(0.25, 0.25));
        let keys = owners(200);
        for key in &keys {
            tree.insert(random_aabb(&mut rng).with_owner(*key));
        }
        let stored: Vec<AABB> = tree.leaves().map(|(_, a)| *a).collect();

        for _ in 0..100 {
            let q = random_aabb(&mut rng);
            let mut from_tree: Vec<BodyKey> =
                tree.query(&q).iter().filter_map(|a| a.owner).collect();
            let mut brute: Vec<BodyKey> = stored
                .iter()
                .filter(|b| b.overlaps(&q))
                .filter_map(|b| b.owner)
                .collect();
            from_tree.sort_by_key(|k| k.to_bits());
            brute.sort_by_key(|k| k.to_bits());
            assert_eq!(from_tree, brute);
        }
    }

    #[test]
    fn query_excludes_own_leaf() {
        let keys = owners(2);
        let mut tree = AabbTree::new(Vec2::zero());
        let a = square(0.0, 0.0, 1.0).with_owner(keys[0]);
        let b = square(1.5, 0.0, 1.0).with_owner(keys[1]);
        tree.insert(a);
        tree.insert(b);

        let hits = tree.query(&a);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner, Some(keys[1]));

        // an untagged box with the same extents is a different box
        let untagged = square(0.0, 0.0, 1.0);
        assert_eq!(tree.query(&untagged).len(), 2);
    }

    #[test]
    fn refit_only_moves_escaped_leaves() {
        let keys = owners(3);
        let mut tree = AabbTree::new(Vec2::new(2.0, 2.0));
        let mut tight = vec![
            square(0.0, 0.0, 1.0).with_owner(keys[0]),
            square(10.0, 0.0, 1.0).with_owner(keys[1]),
            square(20.0, 0.0, 1.0).with_owner(keys[2]),
        ];
        let handles: Vec<LeafHandle> = tight.iter().map(|a| tree.insert(*a)).collect();

        // small move stays inside the fat box, large one doesn't
        tight[0] = tight[0].recentered(Vec2::new(1.0, 0.5));
        tight[2] = tight[2].recentered(Vec2::new(-30.0, 4.0));
        let lookup = |stored: &AABB| {
            let owner = stored.owner?;
            tight.iter().find(|t| t.owner == Some(owner)).copied()
        };
        let reinserted = tree.refit(lookup);
        assert_eq!(reinserted, 1);
        tree.assert_invariants();

        assert!(tree.get(handles[2]).unwrap().contains(&tight[2]));
        assert_eq!(tree.get(handles[0]).unwrap().center(), Vec2::new(0.0, 0.0));
        let hits = tree.query(&square(-30.0, 4.0, 0.5));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner, Some(keys[2]));
    }

    #[test]
    fn partially_consumed_iterator_resets_stack() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut tree = AabbTree::new(Vec2::zero());
        for _ in 0..50 {
            tree.insert(random_aabb(&mut rng));
        }
        let everything = AABB::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0));
        assert!(tree.overlaps(&everything).next().is_some());
        assert_eq!(tree.overlaps(&everything).count(), 50);
    }
}
