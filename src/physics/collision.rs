//! Separating axis tests between convex bodies and against AABBs.

use super::{RigidBody, AABB};
use crate::math::{self as m, Interval, Vec2};

/// Result of a narrow phase test between two bodies.
///
/// A collision is always described as a vertex of one body (A)
/// pushed into a hull edge of the other (B).
/// Because either argument of [`collide`] can end up as A,
/// `swapped` records the order; use [`order`][Self::order] to get the bodies as (A, B).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Manifold {
    /// Unit normal of the separating axis, pointing from B towards A.
    pub normal: Vec2,
    /// Penetration depth along `normal`.
    pub overlap: f64,
    /// Index of the hull edge on body B that faces A along the normal.
    pub edge: usize,
    /// Index of the deepest vertex on body A.
    pub vertex: usize,
    /// True if A is the second argument of the test.
    pub swapped: bool,
    pub colliding: bool,
}

impl Manifold {
    /// A manifold describing two bodies that don't touch.
    pub fn separated() -> Self {
        Manifold {
            normal: Vec2::zero(),
            overlap: 0.0,
            edge: 0,
            vertex: 0,
            swapped: false,
            colliding: false,
        }
    }

    /// Arrange the two arguments given to [`collide`] as (vertex owner, edge owner).
    #[inline]
    pub fn order<T>(&self, first: T, second: T) -> (T, T) {
        if self.swapped {
            (second, first)
        } else {
            (first, second)
        }
    }

    /// Minimum translation that moves A out of B.
    #[inline]
    pub fn mtv(&self) -> Vec2 {
        self.normal * self.overlap
    }
}

impl Default for Manifold {
    fn default() -> Self {
        Self::separated()
    }
}

/// Projection of a set of points onto a unit axis.
#[inline]
fn project(points: impl IntoIterator<Item = Vec2>, axis: Vec2) -> Interval {
    points.into_iter().map(|p| p.dot(axis)).collect()
}

#[inline]
fn project_body(body: &RigidBody, axis: Vec2) -> Interval {
    project(body.vertices().iter().map(|v| v.position), axis)
}

/// Test two bodies for intersection with the separating axis theorem.
///
/// The candidate axes are the hull edge normals of `first` followed by those of `second`.
/// The first axis found with the smallest overlap wins,
/// and the body that doesn't own that edge becomes body A of the manifold.
pub fn collide(first: &RigidBody, second: &RigidBody) -> Manifold {
    crate::util::tracy_span!("collide");

    // (overlap, axis, edge index, edge belongs to `first`)
    let mut best: Option<(f64, Vec2, usize, bool)> = None;

    let axes = first
        .hull_edges()
        .iter()
        .enumerate()
        .map(|(i, e)| (e.normal(), i, true))
        .chain(
            second
                .hull_edges()
                .iter()
                .enumerate()
                .map(|(i, e)| (e.normal(), i, false)),
        );

    for (axis, edge, on_first) in axes {
        // degenerate edge, no direction to test
        if axis.mag_sq() < m::EPSILON {
            continue;
        }

        let overlap = project_body(first, axis).overlap(&project_body(second, axis));
        if overlap < 0.0 {
            return Manifold::separated();
        }
        if best.map_or(true, |(smallest, ..)| overlap < smallest) {
            best = Some((overlap, axis, edge, on_first));
        }
    }

    let (overlap, mut normal, mut edge, swapped) = match best {
        Some(best) => best,
        None => return Manifold::separated(),
    };

    let (a, b) = if swapped {
        (second, first)
    } else {
        (first, second)
    };

    if (a.position() - b.position()).dot(normal) < 0.0 {
        normal = -normal;
    }

    // a parallel edge on the far side of B gives the same axis,
    // so pick the edge that actually faces A
    let b_edges = b.hull_edges();
    if b_edges[edge].normal().dot(normal) < 0.0 {
        edge = b_edges
            .iter()
            .map(|e| e.normal().dot(normal))
            .enumerate()
            .fold((edge, f64::NEG_INFINITY), |(best, best_dot), (i, d)| {
                if d > best_dot {
                    (i, d)
                } else {
                    (best, best_dot)
                }
            })
            .0;
    }

    // the vertex of A furthest into B along the normal
    let mut vertex = 0;
    let mut smallest = f64::INFINITY;
    for (i, v) in a.vertices().iter().enumerate() {
        let dist = (v.position - b.position()).dot(normal);
        if dist < smallest {
            smallest = dist;
            vertex = i;
        }
    }

    Manifold {
        normal,
        overlap,
        edge,
        vertex,
        swapped,
        colliding: true,
    }
}

/// Boolean separating axis test between a body and an AABB.
pub fn collide_aabb(body: &RigidBody, aabb: &AABB) -> bool {
    if aabb.is_empty() {
        return false;
    }
    let corners = aabb.corners();

    [Vec2::unit_x(), Vec2::unit_y()]
        .into_iter()
        .chain(body.hull_edges().iter().map(|e| e.normal()))
        .filter(|axis| axis.mag_sq() >= m::EPSILON)
        .all(|axis| project(corners, axis).overlap(&project_body(body, axis)) >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Material, Mode};

    fn square(center: Vec2, half: f64) -> RigidBody {
        RigidBody::new_rect(
            center,
            Vec2::new(half, half),
            1.0,
            Mode::Dynamic,
            Material::default(),
        )
        .unwrap()
    }

    #[test]
    fn overlapping_squares_pick_shallowest_axis() {
        let left = square(Vec2::zero(), 1.0);
        let right = square(Vec2::new(1.5, 0.2), 1.0);

        let m = collide(&left, &right);
        assert!(m.colliding);
        assert_eq!(m.overlap, 0.5);
        assert!((m.normal.mag() - 1.0).abs() < 1e-12);
        // the right side of `left` produced the axis, so `right` is pushed out of it
        assert!(m.swapped);
        assert_eq!(m.edge, 1);
        assert_eq!(m.normal, Vec2::new(1.0, 0.0));
        assert_eq!(m.vertex, 0);

        let (a, b) = m.order(&right, &left);
        assert_eq!(a.position(), left.position());
        assert_eq!(b.position(), right.position());
        let (a, _) = m.order(&left, &right);
        assert_eq!(a.position(), right.position());
    }

    #[test]
    fn normal_points_from_edge_owner_to_vertex_owner() {
        let a = square(Vec2::new(0.0, 1.8), 1.0);
        let b = square(Vec2::zero(), 1.0);
        for (first, second) in [(&a, &b), (&b, &a)] {
            let m = collide(first, second);
            assert!(m.colliding);
            assert!((m.overlap - 0.2).abs() < 1e-12);
            let (va, vb) = m.order(first, second);
            assert!((va.position() - vb.position()).dot(m.normal) >= 0.0);
            // moving A along the mtv separates the pair
            let mut moved = va.clone();
            moved.translate(m.mtv() * 1.01, true);
            assert!(!collide(&moved, vb).colliding);
        }
    }

    #[test]
    fn separated_bodies_exit_early() {
        let a = square(Vec2::zero(), 1.0);
        let b = square(Vec2::new(3.0, 0.0), 1.0);
        assert_eq!(collide(&a, &b), Manifold::separated());
        assert_eq!(collide(&b, &a), Manifold::separated());

        // separated only along a diagonal, which only the rotated body's axes can find
        let mut diamond = square(Vec2::new(2.3, 2.3), 1.0);
        diamond.rotate(m::Angle::Deg(45.0), true);
        assert!(a.aabb().overlaps(diamond.aabb()));
        assert!(!collide(&a, &diamond).colliding);
    }

    #[test]
    fn body_against_aabb() {
        let body = square(Vec2::zero(), 1.0);
        assert!(collide_aabb(&body, &AABB::from_center(Vec2::new(1.5, 0.0), Vec2::new(1.0, 1.0))));
        assert!(!collide_aabb(&body, &AABB::from_center(Vec2::new(3.5, 0.0), Vec2::new(1.0, 1.0))));
        assert!(!collide_aabb(&body, &AABB::empty()));

        let mut diamond = square(Vec2::zero(), 1.0);
        diamond.rotate(m::Angle::Deg(45.0), true);
        // inside the diamond's bounding box but outside the diamond itself
        let corner = AABB::from_center(Vec2::new(1.25, 1.25), Vec2::new(0.1, 0.1));
        assert!(diamond.aabb().overlaps(&corner));
        assert!(!collide_aabb(&diamond, &corner));
    }
}
