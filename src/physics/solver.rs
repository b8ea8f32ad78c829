//! Positional correction of colliding bodies.

use super::{Manifold, Mode, RigidBody};
use crate::math::{self as m, Vec2};

/// How a penetration between a vertex owner A and an edge owner B is corrected.
///
/// Picked from the pair of body modes with [`Mode::correction_against`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Correction {
    /// Both bodies deform: the vertex of A moves half the way out
    /// and the edge of B takes the other half.
    Split,
    /// A is translated out by the full amount.
    TranslateA,
    /// A and B are both translated by half.
    TranslateBoth,
    /// Only the edge of B is pushed, by the full amount.
    PushEdge,
    /// B is translated out by the full amount.
    TranslateB,
    /// Nothing can move.
    None,
}

impl Mode {
    /// Correction to apply when a vertex of a body with this mode
    /// penetrates an edge of a body with the `edge_owner` mode.
    pub fn correction_against(self, edge_owner: Mode) -> Correction {
        use Mode::*;
        match (self, edge_owner) {
            (Dynamic, Dynamic) => Correction::Split,
            (Dynamic, Kinematic) | (Dynamic, Static) => Correction::TranslateA,
            (Kinematic, Kinematic) => Correction::TranslateBoth,
            (Kinematic, Dynamic) => Correction::PushEdge,
            (Kinematic, Static) => Correction::TranslateA,
            (Static, Dynamic) | (Static, Kinematic) => Correction::TranslateB,
            (Static, Static) => Correction::None,
        }
    }
}

/// Where `point` lies along the edge from `start` to `end`, in `[0, 1]`.
///
/// Measured on whichever axis the edge spans more of.
fn edge_parameter(start: Vec2, end: Vec2, point: Vec2) -> f64 {
    let span = end - start;
    if span.x.abs().max(span.y.abs()) < m::EPSILON {
        return 0.5;
    }
    let t = if span.x.abs() > span.y.abs() {
        (point.x - start.x) / span.x
    } else {
        (point.y - start.y) / span.y
    };
    m::clamp(t.abs(), 0.0, 1.0)
}

/// Push `a` (the vertex owner) and `b` (the edge owner) apart.
///
/// Does nothing if the manifold isn't colliding.
/// Moving bodies get their edges and transforms re-derived afterwards.
pub fn resolve(manifold: &Manifold, a: &mut RigidBody, b: &mut RigidBody) {
    if !manifold.colliding {
        return;
    }
    let correction = a.mode().correction_against(b.mode());
    if correction == Correction::None {
        return;
    }

    apply(correction, manifold, a, b);

    for body in [a, b] {
        if !body.mode().is_static() {
            body.update_edges();
        }
    }
}

/// Move the raw vertices without enforcing the edges.
fn apply(correction: Correction, manifold: &Manifold, a: &mut RigidBody, b: &mut RigidBody) {
    let mtv = manifold.mtv();

    // weights for sharing a push between the two ends of the edge
    // so that the point of contact on it moves by the full push
    let edge_weights = |a: &RigidBody, b: &RigidBody| {
        let [i, j] = b.hull_edges()[manifold.edge].endpoints();
        let contact = a.vertices()[manifold.vertex].position - mtv;
        let t = edge_parameter(b.vertices()[i].position, b.vertices()[j].position, contact);
        let lambda = 1.0 / (t * t + (1.0 - t) * (1.0 - t));
        ([i, j], [(1.0 - t) * lambda, t * lambda])
    };

    match correction {
        Correction::Split => {
            let ([i, j], [wi, wj]) = edge_weights(&*a, &*b);
            a.vertices_mut()[manifold.vertex].position += mtv * 0.5;
            let verts = b.vertices_mut();
            verts[i].position -= mtv * (0.5 * wi);
            verts[j].position -= mtv * (0.5 * wj);
        }
        Correction::TranslateA => a.translate(mtv, false),
        Correction::TranslateBoth => {
            a.translate(mtv * 0.5, false);
            b.translate(mtv * -0.5, false);
        }
        Correction::PushEdge => {
            let ([i, j], [wi, wj]) = edge_weights(&*a, &*b);
            let verts = b.vertices_mut();
            verts[i].position -= mtv * wi;
            verts[j].position -= mtv * wj;
        }
        Correction::TranslateB => b.translate(-mtv, false),
        Correction::None => {}
    }
}
