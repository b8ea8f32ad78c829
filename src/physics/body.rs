use super::{collision, BodyError, BodyKey, Manifold, AABB};
use crate::math::{self as m, Angle, Vec2};

use itertools::Itertools;

//
// Vertex
//

/// A point mass integrated with verlet integration.
///
/// There is no explicit velocity; it's the difference between
/// the current and the previous position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec2,
    pub previous_position: Vec2,
}

impl Vertex {
    /// A vertex at rest at the given position.
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            previous_position: position,
        }
    }

    /// Displacement during the last step.
    #[inline]
    pub fn velocity(&self) -> Vec2 {
        self.position - self.previous_position
    }

    /// Advance the vertex by one step of length `dt`.
    ///
    /// The position is first clamped into `bounds`, if given.
    /// Drag is applied by placing the previous position ahead of the current one
    /// along the velocity, which shrinks the velocity seen on the next step.
    pub fn update(&mut self, force: Vec2, material: &Material, dt: f64, bounds: Option<&AABB>) {
        if let Some(bounds) = bounds {
            self.position.x = m::clamp(self.position.x, bounds.x.min, bounds.x.max);
            self.position.y = m::clamp(self.position.y, bounds.y.min, bounds.y.max);
        }

        let velocity = self.velocity();
        self.previous_position = self.position + velocity * (material.drag * dt);
        self.position = self.position + velocity + force * (dt * dt);
    }
}

//
// Edge
//

/// A rigid connection between two vertices of the same body.
///
/// Refers to the vertices by their index in the body's vertex list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    a: usize,
    b: usize,
    rest_length_sq: f64,
    normal: Vec2,
}

impl Edge {
    fn new(a: usize, b: usize, vertices: &[Vertex]) -> Self {
        let tangent = vertices[b].position - vertices[a].position;
        Self {
            a,
            b,
            rest_length_sq: tangent.mag_sq(),
            normal: m::try_normalize(m::right_normal(tangent)).unwrap_or_else(Vec2::zero),
        }
    }

    /// Indices of the two endpoints.
    #[inline]
    pub fn endpoints(&self) -> [usize; 2] {
        [self.a, self.b]
    }

    /// Unit normal as of the last update.
    /// Zero only if the edge has never had a nonzero length.
    #[inline]
    pub fn normal(&self) -> Vec2 {
        self.normal
    }

    #[inline]
    pub fn rest_length_sq(&self) -> f64 {
        self.rest_length_sq
    }

    /// Recompute the normal and pull the endpoints back towards the rest length.
    ///
    /// Uses the square root free approximation of a distance constraint,
    /// which converges over repeated steps rather than snapping in one go.
    fn update(&mut self, vertices: &mut [Vertex]) {
        let tangent = vertices[self.b].position - vertices[self.a].position;
        if let Some(n) = m::try_normalize(m::right_normal(tangent)) {
            self.normal = n;
        }

        let denom = tangent.mag_sq() + self.rest_length_sq;
        if denom < m::EPSILON {
            return;
        }
        let offset = tangent * (self.rest_length_sq / denom - 0.5);
        vertices[self.a].position -= offset;
        vertices[self.b].position += offset;
    }
}

//
// Body properties
//

/// Surface and damping properties of a body.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    /// Fraction of velocity removed per unit of time.
    pub drag: f64,
    pub restitution: f64,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            drag: 0.5,
            restitution: 0.0,
        }
    }
}

impl Material {
    pub const fn new(drag: f64, restitution: f64) -> Self {
        Self { drag, restitution }
    }
}

/// How a body moves and how it reacts to collisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Moved by forces and pushed around in collisions.
    Dynamic,
    /// Moved by scripts (through forces and translations) but not by gravity.
    /// Collides with everything but only gets pushed by other kinematic bodies.
    Kinematic,
    /// Never moves.
    Static,
}

impl Mode {
    #[inline]
    pub fn is_dynamic(self) -> bool {
        self == Mode::Dynamic
    }

    #[inline]
    pub fn is_kinematic(self) -> bool {
        self == Mode::Kinematic
    }

    #[inline]
    pub fn is_static(self) -> bool {
        self == Mode::Static
    }
}

/// How [`RigidBody::add_force`] treats the given vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForceMode {
    /// Accumulate into the force applied at the next step.
    Force,
    /// Add directly to the velocity of every vertex.
    Impulse,
    /// Replace the velocity of every vertex.
    Set,
}

/// Mass of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    #[inline]
    fn from(mass: f64) -> Self {
        Mass::Finite {
            mass,
            inverse: 1.0 / mass,
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }
}

//
// Rigid body
//

/// A convex polygon made of verlet vertices held together by rigid edges.
///
/// The first `n` edges go around the hull, one per vertex.
/// The rest brace every other pair of vertices so the shape can't shear.
/// Position and rotation aren't stored state but derived from the vertices
/// after every update.
#[derive(Clone, Debug)]
pub struct RigidBody {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    /// Offset of the first vertex from the centroid at construction,
    /// which rotation is measured against.
    anchor: Vec2,
    mass: Mass,
    material: Material,
    mode: Mode,
    force: Vec2,
    aabb: AABB,
    position: Vec2,
    rotation: Angle,
}

impl RigidBody {
    /// Create a body from a convex polygon given in either winding order.
    /// Clockwise polygons are reversed, so vertex indices may not match the input.
    ///
    /// `mass` is ignored for static bodies, which always have infinite mass.
    pub fn new(
        polygon: impl IntoIterator<Item = Vec2>,
        mass: f64,
        mode: Mode,
        material: Material,
    ) -> Result<Self, BodyError> {
        let mut points: Vec<Vec2> = polygon.into_iter().collect();
        // hull normals point outwards only for counterclockwise polygons
        if validate_polygon(&points)? < 0.0 {
            points.reverse();
        }

        let mass = match mode {
            Mode::Static => Mass::Infinite,
            _ if mass.is_finite() && mass > 0.0 => Mass::from(mass),
            _ => return Err(BodyError::InvalidMass { mass }),
        };

        let vertices: Vec<Vertex> = points.iter().copied().map(Vertex::new).collect();
        let n = vertices.len();
        let mut edges = Vec::with_capacity(n * (n - 1) / 2);
        for i in 0..n {
            edges.push(Edge::new(i, (i + 1) % n, &vertices));
        }
        // braces between every pair of vertices not already joined by the hull
        edges.extend(
            (0..n)
                .tuple_combinations()
                .filter(|&(i, j)| j != i + 1 && !(i == 0 && j == n - 1))
                .map(|(i, j)| Edge::new(i, j, &vertices)),
        );

        let mut body = RigidBody {
            vertices,
            edges,
            anchor: Vec2::zero(),
            mass,
            material,
            mode,
            force: Vec2::zero(),
            aabb: AABB::empty(),
            position: Vec2::zero(),
            rotation: Angle::default(),
        };
        body.refresh_transform();
        body.anchor = body.vertices[0].position - body.position;
        body.rotation = Angle::default();
        Ok(body)
    }

    /// A body that responds to gravity, forces and collisions.
    pub fn new_dynamic(
        polygon: impl IntoIterator<Item = Vec2>,
        mass: f64,
        material: Material,
    ) -> Result<Self, BodyError> {
        Self::new(polygon, mass, Mode::Dynamic, material)
    }

    /// A body moved only by explicit forces and translations.
    pub fn new_kinematic(
        polygon: impl IntoIterator<Item = Vec2>,
        mass: f64,
        material: Material,
    ) -> Result<Self, BodyError> {
        Self::new(polygon, mass, Mode::Kinematic, material)
    }

    /// A body that never moves.
    pub fn new_static(
        polygon: impl IntoIterator<Item = Vec2>,
        material: Material,
    ) -> Result<Self, BodyError> {
        Self::new(polygon, f64::INFINITY, Mode::Static, material)
    }

    /// An axis-aligned rectangle centered at `center`.
    pub fn new_rect(
        center: Vec2,
        half_extents: Vec2,
        mass: f64,
        mode: Mode,
        material: Material,
    ) -> Result<Self, BodyError> {
        let corners = AABB::from_center(center, half_extents).corners();
        Self::new(corners, mass, mode, material)
    }

    // accessors

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub(super) fn vertices_mut(&mut self) -> &mut [Vertex] {
        &mut self.vertices
    }

    /// Every edge, hull edges first.
    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The edges going around the outside of the polygon.
    /// Edge `i` connects vertex `i` to vertex `i + 1`.
    #[inline]
    pub fn hull_edges(&self) -> &[Edge] {
        &self.edges[..self.vertices.len()]
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn material(&self) -> &Material {
        &self.material
    }

    #[inline]
    pub fn mass(&self) -> Mass {
        self.mass
    }

    #[inline]
    pub fn inverse_mass(&self) -> f64 {
        self.mass.inv()
    }

    /// Force accumulated for the next step.
    #[inline]
    pub fn force(&self) -> Vec2 {
        self.force
    }

    /// Tight bounding box of the vertices, tagged with the body's key once it's in a world.
    #[inline]
    pub fn aabb(&self) -> &AABB {
        &self.aabb
    }

    /// Centroid of the vertices.
    #[inline]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Rotation relative to the body's orientation at construction, in `[0, 2π)`.
    #[inline]
    pub fn rotation(&self) -> Angle {
        self.rotation
    }

    #[inline]
    pub(super) fn set_owner(&mut self, owner: Option<BodyKey>) {
        self.aabb.owner = owner;
    }

    // movement

    /// Apply a force or velocity change. Static bodies ignore this.
    ///
    /// Forces are per unit mass, like gravity, so they accelerate every body equally.
    pub fn add_force(&mut self, force: Vec2, mode: ForceMode) {
        if self.mode.is_static() {
            return;
        }

        match mode {
            ForceMode::Force => self.force += force,
            ForceMode::Impulse => {
                for v in &mut self.vertices {
                    v.previous_position -= force;
                }
            }
            ForceMode::Set => {
                for v in &mut self.vertices {
                    v.previous_position = v.position - force;
                }
            }
        }
    }

    /// Move every vertex by `translation`.
    ///
    /// Unless `conserve_velocity` is set, the move also counts as velocity
    /// and the body keeps drifting in that direction.
    pub fn translate(&mut self, translation: Vec2, conserve_velocity: bool) {
        for v in &mut self.vertices {
            v.position += translation;
            if conserve_velocity {
                v.previous_position += translation;
            }
        }
        self.refresh_transform();
    }

    /// Rotate every vertex counterclockwise around the centroid.
    ///
    /// Unless `conserve_velocity` is set, the rotation also counts as angular velocity.
    pub fn rotate(&mut self, angle: Angle, conserve_velocity: bool) {
        let origin = self.position;
        for v in &mut self.vertices {
            let rotated = m::rotate_about(v.position, origin, angle);
            if conserve_velocity {
                v.previous_position += rotated - v.position;
            }
            v.position = rotated;
        }
        // edge normals turn with the body
        self.update_edges();
    }

    /// Integrate one step: move the vertices with the accumulated force,
    /// re-enforce the edges and clear the force.
    pub fn update(&mut self, dt: f64, bounds: Option<&AABB>) {
        if !self.mode.is_static() {
            for v in &mut self.vertices {
                v.update(self.force, &self.material, dt, bounds);
            }
            self.update_edges();
        }
        self.force = Vec2::zero();
    }

    /// Enforce the edge lengths, then re-derive the bounding box and transform.
    pub fn update_edges(&mut self) {
        for edge in &mut self.edges {
            edge.update(&mut self.vertices);
        }
        self.refresh_transform();
    }

    /// Recompute bounding box, centroid and rotation from the vertex positions.
    fn refresh_transform(&mut self) {
        self.aabb.reset();
        let mut sum = Vec2::zero();
        for v in &self.vertices {
            self.aabb.update(v.position);
            sum += v.position;
        }
        self.position = sum / self.vertices.len() as f64;
        self.rotation = m::complete_angle(self.anchor, self.vertices[0].position - self.position);
    }

    // collision

    /// Separating axis test against another body. See [`collision::collide`].
    #[inline]
    pub fn collide(&self, other: &RigidBody) -> Manifold {
        collision::collide(self, other)
    }

    /// Boolean separating axis test against an AABB, for triggers and sensors.
    #[inline]
    pub fn collide_aabb(&self, aabb: &AABB) -> bool {
        collision::collide_aabb(self, aabb)
    }
}

/// Check that a polygon is something we can simulate:
/// at least a triangle, finite, convex and not flat.
/// Returns twice the signed area, positive for counterclockwise winding.
fn validate_polygon(points: &[Vec2]) -> Result<f64, BodyError> {
    if points.len() < 3 {
        return Err(BodyError::TooFewVertices {
            count: points.len(),
        });
    }
    if let Some(index) = points.iter().position(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(BodyError::NonFiniteVertex { index });
    }

    // every turn must go the same way, collinear points are allowed
    let n = points.len();
    let mut winding = 0.0_f64;
    let mut total_turn = 0.0;
    let mut twice_area = 0.0;
    for i in 0..n {
        let (p0, p1, p2) = (points[i], points[(i + 1) % n], points[(i + 2) % n]);
        let turn = m::cross(p1 - p0, p2 - p1);
        if turn.abs() > m::EPSILON {
            if winding != 0.0 && turn.signum() != winding {
                return Err(BodyError::NotConvex);
            }
            winding = turn.signum();
        }
        total_turn += m::signed_angle(p1 - p0, p2 - p1).rad();
        twice_area += m::cross(p0, p1);
    }
    // a star turns the same way everywhere but goes around more than once
    if total_turn.abs() > std::f64::consts::TAU + m::EPSILON {
        return Err(BodyError::NotConvex);
    }
    if twice_area.abs() < m::EPSILON {
        return Err(BodyError::ZeroArea);
    }
    Ok(twice_area)
}
