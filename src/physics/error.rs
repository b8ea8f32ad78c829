/// Reasons a polygon can't be turned into a [`RigidBody`][super::RigidBody].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BodyError {
    #[error("A body needs at least 3 vertices, got {count}")]
    TooFewVertices { count: usize },
    #[error("Vertex {index} has a non-finite coordinate")]
    NonFiniteVertex { index: usize },
    #[error("Dynamic and kinematic bodies need a finite positive mass, got {mass}")]
    InvalidMass { mass: f64 },
    #[error("Polygon is not convex")]
    NotConvex,
    #[error("Polygon has zero area")]
    ZeroArea,
}

/// Errors from driving a [`World`][super::World].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldError {
    #[error("The world has been stopped and must be restarted before stepping")]
    Stopped,
}
