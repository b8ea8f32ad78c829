//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::{PI, TAU};
pub use ultraviolet as uv;

/// 2D vector type used everywhere in the physics code.
///
/// Squared magnitude is computed on demand with `mag_sq`,
/// so there is no cached value that could go stale after a mutation.
pub type Vec2 = uv::DVec2;

/// Threshold below which lengths and divisors are treated as zero.
pub const EPSILON: f64 = 1e-9;

/// An angle in either degrees or radians.
/// Default conversion from f64 is in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }

    /// The same angle wrapped into the range `[0, 2π)` radians.
    pub fn wrapped(&self) -> Self {
        Angle::Rad(self.rad().rem_euclid(TAU))
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<f64> for Angle {
    #[inline]
    fn from(deg: f64) -> Self {
        Angle::Deg(deg)
    }
}

/// A running minimum and maximum of a set of scalars.
///
/// Starts out empty (`min = +inf`, `max = -inf`) and only ever grows.
/// Used for bounding boxes and for projecting polygons onto separating axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub const EMPTY: Interval = Interval {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    #[inline]
    pub fn new(min: f64, max: f64) -> Self {
        Interval { min, max }
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::EMPTY;
    }

    #[inline]
    pub fn update(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    #[inline]
    pub fn len(&self) -> f64 {
        self.max - self.min
    }

    /// Amount of overlap between two intervals. Negative if they're disjoint.
    #[inline]
    pub fn overlap(&self, other: &Interval) -> f64 {
        self.max.min(other.max) - self.min.max(other.min)
    }

    #[inline]
    pub fn union(&self, other: &Interval) -> Interval {
        Interval {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl FromIterator<f64> for Interval {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut interval = Interval::EMPTY;
        for value in iter {
            interval.update(value);
        }
        interval
    }
}

// Vec2 utils

#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// 2D cross product, i.e. the z component of the 3D cross product.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Projection of `v` onto the direction of `onto`.
/// Returns zero if `onto` is (nearly) the zero vector.
#[inline]
pub fn project(v: Vec2, onto: Vec2) -> Vec2 {
    let len_sq = onto.mag_sq();
    if len_sq < EPSILON {
        return Vec2::zero();
    }
    onto * (v.dot(onto) / len_sq)
}

/// Normalize `v`, or return `None` if it's too short to have a direction.
#[inline]
pub fn try_normalize(v: Vec2) -> Option<Vec2> {
    let len = v.mag();
    if len < EPSILON {
        None
    } else {
        Some(v / len)
    }
}

/// Angle from `from` to `to`, positive counterclockwise, in `(-π, π]`.
#[inline]
pub fn signed_angle(from: Vec2, to: Vec2) -> Angle {
    Angle::Rad(cross(from, to).atan2(from.dot(to)))
}

/// Angle from `from` to `to` wrapped into `[0, 2π)`.
#[inline]
pub fn complete_angle(from: Vec2, to: Vec2) -> Angle {
    signed_angle(from, to).wrapped()
}

/// Rotate `point` counterclockwise around `pivot`.
pub fn rotate_about(point: Vec2, pivot: Vec2, angle: Angle) -> Vec2 {
    let (sin, cos) = angle.rad().sin_cos();
    let d = point - pivot;
    pivot + Vec2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos)
}

#[inline]
pub fn lerp(start: Vec2, end: Vec2, t: f64) -> Vec2 {
    start + (end - start) * t
}

/// Clamp a scalar between two bounds given in either order.
#[inline]
pub fn clamp(value: f64, a: f64, b: f64) -> f64 {
    if a > b {
        value.max(b).min(a)
    } else {
        value.max(a).min(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_grows_from_empty() {
        let mut i = Interval::EMPTY;
        assert!(i.is_empty());
        i.update(2.0);
        assert_eq!(i, Interval::new(2.0, 2.0));
        i.update(-1.0);
        i.update(0.5);
        assert_eq!(i, Interval::new(-1.0, 2.0));
        i.reset();
        assert!(i.is_empty());

        let collected: Interval = [3.0, -4.0, 1.0].into_iter().collect();
        assert_eq!(collected, Interval::new(-4.0, 3.0));
    }

    #[test]
    fn interval_overlap_sign() {
        let a = Interval::new(0.0, 2.0);
        assert_eq!(a.overlap(&Interval::new(1.5, 3.0)), 0.5);
        assert!(a.overlap(&Interval::new(2.5, 3.0)) < 0.0);
        assert_eq!(a.overlap(&Interval::new(0.5, 1.0)), 0.5);
    }

    #[test]
    fn angles_between_vectors() {
        let x = Vec2::unit_x();
        let y = Vec2::unit_y();
        assert!((signed_angle(x, y).rad() - PI / 2.0).abs() < 1e-12);
        assert!((signed_angle(y, x).rad() + PI / 2.0).abs() < 1e-12);
        assert!((complete_angle(y, x).rad() - 3.0 * PI / 2.0).abs() < 1e-12);
        assert!((Angle::Deg(180.0).rad() - PI).abs() < 1e-12);
    }

    #[test]
    fn rotation_and_projection() {
        let p = rotate_about(Vec2::new(2.0, 1.0), Vec2::new(1.0, 1.0), Angle::Deg(90.0));
        assert!((p - Vec2::new(1.0, 2.0)).mag() < 1e-12);

        let proj = project(Vec2::new(3.0, 4.0), Vec2::new(2.0, 0.0));
        assert_eq!(proj, Vec2::new(3.0, 0.0));
        assert_eq!(project(Vec2::new(3.0, 4.0), Vec2::zero()), Vec2::zero());
        assert!(try_normalize(Vec2::zero()).is_none());
        assert_eq!(clamp(5.0, 3.0, 1.0), 3.0);
    }
}
