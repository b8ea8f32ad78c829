use super::BodyKey;
use crate::math::{Interval, Vec2};

/// Axis-aligned bounding box.
///
/// Optionally tagged with the key of the body it bounds.
/// The tag is just a key, so an AABB never keeps a body alive,
/// and it's how the tree tells apart two boxes that happen to have the same extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB {
    pub x: Interval,
    pub y: Interval,
    pub owner: Option<BodyKey>,
}

impl Default for AABB {
    fn default() -> Self {
        Self::empty()
    }
}

impl AABB {
    /// An AABB containing nothing. Grows with [`update`][Self::update].
    pub const fn empty() -> Self {
        AABB {
            x: Interval::EMPTY,
            y: Interval::EMPTY,
            owner: None,
        }
    }

    pub fn new(min: Vec2, max: Vec2) -> Self {
        debug_assert!(min.x <= max.x && min.y <= max.y, "AABB min must not exceed max");
        AABB {
            x: Interval::new(min.x, max.x),
            y: Interval::new(min.y, max.y),
            owner: None,
        }
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// The smallest AABB containing every given point.
    pub fn from_points(points: impl IntoIterator<Item = Vec2>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.update(p);
        }
        aabb
    }

    #[inline]
    pub fn with_owner(mut self, owner: BodyKey) -> Self {
        self.owner = Some(owner);
        self
    }

    #[inline]
    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x.min, self.y.min)
    }

    #[inline]
    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x.max, self.y.max)
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min() + self.max()) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.x.len(), self.y.len())
    }

    /// The four corners in counterclockwise order (in y-up coordinates) starting from `min`.
    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min(),
            Vec2::new(self.x.max, self.y.min),
            self.max(),
            Vec2::new(self.x.min, self.y.max),
        ]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty()
    }

    /// Grow the box to contain a point.
    #[inline]
    pub fn update(&mut self, point: Vec2) {
        self.x.update(point.x);
        self.y.update(point.y);
    }

    /// Make the box empty again, keeping the owner.
    #[inline]
    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
    }

    /// Smallest AABB containing both. The result has no owner.
    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            x: self.x.union(&other.x),
            y: self.y.union(&other.y),
            owner: None,
        }
    }

    /// Strict overlap test; boxes that only touch do not overlap.
    #[inline]
    pub fn overlaps(&self, other: &AABB) -> bool {
        self.x.min < other.x.max
            && other.x.min < self.x.max
            && self.y.min < other.y.max
            && other.y.min < self.y.max
    }

    /// Whether `other` lies completely inside this box.
    #[inline]
    pub fn contains(&self, other: &AABB) -> bool {
        self.x.min <= other.x.min
            && self.x.max >= other.x.max
            && self.y.min <= other.y.min
            && self.y.max >= other.y.max
    }

    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        self.x.min <= point.x
            && point.x <= self.x.max
            && self.y.min <= point.y
            && point.y <= self.y.max
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.x.len() * self.y.len()
        }
    }

    /// The box grown by `margin` on every side.
    pub fn fattened(&self, margin: Vec2) -> AABB {
        AABB {
            x: Interval::new(self.x.min - margin.x, self.x.max + margin.x),
            y: Interval::new(self.y.min - margin.y, self.y.max + margin.y),
            owner: self.owner,
        }
    }

    /// The same size of box moved so that its center is at `center`.
    pub fn recentered(&self, center: Vec2) -> AABB {
        let half = self.size() * 0.5;
        AABB {
            owner: self.owner,
            ..AABB::from_center(center, half)
        }
    }
}
