use super::AABB;
use crate::math::Vec2;

/// Tunable parameters of a [`World`][super::World].
///
/// Deserializing fills any missing field with its default,
/// so a config file only needs to list what it changes.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct WorldParams {
    /// Gravitational acceleration in meters per second squared.
    /// Positive y points down.
    pub gravity: Vec2,
    /// Number of world units in a meter. Gravity is multiplied by this.
    pub meter_scale: f64,
    /// How much leaves in the bounding volume tree are grown on each side.
    ///
    /// Bigger margins mean fewer tree updates for moving bodies
    /// but more false positives from the broad phase.
    pub fat_margin: Vec2,
    /// How many times collisions are resolved per step.
    pub iterations: usize,
    /// Length of a step in seconds.
    pub timestep: f64,
    /// Optional min and max corners of a box every vertex is kept inside.
    pub bounds: Option<(Vec2, Vec2)>,
}

impl Default for WorldParams {
    fn default() -> Self {
        WorldParams {
            gravity: Vec2::new(0.0, 9.81),
            meter_scale: 1.0,
            fat_margin: Vec2::new(2.0, 2.0),
            iterations: 5,
            timestep: 0.0222,
            bounds: None,
        }
    }
}

impl WorldParams {
    #[inline]
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    #[inline]
    pub fn with_meter_scale(mut self, meter_scale: f64) -> Self {
        self.meter_scale = meter_scale;
        self
    }

    #[inline]
    pub fn with_fat_margin(mut self, margin: Vec2) -> Self {
        self.fat_margin = margin;
        self
    }

    #[inline]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[inline]
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    #[inline]
    pub fn with_bounds(mut self, min: Vec2, max: Vec2) -> Self {
        self.bounds = Some((min, max));
        self
    }

    /// Gravity converted to world units.
    #[inline]
    pub fn scaled_gravity(&self) -> Vec2 {
        self.gravity * self.meter_scale
    }

    /// The configured bounds as an AABB.
    pub fn bounds_aabb(&self) -> Option<AABB> {
        self.bounds.map(|(min, max)| {
            let mut aabb = AABB::empty();
            aabb.update(min);
            aabb.update(max);
            aabb
        })
    }
}

#[cfg(all(test, feature = "serde-types"))]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let params: WorldParams = ron::from_str("(iterations: 8, timestep: 0.01)").unwrap();
        assert_eq!(
            params,
            WorldParams::default()
                .with_iterations(8)
                .with_timestep(0.01)
        );

        let params: WorldParams = ron::from_str("()").unwrap();
        assert_eq!(params, WorldParams::default());
    }

    #[test]
    fn ron_round_trip() {
        let params = WorldParams::default()
            .with_gravity(Vec2::new(0.0, -20.0))
            .with_meter_scale(32.0)
            .with_bounds(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 50.0));
        let text = ron::to_string(&params).unwrap();
        let back: WorldParams = ron::from_str(&text).unwrap();
        assert_eq!(back, params);
        assert_eq!(back.scaled_gravity(), Vec2::new(0.0, -640.0));

        let bounds = back.bounds_aabb().unwrap();
        assert_eq!(bounds.min(), Vec2::new(-100.0, -100.0));
        assert_eq!(bounds.max(), Vec2::new(100.0, 50.0));
    }
}
