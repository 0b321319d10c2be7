use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Deserializer, Serialize};

use crate::math::{dot_product, normalize_degrees, rotate_vector, Coord2D, Dimension2D};
use crate::rng::JitterRange;

/// Physical footprint of an entity. Rotation is in degrees and always kept in `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub center: Coord2D,
    pub dimension: Dimension2D,
    #[serde(default, deserialize_with = "deserialize_rotation")]
    rotation: f64,
}

fn deserialize_rotation<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    f64::deserialize(deserializer).map(normalize_degrees)
}

impl BoundingBox {
    pub fn new(center: Coord2D, dimension: Dimension2D, rotation: f64) -> Self {
        Self {
            center,
            dimension,
            rotation: normalize_degrees(rotation),
        }
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f64) {
        self.rotation = normalize_degrees(degrees);
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation != 0.0
    }

    /// World-space corners, rotated about the center.
    pub fn vertices(&self) -> [Coord2D; 4] {
        let half_w = self.dimension.width / 2.0;
        let half_h = self.dimension.height / 2.0;
        [
            Coord2D::new(-half_w, -half_h),
            Coord2D::new(-half_w, half_h),
            Coord2D::new(half_w, half_h),
            Coord2D::new(half_w, -half_h),
        ]
        .map(|corner| {
            let rotated = rotate_vector(corner, self.rotation);
            Coord2D::new(rotated.x + self.center.x, rotated.y + self.center.y)
        })
    }

    /// Rotation in radians folded into `[0, π)`; a rectangle is symmetric under a half turn.
    pub fn rotation_in_pi(&self) -> f64 {
        let rads = self.rotation.to_radians();
        if rads >= PI {
            rads - PI
        } else {
            rads
        }
    }

    /// Dimensions of the smallest axis-aligned box containing the rotated box.
    pub fn outscribed_dimension(&self) -> Dimension2D {
        if !self.is_rotated() {
            return self.dimension;
        }
        let Dimension2D { width, height } = self.dimension;
        let rads = self.rotation_in_pi();
        if rads <= FRAC_PI_2 {
            let (sin, cos) = rads.sin_cos();
            return Dimension2D::new(
                (height * sin + width * cos).abs(),
                (width * sin + height * cos).abs(),
            );
        }
        let (sin, cos) = (rads - FRAC_PI_2).sin_cos();
        Dimension2D::new(
            (height * cos + width * sin).abs(),
            (width * cos + height * sin).abs(),
        )
    }

    /// Exact overlap test. Touching edges count as colliding.
    pub fn is_colliding_with(&self, other: &BoundingBox) -> bool {
        if !self.is_rotated() && !other.is_rotated() {
            return self.overlaps_axis_aligned(other);
        }
        self.overlaps_separating_axis(other)
    }

    pub fn overlaps_axis_aligned(&self, other: &BoundingBox) -> bool {
        let (a_min, a_max) = self.axis_aligned_corners();
        let (b_min, b_max) = other.axis_aligned_corners();
        !(a_max.x < b_min.x || b_max.x < a_min.x || a_max.y < b_min.y || b_max.y < a_min.y)
    }

    /// Separating axis test over the edge normals of both quadrilaterals.
    pub fn overlaps_separating_axis(&self, other: &BoundingBox) -> bool {
        let polygons = [self.vertices(), other.vertices()];
        for polygon in &polygons {
            for i in 0..polygon.len() {
                let a = polygon[i];
                let b = polygon[(i + 1) % polygon.len()];
                let normal = Coord2D::new(b.y - a.y, a.x - b.x);

                let (min_a, max_a) = project(&polygons[0], normal);
                let (min_b, max_b) = project(&polygons[1], normal);
                if max_a < min_b || max_b < min_a {
                    return false;
                }
            }
        }
        true
    }

    /// Top-left and bottom-right corners of the outscribed box.
    pub fn axis_aligned_corners(&self) -> (Coord2D, Coord2D) {
        let dimension = self.outscribed_dimension();
        (
            Coord2D::new(
                self.center.x - dimension.width / 2.0,
                self.center.y - dimension.height / 2.0,
            ),
            Coord2D::new(
                self.center.x + dimension.width / 2.0,
                self.center.y + dimension.height / 2.0,
            ),
        )
    }
}

fn project(polygon: &[Coord2D; 4], axis: Coord2D) -> (f64, f64) {
    polygon
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), vertex| {
            let projection = dot_product(axis, *vertex);
            (min.min(projection), max.max(projection))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Velocity {
    pub dx: f64,
    pub dy: f64,
    pub d_theta: f64,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity {
        dx: 0.0,
        dy: 0.0,
        d_theta: 0.0,
    };

    pub fn new(dx: f64, dy: f64, d_theta: f64) -> Self {
        Self { dx, dy, d_theta }
    }

    pub fn add(&mut self, other: &Velocity) {
        self.dx += other.dx;
        self.dy += other.dy;
        self.d_theta += other.d_theta;
    }
}

/// One force contribution. Missing fields on the wire are zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Force2D {
    pub fx: f64,
    pub fy: f64,
    pub torque: f64,
}

impl Force2D {
    pub fn vertical(fy: f64) -> Self {
        Self {
            fy,
            ..Self::default()
        }
    }
}

/// Forces and torques applied on the next physics pass, then cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forces {
    pub forces: Vec<Force2D>,
}

impl Forces {
    pub fn push(&mut self, force: Force2D) {
        self.forces.push(force);
    }

    pub fn sum(&self) -> Force2D {
        self.forces.iter().fold(Force2D::default(), |acc, f| Force2D {
            fx: acc.fx + f.fx,
            fy: acc.fy + f.fy,
            torque: acc.torque + f.torque,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mass {
    pub mass: f64,
}

impl Mass {
    pub fn new(mass: f64) -> Self {
        Self { mass }
    }
}

/// Rotational inertia.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moment {
    pub inertia: f64,
}

impl Moment {
    pub fn new(inertia: f64) -> Self {
        Self { inertia }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    pub terminal_velocity: f64,
}

impl Gravity {
    pub const DEFAULT_TERMINAL_VELOCITY: f64 = 4.5;

    pub fn new(terminal_velocity: f64) -> Self {
        Self { terminal_velocity }
    }
}

impl Default for Gravity {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TERMINAL_VELOCITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Jump {
    pub can_jump: bool,
}

/// Marks an entity as drivable by one session.
///
/// `control_velocity` is added on top of physics velocity and zeroed by the integrator
/// after every pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Control {
    pub controllable_by: Option<String>,
    pub control_velocity: Velocity,
    pub is_controllable: bool,
}

impl Control {
    pub fn owned_by(session_id: impl Into<String>) -> Self {
        Self {
            controllable_by: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn is_owned_by(&self, session_id: &str) -> bool {
        self.controllable_by.as_deref() == Some(session_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collide;

/// One-sided floor surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopCollidable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WallBounded;

/// Marks an entity whose state is kept in sync across the network.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkUpdateable {
    pub is_publish: bool,
    pub update_interval: JitterRange,
    pub next_update_in_ms: f64,
    pub last_hash: Option<u64>,
}

impl NetworkUpdateable {
    pub fn new(update_interval: JitterRange) -> Self {
        Self {
            is_publish: true,
            update_interval,
            next_update_in_ms: 0.0,
            last_hash: None,
        }
    }

    pub fn subscribe_only(update_interval: JitterRange) -> Self {
        Self {
            is_publish: false,
            ..Self::new(update_interval)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Left,
    Right,
}

/// Visual only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FacingDirection {
    pub facing: Direction,
}
