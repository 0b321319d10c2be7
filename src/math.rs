use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord2D {
    pub x: f64,
    pub y: f64,
}

impl Coord2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Coord2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimension2D {
    pub width: f64,
    pub height: f64,
}

impl Dimension2D {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Rotates `vector` counter-clockwise by `degrees` around the origin.
///
/// ```text
/// [cos θ  -sin θ] [x]
/// [sin θ   cos θ] [y]
/// ```
pub fn rotate_vector(vector: Coord2D, degrees: f64) -> Coord2D {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Coord2D {
        x: vector.x * cos - vector.y * sin,
        y: vector.x * sin + vector.y * cos,
    }
}

pub fn dot_product(a: Coord2D, b: Coord2D) -> f64 {
    a.x * b.x + a.y * b.y
}

/// Wraps an angle in degrees into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
