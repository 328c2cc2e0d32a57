//! 3D vector utilities for player positions.
//! The world is y-up: x and z span the ground plane, y is height.

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Shorthand constructor
pub fn vec3(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

/// Subtract vectors (a - b)
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

/// Vector length
pub fn length(v: Vec3) -> f64 {
    (v.x * v.x + v.y * v.y + v.z * v.z).sqrt()
}

/// Straight-line distance between two points
pub fn distance(a: Vec3, b: Vec3) -> f64 {
    length(sub(a, b))
}

/// Distance from the vertical axis through the origin (ignores height).
pub fn planar_length(v: Vec3) -> f64 {
    (v.x * v.x + v.z * v.z).sqrt()
}

/// Pull a point back onto the circle of `radius` around the vertical axis,
/// keeping its bearing and height. Points already inside are returned as is.
pub fn clamp_planar(v: Vec3, radius: f64) -> Vec3 {
    let d = planar_length(v);
    if d <= radius || d < 1e-12 {
        return v;
    }
    let s = radius / d;
    Vec3::new(v.x * s, v.y, v.z * s)
}

/// Smallest absolute difference between two angles, in radians.
pub fn angle_delta(a: f64, b: f64) -> f64 {
    let tau = std::f64::consts::TAU;
    let d = (a - b).rem_euclid(tau);
    d.min(tau - d)
}
