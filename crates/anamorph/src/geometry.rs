//! Intersection primitives and small vector helpers.
//!
//! Degenerate inputs (parallel lines, a line parallel to a plane) are reported
//! as `None`. The checks compare against exact zero: near-parallel inputs give
//! large but finite intersections rather than a failure.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Intersection of the lines `p1 + a·d1` and `p2 + b·d2` via Cramer's rule.
pub fn line_line_intersection(
    p1: Vector2<f64>,
    d1: Vector2<f64>,
    p2: Vector2<f64>,
    d2: Vector2<f64>,
) -> Option<Vector2<f64>> {
    // [d1 -d2] [a b]^T = p2 - p1
    let det = d1.x * -d2.y + d2.x * d1.y;
    if det == 0.0 {
        return None;
    }
    let num = (p2.x - p1.x) * -d2.y + (p2.y - p1.y) * d2.x;
    let a = num / det;
    Some(p1 + d1 * a)
}

/// Intersection of the line `p + t·d` with the plane through `plane_point`
/// with normal `plane_normal`. `None` when the line is parallel to the plane
/// (either missing it or lying inside it).
pub fn line_plane_intersection(
    p: Vector3<f64>,
    d: Vector3<f64>,
    plane_normal: Vector3<f64>,
    plane_point: Vector3<f64>,
) -> Option<Vector3<f64>> {
    let den = d.dot(&plane_normal);
    if den == 0.0 {
        return None;
    }
    let t = (plane_point - p).dot(&plane_normal) / den;
    Some(p + d * t)
}

/// Specular reflection of `d` about the unit normal `n`.
#[inline]
pub fn reflect(d: Vector3<f64>, n: Vector3<f64>) -> Vector3<f64> {
    d - n * (2.0 * d.dot(&n))
}

/// Unsigned angle between `a` and `b` in degrees, in `[0, 180]`.
/// Returns 0 when either vector is zero.
pub fn angle_deg(a: Vector3<f64>, b: Vector3<f64>) -> f64 {
    if a.norm_squared() == 0.0 || b.norm_squared() == 0.0 {
        return 0.0;
    }
    a.cross(&b).norm().atan2(a.dot(&b)).to_degrees()
}

/// Unsigned angle between two 2D vectors in degrees, in `[0, 180]`.
pub fn angle_deg_2d(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    if a.norm_squared() == 0.0 || b.norm_squared() == 0.0 {
        return 0.0;
    }
    perp_dot(a, b).abs().atan2(a.dot(&b)).to_degrees()
}

/// Angle from `from` to `to` in degrees, positive counterclockwise.
pub fn signed_angle_deg_2d(from: Vector2<f64>, to: Vector2<f64>) -> f64 {
    let unsigned = angle_deg_2d(from, to);
    if perp_dot(from, to) < 0.0 {
        -unsigned
    } else {
        unsigned
    }
}

#[inline]
fn perp_dot(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Unit vector at `deg` degrees from the first axis of a 2D frame.
#[inline]
pub fn unit_from_deg(deg: f64) -> Vector2<f64> {
    let r = deg.to_radians();
    Vector2::new(r.cos(), r.sin())
}

/// Axis-aligned plane used to flatten 3D data for planar solves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferencePlane {
    XY,
    #[default]
    XZ,
    YZ,
}

impl ReferencePlane {
    /// Drop the coordinate along the plane normal.
    #[inline]
    pub fn project(self, v: Vector3<f64>) -> Vector2<f64> {
        match self {
            ReferencePlane::XY => Vector2::new(v.x, v.y),
            ReferencePlane::XZ => Vector2::new(v.x, v.z),
            ReferencePlane::YZ => Vector2::new(v.y, v.z),
        }
    }

    pub fn normal(self) -> Vector3<f64> {
        match self {
            ReferencePlane::XY => Vector3::z(),
            ReferencePlane::XZ => Vector3::y(),
            ReferencePlane::YZ => Vector3::x(),
        }
    }
}

/// Normal of triangle `(a, b, c)` as `cross(b - a, c - a)`, not normalized.
/// Its length is twice the triangle area.
#[inline]
pub fn face_cross(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Vector3<f64> {
    (b - a).cross(&(c - a))
}
