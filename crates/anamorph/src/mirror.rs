//! Procedural mirror surfaces for building scenes.
//!
//! Both generators produce surfaces in their local frame facing `-z`; place
//! them with `Surface::transformed`.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{AnamorphError, Result};
use crate::raycast::{Surface, SurfaceKind};

/// Axis along which the curved mirror bends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveDirection {
    /// Curved along y (rows lie on a circle of the given radius).
    #[default]
    Horizontal,
    /// Curved along x.
    Vertical,
}

/// Cylindrical mirror section spanning `[-1, 1]` along its straight axis.
///
/// The curved axis follows a circle of radius `radius` through the chord
/// `[-1, 1]`, so `z = R cos(α) - R cos(θ)` with `θ = asin(1/R)`; the section
/// bulges towards `+z` at its centre.
pub fn curved_square(
    x_size: usize,
    y_size: usize,
    radius: f64,
    direction: CurveDirection,
) -> Result<Surface> {
    if !(3..=256).contains(&x_size) || !(3..=256).contains(&y_size) {
        return Err(AnamorphError::invalid(format!(
            "mirror resolution must be within 3..=256, got {x_size}x{y_size}"
        )));
    }
    if !(radius >= 1.0) {
        return Err(AnamorphError::invalid(format!(
            "radius of curvature must be >= 1, got {radius}"
        )));
    }
    let theta = (1.0 / radius).asin();
    let dist_optical_centre = radius * theta.cos();
    let mut vertices = Vec::with_capacity(x_size * y_size);
    let mut triangles = Vec::with_capacity((x_size - 1) * (y_size - 1) * 2);
    for y in 0..y_size {
        for x in 0..x_size {
            let u = x as f64 / (x_size - 1) as f64;
            let v = y as f64 / (y_size - 1) as f64;
            let mut px = u * 2.0 - 1.0;
            let mut py = v * 2.0 - 1.0;
            let alpha = match direction {
                CurveDirection::Horizontal => {
                    py = radius * (-theta + theta * 2.0 / (y_size - 1) as f64 * y as f64).sin();
                    (py / radius).asin()
                }
                CurveDirection::Vertical => {
                    px = radius * (-theta + theta * 2.0 / (x_size - 1) as f64 * x as f64).sin();
                    (px / radius).asin()
                }
            };
            let pz = radius * alpha.cos() - dist_optical_centre;
            vertices.push(Vector3::new(px, py, pz));

            if x < x_size - 1 && y < y_size - 1 {
                let a = y * x_size + x;
                let b = a + 1;
                let c = a + x_size;
                let d = c + 1;
                triangles.push([a, c, b]);
                triangles.push([b, c, d]);
            }
        }
    }
    Ok(Surface::new(
        "curved_mirror",
        SurfaceKind::Mirror,
        vertices,
        triangles,
    ))
}

/// Flat rectangular mirror `[-half_w, half_w] × [-half_h, half_h]` at `z = 0`.
pub fn flat_quad(half_w: f64, half_h: f64) -> Surface {
    Surface::new(
        "flat_mirror",
        SurfaceKind::Mirror,
        vec![
            Vector3::new(-half_w, -half_h, 0.0),
            Vector3::new(half_w, -half_h, 0.0),
            Vector3::new(half_w, half_h, 0.0),
            Vector3::new(-half_w, half_h, 0.0),
        ],
        vec![[0, 2, 1], [0, 3, 2]],
    )
}
