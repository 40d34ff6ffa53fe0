// Center of gravity of a binarized foreground mask.
//
// A pixel is foreground when it is strictly above the threshold; without an
// explicit threshold 10% of the image's own maximum is used. The centroid is
// the ratio of first-order to zeroth-order moments of the mask:
//
//     x = M10 / (M00 + eps),  y = M01 / (M00 + eps)
//
// `x` is the column, `y` the row. An empty mask gives (0, 0).

use crate::core_modules::grid::Grid;
use serde::Serialize;

pub const COG_EPSILON: f64 = 1e-5;
pub const DEFAULT_THRESHOLD_FRACTION: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CenterOfGravity {
    pub x: f64,
    pub y: f64,
    /// Number of foreground pixels (M00).
    pub mass: f64,
}

/// Centroid with an explicit threshold, or 10% of the maximum when `None`.
pub fn center_of_gravity(image: &Grid<f32>, threshold: Option<f32>) -> CenterOfGravity {
    let threshold =
        threshold.unwrap_or_else(|| relative_threshold(image, DEFAULT_THRESHOLD_FRACTION));
    moments(image, threshold)
}

/// Centroid with the threshold set to `fraction` of the image maximum.
pub fn center_of_gravity_relative(image: &Grid<f32>, fraction: f32) -> CenterOfGravity {
    moments(image, relative_threshold(image, fraction))
}

fn relative_threshold(image: &Grid<f32>, fraction: f32) -> f32 {
    image.max().unwrap_or(0.0) * fraction
}

fn moments(image: &Grid<f32>, threshold: f32) -> CenterOfGravity {
    let (mut m00, mut m10, mut m01) = (0.0f64, 0.0f64, 0.0f64);
    for row in 0..image.rows() {
        for col in 0..image.cols() {
            if image.get(row, col) > threshold {
                m00 += 1.0;
                m10 += col as f64;
                m01 += row as f64;
            }
        }
    }
    CenterOfGravity {
        x: m10 / (m00 + COG_EPSILON),
        y: m01 / (m00 + COG_EPSILON),
        mass: m00,
    }
}
