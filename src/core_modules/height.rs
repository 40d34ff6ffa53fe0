// THEORY:
// The `HeightEstimator` turns a distance frame taken from above into the height
// of whatever stands in the field of view, and locates its top.
//
// Algorithm steps:
// 1.  **Base Level**: `base` is the mean of the background frame, the distance
//     from the sensor to the floor.
// 2.  **Foreground Mask**: every pixel that is not at least `threshold_mm`
//     closer than the background at that pixel is forced to `base`.
// 3.  **Inversion**: `base - image` makes objects closer than the floor
//     positive; forced pixels become exactly zero.
// 4.  **Smoothing**: a separable Gaussian suppresses single-pixel noise.
// 5.  **Peak**: the maximum of the smoothed grid is the height, its location
//     the position. Ties resolve to the first maximum in row-major order.
// 6.  **Calibration**: `height * scale - offset`, rounded to 2 decimals.
//
// A peak whose column is not strictly inside the central band is flagged as
// unreliable (`position_correct == false`). An all-background frame yields a
// height of 0, a defined result.

use crate::core_modules::gaussian::GaussianKernel;
use crate::core_modules::grid::DistanceFrame;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightConfig {
    /// Minimum distance in front of the background to count as foreground, mm.
    pub threshold_mm: f32,
    /// Gaussian kernel size along columns.
    pub kernel_width: usize,
    /// Gaussian kernel size along rows.
    pub kernel_height: usize,
    pub sigma: f64,
    pub scale: f64,
    pub offset: f64,
    /// Exclusive lower bound of the central column band.
    pub band_min_col: usize,
    /// Exclusive upper bound of the central column band.
    pub band_max_col: usize,
}

impl Default for HeightConfig {
    fn default() -> Self {
        Self {
            threshold_mm: 200.0,
            kernel_width: 15,
            kernel_height: 5,
            sigma: 7.0,
            scale: 1.0,
            offset: 0.0,
            band_min_col: 50,
            band_max_col: 100,
        }
    }
}

/// Height and peak location for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeightEstimate {
    /// Calibrated height in mm.
    pub height: f64,
    /// `(row, col)` of the peak.
    pub position: (usize, usize),
    /// The peak lies inside the central column band.
    pub position_correct: bool,
}

pub struct HeightEstimator {
    config: HeightConfig,
    kernel: GaussianKernel,
}

impl HeightEstimator {
    pub fn new(config: HeightConfig) -> Result<Self, ConfigError> {
        let kernel = GaussianKernel::new(config.kernel_width, config.kernel_height, config.sigma)?;
        Ok(Self { config, kernel })
    }

    pub fn config(&self) -> &HeightConfig {
        &self.config
    }

    /// Estimates height against `background`. `distance` is not modified.
    pub fn estimate(&self, distance: &DistanceFrame, background: &DistanceFrame) -> HeightEstimate {
        let height_map = self.height_map(distance, background);
        let (peak, position) = height_map.max_with_position().unwrap_or((0.0, (0, 0)));

        let height = round2(peak as f64 * self.config.scale - self.config.offset);
        HeightEstimate {
            height,
            position,
            position_correct: self.in_band(position.1),
        }
    }

    /// Steps 1-4: the smoothed, inverted foreground.
    pub fn height_map(
        &self,
        distance: &DistanceFrame,
        background: &DistanceFrame,
    ) -> DistanceFrame {
        debug_assert!(distance.same_dims(background));
        let base = background.mean() as f32;
        let threshold = self.config.threshold_mm;

        let mut image = distance.clone();
        for (value, &bg) in image.as_mut_slice().iter_mut().zip(background.iter()) {
            if *value > bg - threshold {
                *value = base;
            }
            *value = base - *value;
        }
        self.kernel.blur(&image)
    }

    pub fn in_band(&self, col: usize) -> bool {
        col > self.config.band_min_col && col < self.config.band_max_col
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
