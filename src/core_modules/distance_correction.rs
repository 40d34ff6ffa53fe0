// Systematic distance error correction. A calibration run fits the residual
// error of the sensor as a polynomial of the measured distance; the correction
// subtracts a constant offset and then the evaluated polynomial:
//
//     d' = d - offset
//     d'' = d' - p(d')
//
// Coefficients are ordered highest power first. An empty polynomial and zero
// offset leave the frame untouched.

use crate::core_modules::grid::DistanceFrame;
use serde::{Deserialize, Serialize};

/// Calibration for the systematic distance error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceCorrection {
    /// Constant offset subtracted before the polynomial, in mm.
    pub offset_mm: f64,
    /// Error polynomial, highest power first.
    pub error_polynomial: Vec<f64>,
}

impl DistanceCorrection {
    pub fn is_identity(&self) -> bool {
        self.offset_mm == 0.0 && self.error_polynomial.iter().all(|&c| c == 0.0)
    }

    /// Evaluates the error polynomial at `x` (Horner's scheme).
    pub fn polyval(&self, x: f64) -> f64 {
        self.error_polynomial.iter().fold(0.0, |acc, &c| acc * x + c)
    }

    pub fn correct(&self, distance_mm: f64) -> f64 {
        let shifted = distance_mm - self.offset_mm;
        shifted - self.polyval(shifted)
    }

    pub fn apply(&self, frame: &mut DistanceFrame) {
        if self.is_identity() {
            return;
        }
        for value in frame.as_mut_slice() {
            *value = self.correct(*value as f64) as f32;
        }
    }
}
