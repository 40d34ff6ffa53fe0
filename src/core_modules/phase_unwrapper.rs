// THEORY:
// The `PhaseUnwrapper` is the entry point of the signal-processing layer. It
// turns the four quadrature sub-frames of a phase-shift ToF sensor into the
// three images every later stage consumes: phase, distance and amplitude.
//
// Per pixel:
//     phase     = atan2(DCS3 - DCS1, DCS2 - DCS0) + pi        in (0, 2pi]
//     distance  = range / (2pi) * phase + offset               in mm
//     amplitude = 0.5 * sqrt((DCS3 - DCS1)^2 + (DCS2 - DCS0)^2)
//
// Wraparound: a distance at or beyond the unambiguous range has the range
// subtracted, a negative distance has it added. Without an offset this keeps
// every distance in [0, range).
//
// Orientation contract: the output grids are the transpose of the input grids.
// Raw frames arrive in acquisition orientation (sensor columns first); the
// derived images are in sensor (row, col) orientation. Every consumer
// downstream works in the output orientation.
//
// All-zero differences give atan2(0, 0) = 0, so phase = pi. That is a valid
// measurement, not an error.

use crate::core_modules::distance_correction::DistanceCorrection;
use crate::core_modules::grid::{AmplitudeFrame, DistanceFrame, Grid, PhaseFrame, RawFrame};
use crate::core_modules::modulation::ModulationConfig;
use crate::error::FrameError;
use std::f64::consts::{PI, TAU};

/// Distance offset added during unwrapping.
#[derive(Debug, Clone, PartialEq)]
pub enum DistanceOffset {
    /// The same offset for every pixel, in mm.
    Scalar(f32),
    /// A per-pixel offset in output orientation, in mm.
    PerPixel(Grid<f32>),
}

impl Default for DistanceOffset {
    fn default() -> Self {
        DistanceOffset::Scalar(0.0)
    }
}

/// The three images derived from one raw frame.
#[derive(Debug, Clone)]
pub struct UnwrappedFrame {
    pub phase: PhaseFrame,
    pub distance: DistanceFrame,
    pub amplitude: AmplitudeFrame,
}

/// Converts raw DCS quadruples into phase, distance and amplitude for one
/// modulation frequency.
#[derive(Debug, Clone)]
pub struct PhaseUnwrapper {
    modulation: ModulationConfig,
    offset: DistanceOffset,
    correction: Option<DistanceCorrection>,
}

impl PhaseUnwrapper {
    pub fn new(modulation: ModulationConfig) -> Self {
        Self {
            modulation,
            offset: DistanceOffset::default(),
            correction: None,
        }
    }

    pub fn with_offset(mut self, offset: DistanceOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Enables the polynomial error correction, applied after wraparound.
    pub fn with_correction(mut self, correction: DistanceCorrection) -> Self {
        self.correction = (!correction.is_identity()).then_some(correction);
        self
    }

    pub fn modulation(&self) -> &ModulationConfig {
        &self.modulation
    }

    /// Phase of a single DCS quadruple.
    #[inline]
    pub fn phase_of(dcs0: u16, dcs1: u16, dcs2: u16, dcs3: u16) -> f64 {
        let diff_d3_d1 = dcs3 as f64 - dcs1 as f64;
        let diff_d2_d0 = dcs2 as f64 - dcs0 as f64;
        diff_d3_d1.atan2(diff_d2_d0) + PI
    }

    /// Amplitude of a single DCS quadruple.
    #[inline]
    pub fn amplitude_of(dcs0: u16, dcs1: u16, dcs2: u16, dcs3: u16) -> f64 {
        let diff_d3_d1 = dcs3 as f64 - dcs1 as f64;
        let diff_d2_d0 = dcs2 as f64 - dcs0 as f64;
        0.5 * (diff_d3_d1 * diff_d3_d1 + diff_d2_d0 * diff_d2_d0).sqrt()
    }

    /// Distance for a phase plus offset, folded back into the unambiguous range.
    #[inline]
    pub fn distance_of(&self, phase: f64, offset_mm: f64) -> f64 {
        let range = self.modulation.unambiguous_range_mm();
        let distance = range / TAU * phase + offset_mm;
        if distance >= range {
            distance - range
        } else if distance < 0.0 {
            distance + range
        } else {
            distance
        }
    }

    /// Unwraps a full raw frame. The outputs are transposed relative to `frame`.
    pub fn unwrap(&self, frame: &RawFrame) -> Result<UnwrappedFrame, FrameError> {
        let (in_rows, in_cols) = frame.dims();
        let (out_rows, out_cols) = (in_cols, in_rows);

        if let DistanceOffset::PerPixel(offsets) = &self.offset {
            if offsets.dims() != (out_rows, out_cols) {
                return Err(FrameError::SessionMismatch {
                    expected: offsets.dims(),
                    actual: (out_rows, out_cols),
                });
            }
        }

        let [d0, d1, d2, d3] = frame.planes();
        let mut phase = Grid::<f32>::new(out_rows, out_cols);
        let mut distance = Grid::<f32>::new(out_rows, out_cols);
        let mut amplitude = Grid::<f32>::new(out_rows, out_cols);

        for row in 0..in_rows {
            for col in 0..in_cols {
                let (s0, s1, s2, s3) = (
                    d0.get(row, col),
                    d1.get(row, col),
                    d2.get(row, col),
                    d3.get(row, col),
                );
                let p = Self::phase_of(s0, s1, s2, s3);
                let offset = match &self.offset {
                    DistanceOffset::Scalar(v) => *v as f64,
                    DistanceOffset::PerPixel(grid) => grid.get(col, row) as f64,
                };

                phase.set(col, row, p as f32);
                distance.set(col, row, self.distance_of(p, offset) as f32);
                amplitude.set(col, row, Self::amplitude_of(s0, s1, s2, s3) as f32);
            }
        }

        if let Some(correction) = &self.correction {
            correction.apply(&mut distance);
        }

        Ok(UnwrappedFrame {
            phase,
            distance,
            amplitude,
        })
    }
}
