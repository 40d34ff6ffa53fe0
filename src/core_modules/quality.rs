// THEORY:
// The `QualityEvaluator` scores the signal of one frame and produces the
// verdict that drives auto exposure. It looks at two things:
//
// 1.  **Noise**: per pixel, the expected background-light signal is compared to
//     the expected ToF signal,
//         e_bw  = k_bw  * exp_ref / exposure * gray
//         e_tof = k_tof * exp_ref / exposure * amplitude
//         snr   = 20 * log10(e_bw / e_tof)
//     and noise is HIGH when more than half of the pixels fall below the SNR
//     threshold.
// 2.  **Exposure**: the amplitude histogram is split into under (< under),
//     mid ([under, over)) and over (> over) bins. More under than mid pixels is
//     UNDEREXPOSED, more over than mid pixels is OVEREXPOSED. When the under bin
//     is below a floor, the verdict is biased to OVEREXPOSED so the loop backs
//     off exposure instead of settling on a saturated state. The bias never
//     overrides an UNDEREXPOSED verdict.
//
// The thresholds are session constants and scale with the camera bit depth.
// The exposure passed in must be positive; that is a caller contract.

use crate::core_modules::grid::{AmplitudeFrame, GrayFrame};
use serde::{Deserialize, Serialize};

/// Exposure classification of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureQuality {
    Underexposed,
    Good,
    Overexposed,
}

/// Noise classification of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseLevel {
    High,
    Good,
}

/// The per-frame verdict consumed by the exposure controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityVerdict {
    pub quality: ExposureQuality,
    pub noise: NoiseLevel,
}

/// Thresholds and sensitivities of the quality evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Amplitudes strictly below this are underexposed.
    pub under_threshold: f32,
    /// Amplitudes strictly above this are overexposed.
    pub over_threshold: f32,
    /// Below this many underexposed pixels the verdict is biased to overexposed.
    pub under_floor: usize,
    /// Pixels with an SNR below this (dB) count as noisy.
    pub noise_snr_db: f64,
    pub k_bw: f64,
    pub k_tof: f64,
    /// Reference exposure in us.
    pub exp_ref: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            under_threshold: 100.0,
            over_threshold: 2000.0,
            under_floor: 1500,
            noise_snr_db: 70.0,
            k_bw: 0.25,
            k_tof: 0.6,
            exp_ref: 100.0,
        }
    }
}

/// Pixel counts of the three amplitude bins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmplitudeHistogram {
    pub under: usize,
    pub mid: usize,
    pub over: usize,
}

pub struct QualityEvaluator {
    config: QualityConfig,
    gray: GrayFrame,
}

impl QualityEvaluator {
    pub fn new(config: QualityConfig, gray: GrayFrame) -> Self {
        Self { config, gray }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn gray(&self) -> &GrayFrame {
        &self.gray
    }

    pub fn evaluate(&self, amplitude: &AmplitudeFrame, exposure_us: f64) -> QualityVerdict {
        debug_assert!(exposure_us > 0.0, "exposure must be positive");
        debug_assert!(amplitude.same_dims(&self.gray));

        QualityVerdict {
            quality: self.classify(&self.histogram(amplitude)),
            noise: self.noise_level(amplitude, exposure_us),
        }
    }

    pub fn histogram(&self, amplitude: &AmplitudeFrame) -> AmplitudeHistogram {
        let mut histogram = AmplitudeHistogram::default();
        for &a in amplitude.iter() {
            if a < self.config.under_threshold {
                histogram.under += 1;
            } else if a < self.config.over_threshold {
                histogram.mid += 1;
            } else if a > self.config.over_threshold {
                histogram.over += 1;
            }
        }
        histogram
    }

    pub fn classify(&self, histogram: &AmplitudeHistogram) -> ExposureQuality {
        let quality = if histogram.under > histogram.mid {
            ExposureQuality::Underexposed
        } else if histogram.over > histogram.mid {
            ExposureQuality::Overexposed
        } else {
            ExposureQuality::Good
        };

        if histogram.under < self.config.under_floor && quality != ExposureQuality::Underexposed {
            ExposureQuality::Overexposed
        } else {
            quality
        }
    }

    /// Per-pixel SNR in dB. Zero amplitude yields +inf, zero over zero NaN;
    /// neither counts as noisy.
    pub fn snr_db(&self, gray: f32, amplitude: f32, exposure_us: f64) -> f64 {
        let scale = self.config.exp_ref / exposure_us;
        let e_bw = self.config.k_bw * scale * gray as f64;
        let e_tof = self.config.k_tof * scale * amplitude as f64;
        20.0 * (e_bw / e_tof).log10()
    }

    fn noise_level(&self, amplitude: &AmplitudeFrame, exposure_us: f64) -> NoiseLevel {
        let noisy = self
            .gray
            .iter()
            .zip(amplitude.iter())
            .filter(|&(&g, &a)| self.snr_db(g, a, exposure_us) < self.config.noise_snr_db)
            .count();

        if noisy * 2 > amplitude.len() {
            NoiseLevel::High
        } else {
            NoiseLevel::Good
        }
    }
}
