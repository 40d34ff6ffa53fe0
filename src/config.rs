// THEORY:
// `SessionConfig` gathers every constant a run needs, one section per stage.
// It is read once at startup from YAML, every missing field falls back to its
// default, and `validate` rejects anything that would fail later. After that
// it is immutable: only exposure value and auto mode change during a run, and
// those go through the worker's control slot.

use crate::core_modules::background::BackgroundConfig;
use crate::core_modules::direction::DirectionConfig;
use crate::core_modules::distance_correction::DistanceCorrection;
use crate::core_modules::exposure::{ExposureConfig, IncreasePolicy, MIN_EXPOSURE_US};
use crate::core_modules::gaussian::GaussianKernel;
use crate::core_modules::grid::{GrayFrame, Grid};
use crate::core_modules::height::HeightConfig;
use crate::core_modules::modulation::ModulationConfig;
use crate::core_modules::person_event::PersonConfig;
use crate::core_modules::quality::QualityConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Sensor size in sensor order. Raw frames arrive transposed, `(cols, rows)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub rows: usize,
    pub cols: usize,
}

impl SensorConfig {
    pub fn epc635() -> Self {
        Self { rows: 60, cols: 160 }
    }

    pub fn epc660() -> Self {
        Self { rows: 240, cols: 320 }
    }

    /// Dimensions of each DCS grid as delivered by an acquisition source.
    pub fn raw_dims(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Dimensions of every derived image.
    pub fn frame_dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::epc635()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulationSection {
    pub frequency_mhz: f64,
}

impl Default for ModulationSection {
    fn default() -> Self {
        Self { frequency_mhz: 20.0 }
    }
}

impl ModulationSection {
    pub fn resolve(&self) -> Result<ModulationConfig, ConfigError> {
        ModulationConfig::from_megahertz(self.frequency_mhz)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Added to every pixel during unwrapping, before wraparound, mm.
    pub offset_mm: f32,
    /// Applied after wraparound.
    pub correction: DistanceCorrection,
}

/// The static gray image the quality evaluator compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceGray {
    Constant { level: f32 },
    /// 8- or 16-bit grayscale PNG in sensor orientation.
    Png { path: PathBuf },
}

impl Default for ReferenceGray {
    fn default() -> Self {
        ReferenceGray::Constant { level: 15.0 }
    }
}

impl ReferenceGray {
    /// Loads the gray frame for a sensor whose derived images are `dims`.
    pub fn load(&self, dims: (usize, usize)) -> Result<GrayFrame, ConfigError> {
        match self {
            ReferenceGray::Constant { level } => Ok(Grid::filled(dims.0, dims.1, *level)),
            ReferenceGray::Png { path } => {
                let image = image::open(path)?.into_luma16();
                let gray = Grid::from_luma16(&image);
                if gray.dims() != dims {
                    return Err(ConfigError::DimensionMismatch {
                        what: "reference gray image",
                        expected: dims,
                        actual: gray.dims(),
                    });
                }
                info!(path = %path.display(), "reference gray loaded");
                Ok(gray)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sensor: SensorConfig,
    pub modulation: ModulationSection,
    pub distance: DistanceConfig,
    pub quality: QualityConfig,
    pub reference_gray: ReferenceGray,
    pub exposure: ExposureConfig,
    pub background: BackgroundConfig,
    pub height: HeightConfig,
    pub direction: DirectionConfig,
    pub person: PersonConfig,
}

impl SessionConfig {
    /// Reads and validates a YAML session file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&contents)?;
        info!(path = %path.as_ref().display(), "session configuration loaded");
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.modulation.resolve()?;

        if self.sensor.rows == 0 || self.sensor.cols == 0 {
            return Err(invalid(format!(
                "sensor must have non-zero dimensions (got {}x{})",
                self.sensor.rows, self.sensor.cols
            )));
        }

        let q = &self.quality;
        if !(q.under_threshold < q.over_threshold) {
            return Err(invalid(format!(
                "quality.under_threshold ({}) must be below quality.over_threshold ({})",
                q.under_threshold, q.over_threshold
            )));
        }
        if !(q.exp_ref > 0.0 && q.k_bw > 0.0 && q.k_tof > 0.0) {
            return Err(invalid("quality.exp_ref, k_bw and k_tof must be positive".into()));
        }

        let e = &self.exposure;
        if !(e.hardware_max_us >= MIN_EXPOSURE_US) {
            return Err(invalid(format!(
                "exposure.hardware_max_us must be at least {MIN_EXPOSURE_US} (got {})",
                e.hardware_max_us
            )));
        }
        if !(e.initial_us > 0.0) {
            return Err(invalid(format!(
                "exposure.initial_us must be positive (got {})",
                e.initial_us
            )));
        }
        if !(e.decrease_factor > 0.0 && e.decrease_factor < 1.0) {
            return Err(invalid(format!(
                "exposure.decrease_factor must lie in (0, 1) (got {})",
                e.decrease_factor
            )));
        }
        match e.increase {
            IncreasePolicy::Step { step_us } if !(step_us > 0.0) => {
                return Err(invalid(format!(
                    "exposure.increase.step_us must be positive (got {step_us})"
                )));
            }
            IncreasePolicy::Scale { factor } if !(factor > 1.0) => {
                return Err(invalid(format!(
                    "exposure.increase.factor must exceed 1 (got {factor})"
                )));
            }
            _ => {}
        }

        if self.background.depth == 0 {
            return Err(invalid("background.depth must be at least 1".into()));
        }
        if self.direction.depth == 0 {
            return Err(invalid("direction.depth must be at least 1".into()));
        }
        if !(self.direction.threshold_fraction >= 0.0 && self.direction.threshold_fraction < 1.0) {
            return Err(invalid(format!(
                "direction.threshold_fraction must lie in [0, 1) (got {})",
                self.direction.threshold_fraction
            )));
        }

        let h = &self.height;
        GaussianKernel::new(h.kernel_width, h.kernel_height, h.sigma)?;
        if h.band_min_col >= h.band_max_col {
            return Err(invalid(format!(
                "height band ({}, {}) is empty",
                h.band_min_col, h.band_max_col
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}
