// THEORY:
// The `error` module defines the failure taxonomy of the engine. Only two
// boundaries can fail: configuration (fatal, at startup) and the hardware
// (transient, at the exposure-apply call). A third, `FrameError`, covers a
// single malformed frame that is discarded without touching any buffered state.
//
// Numeric edge cases (empty foreground, all-background frames, equal centroids)
// are never errors. They flow through the pipeline as ordinary values.

use crate::core_modules::exposure::ExposureChannel;
use thiserror::Error;

/// Common result type for the engine.
pub type Result<T> = std::result::Result<T, TofError>;

/// Fatal configuration problems, surfaced before any frame is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown modulation frequency {0} MHz (expected one of 20, 10, 5, 2.5, 1.25)")]
    UnknownFrequency(f64),

    #[error("{what} has dimensions {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("no acquisition source configured")]
    MissingSource,

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to load reference image: {0}")]
    Image(#[from] image::ImageError),
}

/// Recoverable failures at the hardware boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HardwareError {
    #[error("exposure {value_us} us rejected on {channel} channel: {reason}")]
    ExposureRejected {
        value_us: u32,
        channel: ExposureChannel,
        reason: String,
    },

    #[error("camera link failure: {0}")]
    Link(String),
}

/// A single frame that cannot be processed. The frame is dropped as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("grid of {rows}x{cols} needs {expected} samples, got {actual}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        expected: usize,
        actual: usize,
    },

    #[error("DCS{index} has dimensions {actual:?}, DCS0 has {expected:?}")]
    DcsMismatch {
        index: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("frame has dimensions {actual:?}, session expects {expected:?}")]
    SessionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("truncated frame: needed {expected_bytes} bytes, got {actual_bytes}")]
    Truncated {
        expected_bytes: usize,
        actual_bytes: usize,
    },
}

/// Unified error type for the engine.
#[derive(Debug, Error)]
pub enum TofError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("acquisition I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline worker failed: {0}")]
    Worker(String),
}
