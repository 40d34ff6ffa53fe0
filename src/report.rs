// The published result of one processed frame, and the discrete events that
// accompany it.
//
// `FrameReport` shares its grids through `Arc`, so handing the latest report
// to several consumers never copies pixel data. `ReportSummary` is the scalar
// part, ready for `serde_json`.

use crate::core_modules::direction::Direction;
use crate::core_modules::exposure::{ExposureChannel, ExposureState};
use crate::core_modules::grid::{AmplitudeFrame, DistanceFrame};
use crate::core_modules::pixel_flags::FlagCounts;
use crate::core_modules::quality::{ExposureQuality, NoiseLevel, QualityVerdict};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Index among accepted frames, starting at 0.
    pub frame_index: u64,
    pub distance: Arc<DistanceFrame>,
    pub amplitude: Arc<AmplitudeFrame>,
    pub height: f64,
    /// `(row, col)` of the height peak.
    pub position: (usize, usize),
    pub position_correct: bool,
    pub direction: Direction,
    pub quality: QualityVerdict,
    /// Exposure in effect after this frame's control step.
    pub exposure: ExposureState,
    pub person_count: u64,
    pub new_person: bool,
    pub flagged: FlagCounts,
}

impl FrameReport {
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            frame_index: self.frame_index,
            height: self.height,
            position: self.position,
            position_correct: self.position_correct,
            direction: self.direction,
            quality: self.quality.quality,
            noise: self.quality.noise,
            exposure_us: self.exposure.value_us,
            auto_exposure: self.exposure.auto_mode,
            person_count: self.person_count,
            new_person: self.new_person,
            flagged: self.flagged,
            mean_distance_mm: self.distance.mean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub frame_index: u64,
    pub height: f64,
    pub position: (usize, usize),
    pub position_correct: bool,
    pub direction: Direction,
    pub quality: ExposureQuality,
    pub noise: NoiseLevel,
    pub exposure_us: f64,
    pub auto_exposure: bool,
    pub person_count: u64,
    pub new_person: bool,
    pub flagged: FlagCounts,
    pub mean_distance_mm: f64,
}

/// Notifications that must reach observers one by one, never coalesced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    ExposureApplied {
        value_us: u32,
        channel: ExposureChannel,
    },
    /// The hardware refused a change; `restored_us` stays in effect.
    ExposureRejected {
        value_us: u32,
        restored_us: f64,
        channel: ExposureChannel,
        reason: String,
    },
    NewPerson {
        frame_index: u64,
        count: u64,
    },
    BackgroundCaptured {
        frame_index: u64,
    },
    FrameDiscarded {
        reason: String,
    },
    Stopped {
        frames_processed: u64,
    },
}
