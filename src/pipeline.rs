// THEORY:
// The `pipeline` module is the top-level API of the engine. `TofPipeline` owns
// every stage and runs them in a fixed order for each accepted raw frame:
//
//   Stage 1: unwrap phase, distance and amplitude
//   Stage 2: evaluate exposure quality
//   Stage 3: update the exposure controller and push any change to the hardware
//   Stage 4: update the background model
//   Stage 5: estimate height and peak position
//   Stage 6: estimate motion direction
//   Stage 7: evaluate the person event
//
// and returns a `FrameReport` plus the events raised on the way. No stage is
// ever skipped. A frame that does not match the session dimensions is rejected
// before Stage 1, so a discarded frame leaves all buffered state untouched.
//
// All state is owned by the one pipeline instance. External control requests
// are applied through `apply_controls`, which the caller invokes only between
// frames.

use crate::config::{SensorConfig, SessionConfig};
use crate::core_modules::background::BackgroundModel;
use crate::core_modules::direction::DirectionEstimator;
use crate::core_modules::exposure::{
    ExposureChange, ExposureController, ExposureRequest, ExposureState,
};
use crate::core_modules::grid::{DistanceFrame, GrayFrame, RawFrame};
use crate::core_modules::height::HeightEstimator;
use crate::core_modules::person_event::{PersonEvent, PersonEventDetector};
use crate::core_modules::phase_unwrapper::{DistanceOffset, PhaseUnwrapper};
use crate::core_modules::quality::QualityEvaluator;
use crate::error::{ConfigError, FrameError};
use crate::source::ExposureSink;
use std::sync::Arc;
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::direction::Direction;
pub use crate::core_modules::quality::{ExposureQuality, NoiseLevel, QualityVerdict};
pub use crate::report::{FrameReport, PipelineEvent, ReportSummary};

/// Control requests collected between two frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingControls {
    pub exposure: Option<ExposureRequest>,
    pub capture_background: bool,
    pub reset_counter: bool,
}

impl PendingControls {
    pub fn is_empty(&self) -> bool {
        self.exposure.is_none() && !self.capture_background && !self.reset_counter
    }
}

/// Result of one processed frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub report: FrameReport,
    pub events: Vec<PipelineEvent>,
}

pub struct TofPipeline {
    sensor: SensorConfig,
    unwrapper: PhaseUnwrapper,
    quality: QualityEvaluator,
    exposure: ExposureController,
    background: BackgroundModel,
    height: HeightEstimator,
    direction: DirectionEstimator,
    person: PersonEventDetector,
    frames_processed: u64,
}

impl TofPipeline {
    /// Builds a pipeline with an already loaded reference gray frame.
    pub fn new(config: &SessionConfig, gray: GrayFrame) -> Result<Self, ConfigError> {
        config.validate()?;
        let sensor = config.sensor;
        if gray.dims() != sensor.frame_dims() {
            return Err(ConfigError::DimensionMismatch {
                what: "reference gray frame",
                expected: sensor.frame_dims(),
                actual: gray.dims(),
            });
        }

        let modulation = config.modulation.resolve()?;
        let unwrapper = PhaseUnwrapper::new(modulation)
            .with_offset(DistanceOffset::Scalar(config.distance.offset_mm))
            .with_correction(config.distance.correction.clone());

        info!(
            frequency = %modulation.frequency(),
            range_mm = modulation.unambiguous_range_mm(),
            rows = sensor.rows,
            cols = sensor.cols,
            "pipeline configured"
        );

        Ok(Self {
            sensor,
            unwrapper,
            quality: QualityEvaluator::new(config.quality.clone(), gray),
            exposure: ExposureController::new(config.exposure.clone()),
            background: BackgroundModel::new(&config.background),
            height: HeightEstimator::new(config.height.clone())?,
            direction: DirectionEstimator::new(&config.direction),
            person: PersonEventDetector::new(config.person.clone()),
            frames_processed: 0,
        })
    }

    /// Builds a pipeline, loading the reference gray frame the config names.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let gray = config.reference_gray.load(config.sensor.frame_dims())?;
        Self::new(config, gray)
    }

    pub fn sensor(&self) -> SensorConfig {
        self.sensor
    }

    pub fn exposure_state(&self) -> ExposureState {
        self.exposure.state()
    }

    pub fn person_count(&self) -> u64 {
        self.person.count()
    }

    pub fn background(&self) -> Option<&DistanceFrame> {
        self.background.background()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Applies control requests. Must only be called between two frames.
    pub fn apply_controls(&mut self, controls: PendingControls) {
        if let Some(request) = controls.exposure {
            debug!(?request, "exposure override");
            self.exposure.apply_request(request);
        }
        if controls.capture_background {
            self.background.request_capture();
        }
        if controls.reset_counter {
            info!(previous = self.person.count(), "person counter reset");
            self.person.reset_counter();
        }
    }

    /// Runs all stages on one raw frame. Exposure changes go to `sink`.
    pub fn process_frame<S: ExposureSink + ?Sized>(
        &mut self,
        raw: &RawFrame,
        sink: &mut S,
    ) -> Result<FrameOutcome, FrameError> {
        if raw.dims() != self.sensor.raw_dims() {
            return Err(FrameError::SessionMismatch {
                expected: self.sensor.raw_dims(),
                actual: raw.dims(),
            });
        }
        let frame_index = self.frames_processed;
        let mut events = Vec::new();

        // Stage 1: Phase Unwrapping
        let unwrapped = self.unwrapper.unwrap(raw)?;
        let distance = unwrapped.distance;
        let amplitude = unwrapped.amplitude;

        // Stage 2: Quality, judged at the exposure this frame was taken with
        let verdict = self.quality.evaluate(&amplitude, self.exposure.value_us());

        // Stage 3: Exposure Control
        self.exposure.observe(&verdict);
        if let Some(change) = self.exposure.take_change() {
            events.push(self.push_exposure(change, sink));
        }

        // Stage 4: Background
        if self.background.update(&distance) {
            info!(frame_index, mode = ?self.background.mode(), "background captured");
            events.push(PipelineEvent::BackgroundCaptured { frame_index });
        }
        let background = self.background.background().unwrap_or(&distance);

        // Stage 5: Height
        let height = self.height.estimate(&distance, background);

        // Stage 6: Direction
        let direction = self.direction.estimate(&distance, background);

        // Stage 7: Person Event
        let person_event = self.person.observe(height.height, height.position);
        if let Some(PersonEvent::NewPerson { count }) = person_event {
            events.push(PipelineEvent::NewPerson { frame_index, count });
        }

        self.frames_processed += 1;
        let report = FrameReport {
            frame_index,
            distance: Arc::new(distance),
            amplitude: Arc::new(amplitude),
            height: height.height,
            position: height.position,
            position_correct: height.position_correct,
            direction: direction.direction,
            quality: verdict,
            exposure: self.exposure.state(),
            person_count: self.person.count(),
            new_person: person_event.is_some(),
            flagged: raw.flag_counts(),
        };
        Ok(FrameOutcome { report, events })
    }

    fn push_exposure<S: ExposureSink + ?Sized>(
        &mut self,
        change: ExposureChange,
        sink: &mut S,
    ) -> PipelineEvent {
        let value_us = change.hardware_value();
        match sink.apply_exposure(value_us, change.channel) {
            Ok(()) => {
                self.exposure.commit(&change);
                debug!(
                    value_us,
                    channel = %change.channel,
                    previous_us = change.previous_us,
                    "exposure applied"
                );
                PipelineEvent::ExposureApplied {
                    value_us,
                    channel: change.channel,
                }
            }
            Err(e) => {
                self.exposure.reject(&change);
                warn!(
                    value_us,
                    error = %e,
                    restored_us = change.previous_us,
                    "exposure rejected, rolled back"
                );
                PipelineEvent::ExposureRejected {
                    value_us,
                    restored_us: change.previous_us,
                    channel: change.channel,
                    reason: e.to_string(),
                }
            }
        }
    }
}
