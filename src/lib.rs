// THEORY:
// This file is the main entry point for the `tof_vision` library crate. It
// exposes the phase-shift Time-of-Flight pipeline: raw DCS sub-frames go in,
// calibrated distance, height, motion direction and person events come out,
// with the camera exposure kept in a closed loop.
//
// `TofPipeline` (in `pipeline`) is the synchronous, single-stream engine.
// `PipelineWorker` (in `pipeline_worker`) drives it off-thread from an
// `AcquisitionSource` and publishes results to any number of consumers. The
// per-stage analyzers live in `core_modules` and can be used on their own.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod pipeline_worker;
pub mod replay;
pub mod report;
pub mod source;

pub use config::SessionConfig;
pub use error::{ConfigError, FrameError, HardwareError, Result, TofError};
pub use pipeline::{FrameOutcome, PendingControls, TofPipeline};
pub use pipeline_worker::{
    ControlHandle, PipelineHandle, PipelineWorker, WorkerOptions, WorkerSummary, take_unseen,
};
pub use report::{FrameReport, PipelineEvent, ReportSummary};
pub use source::{Acquired, AcquisitionSource, CameraLink, ExposureSink, LiveSource, ReplaySource};
